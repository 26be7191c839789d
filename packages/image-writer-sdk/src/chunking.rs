//! Partitioning of a payload into ordered, bounded writes.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("resume offset {offset} is past the end of a {len} byte payload")]
    OffsetOutOfRange { offset: usize, len: usize },
}

/// Number of writes needed for `total` bytes, `ceil(total / chunk_size)`.
pub const fn chunk_count(total: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size)
}

/// One write of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position in the full plan
    pub index: usize,
    /// Offset of `data[0]` within the payload
    pub offset: usize,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    pub const fn end(&self) -> usize {
        self.offset + self.data.len()
    }
}

/// Fixed-size slicing of a payload; the last chunk carries the remainder.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan<'a> {
    payload: &'a [u8],
    chunk_size: usize,
}

impl<'a> ChunkPlan<'a> {
    pub const fn new(payload: &'a [u8], chunk_size: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        Ok(Self {
            payload,
            chunk_size,
        })
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Total number of chunks in the plan.
    pub const fn len(&self) -> usize {
        chunk_count(self.payload.len(), self.chunk_size)
    }

    pub const fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn chunks(&self) -> ChunkIter<'a> {
        ChunkIter {
            payload: self.payload,
            chunk_size: self.chunk_size,
            offset: 0,
        }
    }

    /// The chunks still to send once `offset` bytes are confirmed.
    pub fn resume_from(&self, offset: usize) -> Result<ChunkIter<'a>, ChunkingError> {
        if offset > self.payload.len() {
            return Err(ChunkingError::OffsetOutOfRange {
                offset,
                len: self.payload.len(),
            });
        }
        Ok(ChunkIter {
            payload: self.payload,
            chunk_size: self.chunk_size,
            offset,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    payload: &'a [u8],
    chunk_size: usize,
    offset: usize,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = self
            .offset
            .saturating_add(self.chunk_size)
            .min(self.payload.len());
        let chunk = Chunk {
            index: self.offset / self.chunk_size,
            offset: self.offset,
            data: &self.payload[self.offset..end],
        };
        self.offset = end;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = chunk_count(
            self.payload.len().saturating_sub(self.offset),
            self.chunk_size,
        );
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter<'_> {}
