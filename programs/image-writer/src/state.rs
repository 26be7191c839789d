use crate::constants::{
    ANCHOR_DISCRIMINATOR_SIZE, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_IMAGE_BYTES,
};
use crate::errors::ImageWriterError;
use anchor_lang::prelude::*;
use core::ops::Range;

/// Upload metadata and write cursor for one image.
///
/// Seeds: `[b"image", seed_key, b"processor"]`
#[account]
#[derive(InitSpace, Debug)]
pub struct ImageProcessor {
    pub bump: u8,
    pub image_bump: u8,
    /// The only key allowed to write or finalize. Never changes after `initialize`.
    pub owner: Pubkey,
    pub seed_key: Pubkey,
    /// Address of the paired [`ImageData`] account
    pub image: Pubkey,
    pub total_bytes: u64,
    pub chunk_size: u32,
    /// Number of bytes confirmed so far; also the offset of the next write
    pub bytes_written: u64,
    pub closed: bool,
}

impl ImageProcessor {
    pub const SEED: &'static [u8] = b"image";
    pub const PROCESSOR_SEED: &'static [u8] = b"processor";

    /// Checks the parameters of a new upload and resolves the effective chunk size.
    pub fn validate_params(
        total_bytes: u64,
        chunk_size: u32,
    ) -> core::result::Result<u32, ImageWriterError> {
        if total_bytes == 0 {
            return Err(ImageWriterError::EmptyImage);
        }
        if total_bytes > MAX_IMAGE_BYTES as u64 {
            return Err(ImageWriterError::ImageTooLarge);
        }

        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(ImageWriterError::InvalidChunkSize);
        }

        Ok(chunk_size)
    }

    pub fn ensure_owner(&self, caller: &Pubkey) -> core::result::Result<(), ImageWriterError> {
        if self.owner == *caller {
            Ok(())
        } else {
            Err(ImageWriterError::Unauthorized)
        }
    }

    /// Reserves `len` bytes at the cursor and advances it.
    ///
    /// Returns the byte range of the image buffer the chunk must be copied into.
    /// Nothing is modified when an error is returned.
    pub fn append(
        &mut self,
        caller: &Pubkey,
        len: usize,
    ) -> core::result::Result<Range<usize>, ImageWriterError> {
        self.ensure_owner(caller)?;
        if self.closed {
            return Err(ImageWriterError::UploadClosed);
        }
        if len == 0 {
            return Err(ImageWriterError::EmptyChunk);
        }

        let len = u64::try_from(len).map_err(|_| ImageWriterError::ArithmeticOverflow)?;
        if len > u64::from(self.chunk_size) {
            return Err(ImageWriterError::ChunkTooLarge);
        }

        let end = self
            .bytes_written
            .checked_add(len)
            .ok_or(ImageWriterError::ArithmeticOverflow)?;
        if end > self.total_bytes {
            return Err(ImageWriterError::WriteOverflow);
        }

        let start = usize::try_from(self.bytes_written)
            .map_err(|_| ImageWriterError::ArithmeticOverflow)?;
        let stop = usize::try_from(end).map_err(|_| ImageWriterError::ArithmeticOverflow)?;
        self.bytes_written = end;

        Ok(start..stop)
    }

    /// Marks a complete upload as closed.
    pub fn mark_closed(&mut self, caller: &Pubkey) -> core::result::Result<(), ImageWriterError> {
        self.ensure_owner(caller)?;
        if self.closed {
            return Err(ImageWriterError::UploadClosed);
        }
        if !self.is_complete() {
            return Err(ImageWriterError::UploadIncomplete);
        }

        self.closed = true;
        Ok(())
    }

    pub const fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.bytes_written)
    }

    pub const fn is_complete(&self) -> bool {
        self.bytes_written == self.total_bytes
    }
}

/// Fixed-capacity byte buffer holding the uploaded image.
///
/// Seeds: `[b"image", seed_key]`
#[account(zero_copy)]
pub struct ImageData {
    pub owner: Pubkey,
    pub total_bytes: u64,
    /// [`ImageType`] discriminant, set by `finalize`
    pub image_type: u8,
    pub _padding: [u8; 7],
    pub data: [u8; MAX_IMAGE_BYTES],
}

impl ImageData {
    pub const SEED: &'static [u8] = b"image";

    /// Total account size including the discriminator.
    pub const SPACE: usize = ANCHOR_DISCRIMINATOR_SIZE + core::mem::size_of::<Self>();

    /// Offsets of each field within the raw account data.
    pub const OWNER_OFFSET: usize = ANCHOR_DISCRIMINATOR_SIZE + core::mem::offset_of!(Self, owner);
    pub const TOTAL_BYTES_OFFSET: usize =
        ANCHOR_DISCRIMINATOR_SIZE + core::mem::offset_of!(Self, total_bytes);
    pub const IMAGE_TYPE_OFFSET: usize =
        ANCHOR_DISCRIMINATOR_SIZE + core::mem::offset_of!(Self, image_type);
    pub const DATA_OFFSET: usize = ANCHOR_DISCRIMINATOR_SIZE + core::mem::offset_of!(Self, data);

    /// The application bytes, `data[0..total_bytes]`.
    pub fn payload(&self) -> &[u8] {
        let len = usize::try_from(self.total_bytes)
            .map_or(MAX_IMAGE_BYTES, |len| len.min(MAX_IMAGE_BYTES));
        &self.data[..len]
    }
}

/// Image formats recognised from a payload's leading bytes.
#[repr(u8)]
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub enum ImageType {
    Unknown,
    Png,
    Jpeg,
    Gif,
    Webp,
    Tiff,
    Bmp,
    Ico,
    Psd,
    Svg,
    Heif,
    Pdf,
    Eps,
}

impl ImageType {
    pub const PNG_SIGNATURE: &'static [u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const HEIF_BRANDS: [&'static [u8]; 5] = [b"heic", b"heix", b"hevc", b"mif1", b"msf1"];
    /// How far into an XML prolog an `<svg` tag is searched for
    const SVG_SCAN_LIMIT: usize = 256;

    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(Self::PNG_SIGNATURE) {
            Self::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Self::Gif
        } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
            Self::Webp
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Self::Tiff
        } else if bytes.starts_with(b"BM") {
            Self::Bmp
        } else if bytes.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            Self::Ico
        } else if bytes.starts_with(b"8BPS") {
            Self::Psd
        } else if bytes.starts_with(b"%PDF") {
            Self::Pdf
        } else if bytes.starts_with(b"%!PS") || bytes.starts_with(&[0xC5, 0xD0, 0xD3, 0xC6]) {
            Self::Eps
        } else if bytes.get(4..8) == Some(b"ftyp".as_slice())
            && bytes
                .get(8..12)
                .is_some_and(|brand| Self::HEIF_BRANDS.contains(&brand))
        {
            Self::Heif
        } else if Self::looks_like_svg(bytes) {
            Self::Svg
        } else {
            Self::Unknown
        }
    }

    fn looks_like_svg(bytes: &[u8]) -> bool {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let head = &bytes[start..bytes.len().min(start + Self::SVG_SCAN_LIMIT)];

        head.starts_with(b"<svg")
            || (head.starts_with(b"<?xml") && head.windows(4).any(|w| w == b"<svg"))
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Png,
            2 => Self::Jpeg,
            3 => Self::Gif,
            4 => Self::Webp,
            5 => Self::Tiff,
            6 => Self::Bmp,
            7 => Self::Ico,
            8 => Self::Psd,
            9 => Self::Svg,
            10 => Self::Heif,
            11 => Self::Pdf,
            12 => Self::Eps,
            _ => Self::Unknown,
        }
    }
}
