/// Capacity of the image data buffer.
///
/// The image account is created through a system program CPI, which caps a
/// single allocation at 10 KiB, so the buffer plus its header must stay below that.
pub const MAX_IMAGE_BYTES: usize = 10_000;

/// Chunk size used when `initialize` is called with `chunk_size = 0`.
pub const DEFAULT_CHUNK_SIZE: u32 = 500;

/// Largest chunk that fits in a single `write_chunk` transaction
/// alongside its signature, account keys and instruction header.
pub const MAX_CHUNK_SIZE: u32 = 900;

/// Size of the Anchor account discriminator prefix.
pub const ANCHOR_DISCRIMINATOR_SIZE: usize = 8;
