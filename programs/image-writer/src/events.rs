use crate::state::ImageType;
use anchor_lang::prelude::*;

#[event]
#[derive(Debug, Clone)]
pub struct UploadInitialized {
    pub processor: Pubkey,
    pub image: Pubkey,
    pub owner: Pubkey,
    pub seed_key: Pubkey,
    pub total_bytes: u64,
    pub chunk_size: u32,
}

#[event]
#[derive(Debug, Clone)]
pub struct ChunkWritten {
    pub processor: Pubkey,
    /// Offset of the first byte of this chunk
    pub offset: u64,
    pub len: u32,
    /// Cursor after the write
    pub bytes_written: u64,
}

#[event]
#[derive(Debug, Clone)]
pub struct UploadFinalized {
    pub processor: Pubkey,
    pub image: Pubkey,
    pub image_type: ImageType,
    pub total_bytes: u64,
}
