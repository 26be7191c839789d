use anchor_lang::prelude::*;

#[error_code]
pub enum ImageWriterError {
    #[msg("Unauthorized: signer is not the upload owner")]
    Unauthorized,
    #[msg("Upload has already been finalized")]
    UploadClosed,
    #[msg("Chunk must contain at least one byte")]
    EmptyChunk,
    #[msg("Chunk exceeds the upload's chunk size")]
    ChunkTooLarge,
    #[msg("Chunk would write past the declared total size")]
    WriteOverflow,
    #[msg("Declared image size must be greater than zero")]
    EmptyImage,
    #[msg("Declared image size exceeds the image account capacity")]
    ImageTooLarge,
    #[msg("Chunk size exceeds the per-transaction maximum")]
    InvalidChunkSize,
    #[msg("Upload has not received all of its bytes")]
    UploadIncomplete,
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,
}

impl ImageWriterError {
    pub const ALL: [Self; 10] = [
        Self::Unauthorized,
        Self::UploadClosed,
        Self::EmptyChunk,
        Self::ChunkTooLarge,
        Self::WriteOverflow,
        Self::EmptyImage,
        Self::ImageTooLarge,
        Self::InvalidChunkSize,
        Self::UploadIncomplete,
        Self::ArithmeticOverflow,
    ];

    /// Maps a custom program error code (including the Anchor offset) back to its variant.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|error| error.code() == code)
    }

    /// Custom program error code as reported in `InstructionError::Custom`.
    pub const fn code(self) -> u32 {
        anchor_lang::error::ERROR_CODE_OFFSET + self as u32
    }
}
