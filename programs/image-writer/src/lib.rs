#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use anchor_lang::prelude::*;

pub mod constants;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub mod test_utils;

pub use errors::ImageWriterError;
use instructions::*;
pub use state::{ImageData, ImageProcessor, ImageType};

declare_id!("CYqMMUMJnaEpRVdXNxv3yyMf5MoGFG55tSCgJHNHu4qo");

pub fn get_image_writer_program_path() -> &'static str {
    use std::sync::OnceLock;
    static PATH: OnceLock<String> = OnceLock::new();

    PATH.get_or_init(|| {
        std::env::var("IMAGE_WRITER_PROGRAM_PATH")
            .unwrap_or_else(|_| "../../target/deploy/image_writer".to_string())
    })
}

#[program]
pub mod image_writer {
    use super::*;

    /// Creates the processor and image accounts for `seed_key`, sized for `total_bytes`.
    ///
    /// A `chunk_size` of zero selects [`constants::DEFAULT_CHUNK_SIZE`].
    pub fn initialize(
        ctx: Context<Initialize>,
        seed_key: Pubkey,
        total_bytes: u64,
        chunk_size: u32,
    ) -> Result<()> {
        instructions::initialize(ctx, seed_key, total_bytes, chunk_size)
    }

    /// Appends `chunk` at the processor's cursor.
    pub fn write_chunk(ctx: Context<WriteChunk>, chunk: Vec<u8>) -> Result<()> {
        instructions::write_chunk(ctx, chunk)
    }

    /// Closes a complete upload and records the detected image type.
    pub fn finalize(ctx: Context<Finalize>) -> Result<()> {
        instructions::finalize(ctx)
    }
}
