use crate::events::ChunkWritten;
use crate::state::{ImageData, ImageProcessor};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct WriteChunk<'info> {
    #[account(
        mut,
        seeds = [ImageProcessor::SEED, processor.seed_key.as_ref(), ImageProcessor::PROCESSOR_SEED],
        bump = processor.bump
    )]
    pub processor: Account<'info, ImageProcessor>,

    #[account(
        mut,
        seeds = [ImageData::SEED, processor.seed_key.as_ref()],
        bump = processor.image_bump
    )]
    pub image: AccountLoader<'info, ImageData>,

    pub owner: Signer<'info>,
}

pub fn write_chunk(ctx: Context<WriteChunk>, chunk: Vec<u8>) -> Result<()> {
    let processor = &mut ctx.accounts.processor;
    let range = processor.append(&ctx.accounts.owner.key(), chunk.len())?;

    let mut image = ctx.accounts.image.load_mut()?;
    image.data[range.clone()].copy_from_slice(&chunk);

    emit!(ChunkWritten {
        processor: processor.key(),
        offset: range.start as u64,
        len: chunk.len() as u32,
        bytes_written: processor.bytes_written,
    });

    msg!(
        "Wrote {} bytes at offset {} ({}/{})",
        chunk.len(),
        range.start,
        processor.bytes_written,
        processor.total_bytes
    );
    Ok(())
}
