use crate::events::UploadInitialized;
use crate::state::{ImageData, ImageProcessor, ImageType};
use anchor_lang::prelude::*;

#[derive(Accounts)]
#[instruction(seed_key: Pubkey)]
pub struct Initialize<'info> {
    #[account(
        init,
        payer = owner,
        space = 8 + ImageProcessor::INIT_SPACE,
        seeds = [ImageProcessor::SEED, seed_key.as_ref(), ImageProcessor::PROCESSOR_SEED],
        bump
    )]
    pub processor: Account<'info, ImageProcessor>,

    #[account(
        init,
        payer = owner,
        space = ImageData::SPACE,
        seeds = [ImageData::SEED, seed_key.as_ref()],
        bump
    )]
    pub image: AccountLoader<'info, ImageData>,

    /// Pays for both accounts and becomes the upload owner
    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn initialize(
    ctx: Context<Initialize>,
    seed_key: Pubkey,
    total_bytes: u64,
    chunk_size: u32,
) -> Result<()> {
    let chunk_size = ImageProcessor::validate_params(total_bytes, chunk_size)?;
    let owner = ctx.accounts.owner.key();

    {
        let mut image = ctx.accounts.image.load_init()?;
        image.owner = owner;
        image.total_bytes = total_bytes;
        image.image_type = ImageType::Unknown as u8;
    }

    let processor = &mut ctx.accounts.processor;
    processor.set_inner(ImageProcessor {
        bump: ctx.bumps.processor,
        image_bump: ctx.bumps.image,
        owner,
        seed_key,
        image: ctx.accounts.image.key(),
        total_bytes,
        chunk_size,
        bytes_written: 0,
        closed: false,
    });

    emit!(UploadInitialized {
        processor: processor.key(),
        image: processor.image,
        owner,
        seed_key,
        total_bytes,
        chunk_size,
    });

    msg!(
        "Image upload initialized: seed_key={}, total_bytes={}, chunk_size={}",
        seed_key,
        total_bytes,
        chunk_size
    );
    Ok(())
}
