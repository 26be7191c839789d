use crate::events::UploadFinalized;
use crate::state::{ImageData, ImageProcessor, ImageType};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct Finalize<'info> {
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

pub fn finalize(ctx: Context<Finalize>) -> Result<()> {
    let processor = &mut ctx.accounts.processor;
    processor.mark_closed(&ctx.accounts.owner.key())?;

    let mut image = ctx.accounts.image.load_mut()?;
    let image_type = ImageType::detect(image.payload());
    image.image_type = image_type as u8;

    emit!(UploadFinalized {
        processor: processor.key(),
        image: processor.image,
        image_type,
        total_bytes: processor.total_bytes,
    });

    msg!(
        "Image upload finalized: {} bytes, type {:?}",
        processor.total_bytes,
        image_type
    );
    Ok(())
}
