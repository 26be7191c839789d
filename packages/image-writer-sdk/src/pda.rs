//! Deterministic addressing for the two records of an upload.
//!
//! Both addresses are program derived, so they sit off the ed25519 curve and
//! no private key exists for them. Anyone holding the seed key and program id
//! can recompute them.

use anchor_lang::prelude::Pubkey;
use image_writer::state::{ImageData, ImageProcessor};

/// Which of the two upload records an address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordRole {
    Processor,
    Image,
}

/// Derives record addresses from a seed key.
pub trait AddressDeriver {
    fn derive(&self, seed_key: &Pubkey, role: RecordRole) -> (Pubkey, u8);
}

/// Program derived addresses under a fixed program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAddressDeriver {
    program_id: Pubkey,
}

impl ProgramAddressDeriver {
    pub const fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub const fn program_id(&self) -> Pubkey {
        self.program_id
    }
}

impl Default for ProgramAddressDeriver {
    fn default() -> Self {
        Self::new(image_writer::ID)
    }
}

impl AddressDeriver for ProgramAddressDeriver {
    fn derive(&self, seed_key: &Pubkey, role: RecordRole) -> (Pubkey, u8) {
        match role {
            RecordRole::Processor => processor_pda(seed_key, &self.program_id),
            RecordRole::Image => image_pda(seed_key, &self.program_id),
        }
    }
}

/// Derives the processor (metadata and cursor) PDA.
///
/// Seeds: `[b"image", seed_key, b"processor"]`
#[must_use]
pub fn processor_pda(seed_key: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            ImageProcessor::SEED,
            seed_key.as_ref(),
            ImageProcessor::PROCESSOR_SEED,
        ],
        program_id,
    )
}

/// Derives the image data PDA.
///
/// Seeds: `[b"image", seed_key]`
#[must_use]
pub fn image_pda(seed_key: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ImageData::SEED, seed_key.as_ref()], program_id)
}

/// The address pair of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAddresses {
    pub seed_key: Pubkey,
    pub processor: Pubkey,
    pub image: Pubkey,
}

impl UploadAddresses {
    pub fn derive<D: AddressDeriver + ?Sized>(deriver: &D, seed_key: Pubkey) -> Self {
        Self {
            seed_key,
            processor: deriver.derive(&seed_key, RecordRole::Processor).0,
            image: deriver.derive(&seed_key, RecordRole::Image).0,
        }
    }
}
