//! The ledger seam: everything the uploader needs from the chain.

use anchor_lang::prelude::Pubkey;
use anchor_lang::{AccountDeserialize, Discriminator};
use image_writer::constants::MAX_IMAGE_BYTES;
use image_writer::state::{ImageData, ImageProcessor, ImageType};
use solana_sdk::signature::Signature;

use crate::error::StoreError;
use crate::pda::UploadAddresses;

/// A transactional account store holding upload records.
///
/// Every call is one blocking round trip signed by [`LedgerStore::identity`].
/// Mutating calls return once the transaction is confirmed or has definitively
/// failed; an ambiguous outcome is reported as an error for which
/// [`StoreError::is_ambiguous`] holds.
pub trait LedgerStore {
    fn identity(&self) -> Pubkey;

    fn initialize(
        &self,
        addresses: &UploadAddresses,
        total_bytes: u64,
        chunk_size: u32,
    ) -> Result<Signature, StoreError>;

    fn write_chunk(&self, addresses: &UploadAddresses, chunk: &[u8])
        -> Result<Signature, StoreError>;

    fn finalize(&self, addresses: &UploadAddresses) -> Result<Signature, StoreError>;

    /// Blocks until no transaction this store sent can still land.
    ///
    /// Called after an ambiguous failure and before the ledger is re-read, so
    /// that a cursor which has not moved means the write will never land.
    fn settle(&self) -> Result<(), StoreError>;

    fn fetch_processor(&self, address: &Pubkey) -> Result<Option<ProcessorRecord>, StoreError>;

    fn fetch_image(&self, address: &Pubkey) -> Result<Option<ImageRecord>, StoreError>;
}

/// Client view of an [`ImageProcessor`] account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorRecord {
    pub owner: Pubkey,
    pub seed_key: Pubkey,
    pub image: Pubkey,
    pub total_bytes: u64,
    pub chunk_size: u32,
    pub bytes_written: u64,
    pub closed: bool,
}

impl ProcessorRecord {
    pub fn from_account_data(address: &Pubkey, data: &[u8]) -> Result<Self, StoreError> {
        let processor = ImageProcessor::try_deserialize(&mut &data[..]).map_err(|e| {
            StoreError::InvalidAccountData {
                address: *address,
                reason: e.to_string(),
            }
        })?;
        Ok(processor.into())
    }

    pub const fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.bytes_written)
    }

    pub const fn is_complete(&self) -> bool {
        self.bytes_written == self.total_bytes
    }
}

impl From<ImageProcessor> for ProcessorRecord {
    fn from(processor: ImageProcessor) -> Self {
        Self {
            owner: processor.owner,
            seed_key: processor.seed_key,
            image: processor.image,
            total_bytes: processor.total_bytes,
            chunk_size: processor.chunk_size,
            bytes_written: processor.bytes_written,
            closed: processor.closed,
        }
    }
}

/// Client view of an [`ImageData`] account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub owner: Pubkey,
    pub total_bytes: u64,
    pub image_type: ImageType,
    /// The whole fixed-capacity buffer
    pub buffer: Vec<u8>,
}

impl ImageRecord {
    /// Decodes the raw zero-copy layout; the data is not aligned, so it is read field by field.
    pub fn from_account_data(address: &Pubkey, data: &[u8]) -> Result<Self, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidAccountData {
            address: *address,
            reason: reason.to_string(),
        };

        if data.len() < ImageData::SPACE {
            return Err(invalid("account data too short for image account"));
        }
        if !data.starts_with(ImageData::DISCRIMINATOR) {
            return Err(invalid("discriminator mismatch"));
        }

        let owner_bytes = &data[ImageData::OWNER_OFFSET..ImageData::OWNER_OFFSET + 32];
        let owner = Pubkey::try_from(owner_bytes).map_err(|_| invalid("malformed owner"))?;
        let total_bytes = data[ImageData::TOTAL_BYTES_OFFSET..ImageData::TOTAL_BYTES_OFFSET + 8]
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| invalid("malformed total_bytes"))?;
        if total_bytes > MAX_IMAGE_BYTES as u64 {
            return Err(invalid("total_bytes exceeds image capacity"));
        }

        Ok(Self {
            owner,
            total_bytes,
            image_type: ImageType::from_u8(data[ImageData::IMAGE_TYPE_OFFSET]),
            buffer: data[ImageData::DATA_OFFSET..ImageData::SPACE].to_vec(),
        })
    }

    /// The declared payload, `buffer[0..total_bytes]`.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.total_bytes as usize]
    }
}
