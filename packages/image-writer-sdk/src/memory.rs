//! In-process ledger that applies the program's own validation rules.
//!
//! Accounts are kept in their on-chain byte layout so reads go through the
//! same decoding as the RPC-backed store. Faults can be queued to reproduce
//! lost confirmations and transactions that land after the caller gave up.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anchor_lang::prelude::Pubkey;
use anchor_lang::{AccountDeserialize, AccountSerialize, Discriminator, Space};
use image_writer::state::{ImageData, ImageProcessor, ImageType};
use solana_sdk::rent::Rent;
use solana_sdk::signature::Signature;

use crate::error::StoreError;
use crate::pda::{AddressDeriver, ProgramAddressDeriver, RecordRole, UploadAddresses};
use crate::store::{ImageRecord, LedgerStore, ProcessorRecord};

const PROCESSOR_SPACE: usize = 8 + ImageProcessor::INIT_SPACE;

/// A failure injected into the next `write_chunk` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The write is applied but the caller sees a confirmation timeout.
    DropConfirmation,
    /// The write is not applied and the caller sees a confirmation timeout.
    TimeoutBeforeLanding,
    /// The caller sees a transport error while the write stays in flight.
    /// It lands on the next `write_chunk` or `settle`, whichever comes first.
    LandLate,
}

/// A write whose transaction has not landed yet.
#[derive(Debug, Clone)]
struct InFlightWrite {
    identity: Pubkey,
    addresses: UploadAddresses,
    chunk: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StoredAccount {
    lamports: u64,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, StoredAccount>,
    balances: HashMap<Pubkey, u64>,
    faults: VecDeque<Fault>,
    landed_writes: Vec<usize>,
    in_flight: Vec<InFlightWrite>,
    transactions: u64,
}

fn not_initialized(address: &Pubkey) -> StoreError {
    StoreError::TransactionFailed(format!("account {address} not initialized"))
}

impl LedgerState {
    fn next_signature(&mut self) -> Signature {
        self.transactions += 1;
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&self.transactions.to_le_bytes());
        Signature::from(bytes)
    }

    fn processor(&self, address: &Pubkey) -> Result<ImageProcessor, StoreError> {
        let account = self
            .accounts
            .get(address)
            .ok_or_else(|| not_initialized(address))?;
        ImageProcessor::try_deserialize(&mut &account.data[..]).map_err(|e| {
            StoreError::InvalidAccountData {
                address: *address,
                reason: e.to_string(),
            }
        })
    }

    fn store_processor(
        &mut self,
        address: Pubkey,
        processor: &ImageProcessor,
    ) -> Result<(), StoreError> {
        let mut data = Vec::with_capacity(PROCESSOR_SPACE);
        processor
            .try_serialize(&mut data)
            .map_err(|e| StoreError::InvalidAccountData {
                address,
                reason: e.to_string(),
            })?;
        data.resize(PROCESSOR_SPACE, 0);

        match self.accounts.get_mut(&address) {
            Some(account) => account.data = data,
            None => {
                self.accounts.insert(address, StoredAccount { lamports: 0, data });
            }
        }
        Ok(())
    }

    fn image_data_mut(&mut self, address: &Pubkey) -> Result<&mut Vec<u8>, StoreError> {
        self.accounts
            .get_mut(address)
            .map(|account| &mut account.data)
            .ok_or_else(|| not_initialized(address))
    }

    /// Executes one `write_chunk` transaction against the stored accounts.
    fn apply_write(
        &mut self,
        identity: &Pubkey,
        addresses: &UploadAddresses,
        chunk: &[u8],
    ) -> Result<(), StoreError> {
        let mut processor = self.processor(&addresses.processor)?;
        let range = processor
            .append(identity, chunk.len())
            .map_err(StoreError::Rejected)?;

        let image = self.image_data_mut(&addresses.image)?;
        let start = ImageData::DATA_OFFSET + range.start;
        image[start..start + chunk.len()].copy_from_slice(chunk);
        self.store_processor(addresses.processor, &processor)?;
        self.landed_writes.push(chunk.len());
        Ok(())
    }

    /// Lands every in-flight write, in the order it was sent.
    fn land_in_flight(&mut self) {
        for write in std::mem::take(&mut self.in_flight) {
            if let Err(err) = self.apply_write(&write.identity, &write.addresses, &write.chunk) {
                tracing::debug!(error = %err, "In-flight write failed on landing");
            }
        }
    }
}

/// Shared in-memory ledger. Clones refer to the same state.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    deriver: ProgramAddressDeriver,
    rent: Rent,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(ProgramAddressDeriver::default())
    }
}

impl InMemoryLedger {
    pub fn new(deriver: ProgramAddressDeriver) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            deriver,
            rent: Rent::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A store handle that signs as `identity`.
    pub fn connect(&self, identity: Pubkey) -> LedgerHandle {
        LedgerHandle {
            ledger: self.clone(),
            identity,
        }
    }

    pub fn fund(&self, identity: Pubkey, lamports: u64) {
        let mut state = self.state();
        let balance = state.balances.entry(identity).or_default();
        *balance = balance.saturating_add(lamports);
    }

    pub fn balance(&self, identity: &Pubkey) -> u64 {
        self.state().balances.get(identity).copied().unwrap_or_default()
    }

    /// Lamports needed to create both accounts of one upload.
    pub fn upload_rent(&self) -> u64 {
        self.rent.minimum_balance(PROCESSOR_SPACE) + self.rent.minimum_balance(ImageData::SPACE)
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Lengths of every chunk applied so far, in order.
    pub fn landed_writes(&self) -> Vec<usize> {
        self.state().landed_writes.clone()
    }

    pub fn account_exists(&self, address: &Pubkey) -> bool {
        self.state().accounts.contains_key(address)
    }

    fn check_addresses(&self, addresses: &UploadAddresses) -> Result<(), StoreError> {
        let expected = UploadAddresses::derive(&self.deriver, addresses.seed_key);
        if expected == *addresses {
            Ok(())
        } else {
            Err(StoreError::TransactionFailed(
                "seeds constraint violated".to_string(),
            ))
        }
    }

    fn initialize(
        &self,
        identity: Pubkey,
        addresses: &UploadAddresses,
        total_bytes: u64,
        chunk_size: u32,
    ) -> Result<Signature, StoreError> {
        self.check_addresses(addresses)?;
        let mut state = self.state();

        for address in [addresses.processor, addresses.image] {
            if state.accounts.contains_key(&address) {
                return Err(StoreError::AlreadyInitialized { address });
            }
        }

        let processor_rent = self.rent.minimum_balance(PROCESSOR_SPACE);
        let image_rent = self.rent.minimum_balance(ImageData::SPACE);
        let required = processor_rent + image_rent;
        let available = state.balances.get(&identity).copied().unwrap_or_default();
        if available < required {
            return Err(StoreError::Allocation {
                required,
                available,
            });
        }

        let chunk_size = ImageProcessor::validate_params(total_bytes, chunk_size)
            .map_err(StoreError::Rejected)?;

        let processor = ImageProcessor {
            bump: self.deriver.derive(&addresses.seed_key, RecordRole::Processor).1,
            image_bump: self.deriver.derive(&addresses.seed_key, RecordRole::Image).1,
            owner: identity,
            seed_key: addresses.seed_key,
            image: addresses.image,
            total_bytes,
            chunk_size,
            bytes_written: 0,
            closed: false,
        };
        state.store_processor(addresses.processor, &processor)?;
        if let Some(account) = state.accounts.get_mut(&addresses.processor) {
            account.lamports = processor_rent;
        }

        let mut image = vec![0u8; ImageData::SPACE];
        image[..8].copy_from_slice(ImageData::DISCRIMINATOR);
        image[ImageData::OWNER_OFFSET..ImageData::OWNER_OFFSET + 32]
            .copy_from_slice(identity.as_ref());
        image[ImageData::TOTAL_BYTES_OFFSET..ImageData::TOTAL_BYTES_OFFSET + 8]
            .copy_from_slice(&total_bytes.to_le_bytes());
        image[ImageData::IMAGE_TYPE_OFFSET] = ImageType::Unknown as u8;
        state.accounts.insert(
            addresses.image,
            StoredAccount {
                lamports: image_rent,
                data: image,
            },
        );

        state.balances.insert(identity, available - required);
        Ok(state.next_signature())
    }

    fn write_chunk(
        &self,
        identity: Pubkey,
        addresses: &UploadAddresses,
        chunk: &[u8],
    ) -> Result<Signature, StoreError> {
        self.check_addresses(addresses)?;
        let mut state = self.state();

        state.land_in_flight();

        match state.faults.pop_front() {
            Some(Fault::TimeoutBeforeLanding) => {
                return Err(StoreError::ConfirmationTimeout(
                    "transaction was not confirmed before its blockhash expired".to_string(),
                ));
            }
            Some(Fault::LandLate) => {
                state.in_flight.push(InFlightWrite {
                    identity,
                    addresses: *addresses,
                    chunk: chunk.to_vec(),
                });
                return Err(StoreError::Transport(
                    "request timed out before the node answered".to_string(),
                ));
            }
            Some(Fault::DropConfirmation) => {
                state.apply_write(&identity, addresses, chunk)?;
                let signature = state.next_signature();
                return Err(StoreError::ConfirmationTimeout(format!(
                    "transaction {signature} was not confirmed before its blockhash expired"
                )));
            }
            None => {}
        }

        state.apply_write(&identity, addresses, chunk)?;
        Ok(state.next_signature())
    }

    fn settle(&self) {
        self.state().land_in_flight();
    }

    fn finalize(
        &self,
        identity: Pubkey,
        addresses: &UploadAddresses,
    ) -> Result<Signature, StoreError> {
        self.check_addresses(addresses)?;
        let mut state = self.state();

        let mut processor = state.processor(&addresses.processor)?;
        processor.mark_closed(&identity).map_err(StoreError::Rejected)?;

        let total_bytes = processor.total_bytes as usize;
        let image = state.image_data_mut(&addresses.image)?;
        let payload = &image[ImageData::DATA_OFFSET..ImageData::DATA_OFFSET + total_bytes];
        let image_type = ImageType::detect(payload);
        image[ImageData::IMAGE_TYPE_OFFSET] = image_type as u8;
        state.store_processor(addresses.processor, &processor)?;

        Ok(state.next_signature())
    }

    fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.state()
            .accounts
            .get(address)
            .map(|account| account.data.clone())
    }
}

/// A connection to an [`InMemoryLedger`] signing as one identity.
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    ledger: InMemoryLedger,
    identity: Pubkey,
}

impl LedgerHandle {
    pub const fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }
}

impl LedgerStore for LedgerHandle {
    fn identity(&self) -> Pubkey {
        self.identity
    }

    fn initialize(
        &self,
        addresses: &UploadAddresses,
        total_bytes: u64,
        chunk_size: u32,
    ) -> Result<Signature, StoreError> {
        self.ledger
            .initialize(self.identity, addresses, total_bytes, chunk_size)
    }

    fn write_chunk(
        &self,
        addresses: &UploadAddresses,
        chunk: &[u8],
    ) -> Result<Signature, StoreError> {
        self.ledger.write_chunk(self.identity, addresses, chunk)
    }

    fn finalize(&self, addresses: &UploadAddresses) -> Result<Signature, StoreError> {
        self.ledger.finalize(self.identity, addresses)
    }

    fn settle(&self) -> Result<(), StoreError> {
        self.ledger.settle();
        Ok(())
    }

    fn fetch_processor(&self, address: &Pubkey) -> Result<Option<ProcessorRecord>, StoreError> {
        self.ledger
            .account_data(address)
            .map(|data| ProcessorRecord::from_account_data(address, &data))
            .transpose()
    }

    fn fetch_image(&self, address: &Pubkey) -> Result<Option<ImageRecord>, StoreError> {
        self.ledger
            .account_data(address)
            .map(|data| ImageRecord::from_account_data(address, &data))
            .transpose()
    }
}
