use anchor_lang::prelude::Pubkey;
use image_writer::ImageWriterError;
use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::chunking::ChunkingError;

/// Failure of a single round trip to the ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The program rejected the instruction; nothing was applied.
    #[error("rejected by program: {0}")]
    Rejected(ImageWriterError),

    #[error("account {address} already exists")]
    AlreadyInitialized { address: Pubkey },

    #[error(
        "insufficient funds to allocate accounts: {required} lamports required, {available} available"
    )]
    Allocation { required: u64, available: u64 },

    /// The transaction may or may not have landed.
    #[error("confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    /// The request may or may not have reached the cluster.
    #[error("transport error: {0}")]
    Transport(String),

    /// A sent transaction could neither be confirmed nor ruled out in time.
    /// Retrying before its blockhash expires risks applying it twice.
    #[error("transaction {signature} is still unresolved")]
    Unresolved { signature: Signature },

    /// Definitive failure that did not come from this program.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("invalid account data at {address}: {reason}")]
    InvalidAccountData { address: Pubkey, reason: String },
}

impl StoreError {
    /// Whether the outcome of the call is unknown and the ledger must be re-read.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout(_) | Self::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload for seed key {seed_key} already initialized at {processor}")]
    AlreadyInitialized { seed_key: Pubkey, processor: Pubkey },

    #[error("no upload initialized at {processor}")]
    NotInitialized { processor: Pubkey },

    #[error("payload is {payload} bytes but the upload expects {expected}")]
    PayloadSizeMismatch { expected: u64, payload: usize },

    #[error("upload is owned by {owner}, not {identity}")]
    NotOwner { owner: Pubkey, identity: Pubkey },

    #[error("upload at {processor} is already finalized")]
    Closed { processor: Pubkey },

    #[error("chunk size {requested} exceeds the maximum of {max}")]
    ChunkSizeTooLarge { requested: u32, max: u32 },

    #[error("write rejected at {bytes_written} confirmed bytes: {reason}")]
    Rejected {
        reason: ImageWriterError,
        bytes_written: u64,
    },

    #[error("gave up after {attempts} unconfirmed attempts at {bytes_written} confirmed bytes")]
    RetriesExhausted { attempts: u32, bytes_written: u64 },

    #[error("cursor moved unexpectedly: expected {expected}, found {found}")]
    CursorDiverged { expected: u64, found: u64 },

    #[error("stored bytes differ from the payload at offset {offset}")]
    PayloadMismatch { offset: usize },

    #[error("upload incomplete: {bytes_written} of {total_bytes} bytes written")]
    Incomplete { bytes_written: u64, total_bytes: u64 },

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
