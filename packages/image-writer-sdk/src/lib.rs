//! Off-chain driver for the image-writer program.
//!
//! Uploads are split into chunks and written strictly in order. The program
//! owns the write cursor, so an interrupted upload is resumed by reading it
//! back from the ledger rather than from local state.
//!
//! [`rpc::RpcLedger`] talks to a cluster; [`memory::InMemoryLedger`] applies
//! the same rules in process for tests and dry runs.

pub mod chunking;
pub mod config;
pub mod error;
pub mod memory;
pub mod pda;
pub mod rpc;
pub mod store;
pub mod uploader;

pub use config::{SdkConfig, UploaderConfig};
pub use error::{ConfigError, StoreError, UploadError};
pub use pda::{image_pda, processor_pda, UploadAddresses};
pub use store::{ImageRecord, LedgerStore, ProcessorRecord};
pub use uploader::{ImageUploader, UploadReport};
