//! [`LedgerStore`] backed by a Solana RPC endpoint.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anchor_lang::prelude::Pubkey;
use anchor_lang::{InstructionData, Space, ToAccountMetas};
use image_writer::state::{ImageData, ImageProcessor};
use image_writer::ImageWriterError;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_client::RpcClient;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_program;
use solana_sdk::transaction::{Transaction, TransactionError};

use crate::config::RpcConfig;
use crate::error::{ConfigError, StoreError};
use crate::pda::UploadAddresses;
use crate::store::{ImageRecord, LedgerStore, ProcessorRecord};

/// System program error returned when an address is already allocated.
const ACCOUNT_ALREADY_IN_USE: u32 = 0;

/// Upper bound on waiting for an unconfirmed transaction, well past blockhash expiry.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(150);
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A signed transaction whose outcome the last send could not observe.
#[derive(Debug, Clone, Copy)]
struct PendingTransaction {
    signature: Signature,
    blockhash: Hash,
}

pub struct RpcLedger {
    client: RpcClient,
    payer: Keypair,
    program_id: Pubkey,
    pending: Mutex<Option<PendingTransaction>>,
}

impl RpcLedger {
    pub const fn new(client: RpcClient, payer: Keypair, program_id: Pubkey) -> Self {
        Self {
            client,
            payer,
            program_id,
            pending: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RpcConfig, payer: Keypair) -> Result<Self, ConfigError> {
        let client = RpcClient::new_with_timeout_and_commitment(
            config.url.clone(),
            config.timeout(),
            config.commitment.into(),
        );
        Ok(Self::new(client, payer, config.program_id()?))
    }

    pub const fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn send(&self, instruction: Instruction, processor: Pubkey) -> Result<Signature, StoreError> {
        let blockhash = self
            .client
            .get_latest_blockhash()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.payer.pubkey()),
            &[&self.payer],
            blockhash,
        );

        let signature = transaction.signatures[0];

        match self.client.send_and_confirm_transaction(&transaction) {
            Ok(confirmed) => Ok(confirmed),
            Err(err) => {
                let err = classify_client_error(&err, processor);
                if err.is_ambiguous() {
                    *self.pending() = Some(PendingTransaction {
                        signature,
                        blockhash,
                    });
                }
                Err(err)
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingTransaction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Polls `pending` until it has a status or its blockhash has expired.
    fn wait_for(&self, pending: PendingTransaction) -> Result<(), StoreError> {
        let commitment = self.client.commitment();
        let deadline = Instant::now() + SETTLE_TIMEOUT;

        loop {
            match self.client.get_signature_status(&pending.signature) {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    let expired = matches!(
                        self.client.is_blockhash_valid(&pending.blockhash, commitment),
                        Ok(false)
                    );
                    // It may still have landed in the last valid slot.
                    if expired && self.client.get_signature_status(&pending.signature).is_ok() {
                        return Ok(());
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        error = %err,
                        signature = %pending.signature,
                        "Signature status poll failed"
                    );
                }
            }

            if Instant::now() >= deadline {
                return Err(StoreError::Unresolved {
                    signature: pending.signature,
                });
            }
            std::thread::sleep(SETTLE_POLL_INTERVAL);
        }
    }

    fn fetch_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, StoreError> {
        let account = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .map_err(|e| StoreError::Transport(format!("failed to fetch account {address}: {e}")))?
            .value;

        match account {
            Some(account) if account.owner != self.program_id => {
                Err(StoreError::InvalidAccountData {
                    address: *address,
                    reason: format!("owned by {}, expected {}", account.owner, self.program_id),
                })
            }
            Some(account) => Ok(Some(account.data)),
            None => Ok(None),
        }
    }

    /// Fails early when the payer cannot cover rent for both accounts.
    fn ensure_rent(&self) -> Result<(), StoreError> {
        let transport = |e: ClientError| StoreError::Transport(e.to_string());

        let required = self
            .client
            .get_minimum_balance_for_rent_exemption(8 + ImageProcessor::INIT_SPACE)
            .map_err(transport)?
            + self
                .client
                .get_minimum_balance_for_rent_exemption(ImageData::SPACE)
                .map_err(transport)?;
        let available = self
            .client
            .get_balance(&self.payer.pubkey())
            .map_err(transport)?;

        if available < required {
            return Err(StoreError::Allocation {
                required,
                available,
            });
        }
        Ok(())
    }
}

impl LedgerStore for RpcLedger {
    fn identity(&self) -> Pubkey {
        self.payer.pubkey()
    }

    fn initialize(
        &self,
        addresses: &UploadAddresses,
        total_bytes: u64,
        chunk_size: u32,
    ) -> Result<Signature, StoreError> {
        self.ensure_rent()?;

        let instruction = Instruction {
            program_id: self.program_id,
            accounts: image_writer::accounts::Initialize {
                processor: addresses.processor,
                image: addresses.image,
                owner: self.payer.pubkey(),
                system_program: system_program::ID,
            }
            .to_account_metas(None),
            data: image_writer::instruction::Initialize {
                seed_key: addresses.seed_key,
                total_bytes,
                chunk_size,
            }
            .data(),
        };

        let signature = self.send(instruction, addresses.processor)?;
        tracing::info!(
            %signature,
            processor = %addresses.processor,
            image = %addresses.image,
            total_bytes,
            "Initialized image upload"
        );
        Ok(signature)
    }

    fn write_chunk(
        &self,
        addresses: &UploadAddresses,
        chunk: &[u8],
    ) -> Result<Signature, StoreError> {
        let instruction = Instruction {
            program_id: self.program_id,
            accounts: image_writer::accounts::WriteChunk {
                processor: addresses.processor,
                image: addresses.image,
                owner: self.payer.pubkey(),
            }
            .to_account_metas(None),
            data: image_writer::instruction::WriteChunk {
                chunk: chunk.to_vec(),
            }
            .data(),
        };

        self.send(instruction, addresses.processor)
    }

    fn finalize(&self, addresses: &UploadAddresses) -> Result<Signature, StoreError> {
        let instruction = Instruction {
            program_id: self.program_id,
            accounts: image_writer::accounts::Finalize {
                processor: addresses.processor,
                image: addresses.image,
                owner: self.payer.pubkey(),
            }
            .to_account_metas(None),
            data: image_writer::instruction::Finalize {}.data(),
        };

        self.send(instruction, addresses.processor)
    }

    fn settle(&self) -> Result<(), StoreError> {
        let Some(pending) = *self.pending() else {
            return Ok(());
        };

        tracing::info!(signature = %pending.signature, "Waiting for unconfirmed transaction");
        self.wait_for(pending)?;
        *self.pending() = None;
        Ok(())
    }

    fn fetch_processor(&self, address: &Pubkey) -> Result<Option<ProcessorRecord>, StoreError> {
        self.fetch_account_data(address)?
            .map(|data| ProcessorRecord::from_account_data(address, &data))
            .transpose()
    }

    fn fetch_image(&self, address: &Pubkey) -> Result<Option<ImageRecord>, StoreError> {
        self.fetch_account_data(address)?
            .map(|data| ImageRecord::from_account_data(address, &data))
            .transpose()
    }
}

/// Maps an RPC failure onto the store's error taxonomy.
///
/// A transaction error means the cluster executed (or simulated) the transaction
/// and rejected it. Without one, the transaction may still land.
pub fn classify_client_error(err: &ClientError, processor: Pubkey) -> StoreError {
    match err.get_transaction_error() {
        Some(tx_err) => classify_transaction_error(&tx_err, processor),
        None => match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
                StoreError::Transport(err.to_string())
            }
            _ => StoreError::ConfirmationTimeout(err.to_string()),
        },
    }
}

pub fn classify_transaction_error(err: &TransactionError, processor: Pubkey) -> StoreError {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
            if let Some(program_error) = ImageWriterError::from_code(*code) {
                StoreError::Rejected(program_error)
            } else if *code == ACCOUNT_ALREADY_IN_USE {
                StoreError::AlreadyInitialized { address: processor }
            } else {
                StoreError::TransactionFailed(err.to_string())
            }
        }
        TransactionError::BlockhashNotFound => StoreError::ConfirmationTimeout(err.to_string()),
        _ => StoreError::TransactionFailed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_errors_map_to_rejections() {
        let processor = Pubkey::new_unique();
        let err = TransactionError::InstructionError(
            0,
            InstructionError::Custom(ImageWriterError::WriteOverflow.code()),
        );

        let classified = classify_transaction_error(&err, processor);

        assert!(matches!(
            classified,
            StoreError::Rejected(ImageWriterError::WriteOverflow)
        ));
        assert!(!classified.is_ambiguous());
    }

    #[test]
    fn test_account_in_use_maps_to_already_initialized() {
        let processor = Pubkey::new_unique();
        let err = TransactionError::InstructionError(0, InstructionError::Custom(0));

        let classified = classify_transaction_error(&err, processor);

        assert!(matches!(
            classified,
            StoreError::AlreadyInitialized { address } if address == processor
        ));
    }

    #[test]
    fn test_expired_blockhash_is_ambiguous() {
        let classified =
            classify_transaction_error(&TransactionError::BlockhashNotFound, Pubkey::new_unique());

        assert!(classified.is_ambiguous());
    }

    #[test]
    fn test_other_failures_are_definitive() {
        let classified = classify_transaction_error(
            &TransactionError::InsufficientFundsForFee,
            Pubkey::new_unique(),
        );
        assert!(matches!(classified, StoreError::TransactionFailed(_)));

        let classified = classify_transaction_error(
            &TransactionError::InstructionError(0, InstructionError::Custom(3012)),
            Pubkey::new_unique(),
        );
        assert!(matches!(classified, StoreError::TransactionFailed(_)));
    }

    #[test]
    fn test_client_error_without_transaction_error_is_ambiguous() {
        let err = ClientError::from(ClientErrorKind::Custom(
            "unable to confirm transaction".to_string(),
        ));

        assert!(classify_client_error(&err, Pubkey::new_unique()).is_ambiguous());
    }

    #[test]
    fn test_client_error_with_transaction_error_is_definitive() {
        let err = ClientError::from(TransactionError::InstructionError(
            0,
            InstructionError::Custom(ImageWriterError::Unauthorized.code()),
        ));

        assert!(matches!(
            classify_client_error(&err, Pubkey::new_unique()),
            StoreError::Rejected(ImageWriterError::Unauthorized)
        ));
    }

    #[test]
    fn test_from_config_uses_configured_program() {
        let program_id = Pubkey::new_unique();
        let config = RpcConfig {
            url: "http://localhost:8899".to_string(),
            commitment: crate::config::Commitment::Confirmed,
            timeout_secs: 1,
            program_id: Some(program_id.to_string()),
        };

        let ledger = RpcLedger::from_config(&config, Keypair::new()).unwrap();

        assert_eq!(ledger.program_id(), program_id);
    }

    #[test]
    fn test_settle_without_pending_transaction_returns_immediately() {
        let config = RpcConfig {
            url: "http://localhost:8899".to_string(),
            commitment: crate::config::Commitment::Confirmed,
            timeout_secs: 1,
            program_id: None,
        };
        let ledger = RpcLedger::from_config(&config, Keypair::new()).unwrap();

        ledger.settle().unwrap();

        assert!(ledger.pending().is_none());
    }
}
