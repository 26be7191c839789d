//! Resumable, strictly sequential upload driver.
//!
//! The program keeps the write cursor, so the driver never trusts a local
//! counter: every upload starts from the confirmed `bytes_written`, and every
//! ambiguous failure is resolved by settling the store and then reading the
//! cursor again.

use anchor_lang::prelude::Pubkey;
use image_writer::constants::MAX_CHUNK_SIZE;
use image_writer::state::ImageType;

use crate::chunking::{Chunk, ChunkPlan};
use crate::config::UploaderConfig;
use crate::error::{StoreError, UploadError};
use crate::pda::{AddressDeriver, ProgramAddressDeriver, UploadAddresses};
use crate::store::{LedgerStore, ProcessorRecord};

/// Outcome of a call to [`ImageUploader::upload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Cursor found on chain before the first write
    pub resumed_from: u64,
    pub chunks_sent: usize,
    pub bytes_sent: u64,
    /// Re-sends after an unconfirmed write that did not land
    pub retries: u32,
    /// Cursor after the last confirmed write
    pub bytes_written: u64,
    pub total_bytes: u64,
}

impl UploadReport {
    pub const fn is_complete(&self) -> bool {
        self.bytes_written == self.total_bytes
    }
}

pub struct ImageUploader<S, D = ProgramAddressDeriver> {
    store: S,
    deriver: D,
    config: UploaderConfig,
}

impl<S: LedgerStore> ImageUploader<S> {
    pub fn new(store: S, config: UploaderConfig) -> Self {
        Self::with_deriver(store, ProgramAddressDeriver::default(), config)
    }
}

impl<S: LedgerStore, D: AddressDeriver> ImageUploader<S, D> {
    pub const fn with_deriver(store: S, deriver: D, config: UploaderConfig) -> Self {
        Self {
            store,
            deriver,
            config,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn addresses(&self, seed_key: Pubkey) -> UploadAddresses {
        UploadAddresses::derive(&self.deriver, seed_key)
    }

    /// Creates both records for a payload of `total_bytes`.
    ///
    /// Refuses to touch an existing upload. An unconfirmed initialization is
    /// accepted if the records turn out to exist with the expected shape.
    pub fn initialize(
        &self,
        seed_key: Pubkey,
        total_bytes: u64,
    ) -> Result<UploadAddresses, UploadError> {
        let addresses = self.addresses(seed_key);

        if self.store.fetch_processor(&addresses.processor)?.is_some() {
            return Err(UploadError::AlreadyInitialized {
                seed_key,
                processor: addresses.processor,
            });
        }
        if self.config.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::ChunkSizeTooLarge {
                requested: self.config.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }

        match self
            .store
            .initialize(&addresses, total_bytes, self.config.chunk_size)
        {
            Ok(signature) => {
                tracing::info!(
                    %signature,
                    %seed_key,
                    processor = %addresses.processor,
                    total_bytes,
                    "Upload initialized"
                );
                Ok(addresses)
            }
            Err(StoreError::AlreadyInitialized { .. }) => Err(UploadError::AlreadyInitialized {
                seed_key,
                processor: addresses.processor,
            }),
            Err(err) if err.is_ambiguous() => {
                tracing::warn!(
                    error = %err,
                    %seed_key,
                    "Initialization unconfirmed, checking ledger"
                );
                self.store.settle()?;
                match self.store.fetch_processor(&addresses.processor)? {
                    Some(record)
                        if record.owner == self.store.identity()
                            && record.total_bytes == total_bytes =>
                    {
                        Ok(addresses)
                    }
                    _ => Err(err.into()),
                }
            }
            Err(StoreError::Rejected(reason)) => Err(UploadError::Rejected {
                reason,
                bytes_written: 0,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// The confirmed state of an upload, read from the ledger.
    pub fn resume_point(&self, seed_key: Pubkey) -> Result<ProcessorRecord, UploadError> {
        self.resume_point_at(&self.addresses(seed_key))
    }

    fn resume_point_at(&self, addresses: &UploadAddresses) -> Result<ProcessorRecord, UploadError> {
        self.store
            .fetch_processor(&addresses.processor)?
            .ok_or(UploadError::NotInitialized {
                processor: addresses.processor,
            })
    }

    /// Initializes a fresh upload for `payload` and sends all of it.
    pub fn upload_new(
        &self,
        seed_key: Pubkey,
        payload: &[u8],
    ) -> Result<UploadReport, UploadError> {
        self.initialize(seed_key, payload.len() as u64)?;
        self.upload(seed_key, payload)
    }

    /// Sends whatever part of `payload` is not yet confirmed on chain.
    pub fn upload(&self, seed_key: Pubkey, payload: &[u8]) -> Result<UploadReport, UploadError> {
        let addresses = self.addresses(seed_key);
        let record = self.resume_point_at(&addresses)?;
        self.check_record(&record, payload)?;
        if record.closed {
            return Err(UploadError::Closed {
                processor: addresses.processor,
            });
        }

        let start = record.bytes_written;
        if start > 0 && self.config.verify_on_resume {
            self.verify_prefix(&addresses, payload, start as usize)?;
        }

        let plan = ChunkPlan::new(payload, record.chunk_size as usize)?;
        let mut report = UploadReport {
            resumed_from: start,
            bytes_written: start,
            total_bytes: record.total_bytes,
            ..UploadReport::default()
        };

        tracing::info!(
            %seed_key,
            processor = %addresses.processor,
            total_bytes = record.total_bytes,
            resumed_from = start,
            chunk_size = record.chunk_size,
            "Starting upload"
        );

        for chunk in plan.resume_from(start as usize)? {
            self.send_chunk(&addresses, &chunk, &mut report)?;
        }

        tracing::info!(
            %seed_key,
            chunks_sent = report.chunks_sent,
            bytes_sent = report.bytes_sent,
            retries = report.retries,
            "Upload complete"
        );
        Ok(report)
    }

    fn check_record(&self, record: &ProcessorRecord, payload: &[u8]) -> Result<(), UploadError> {
        if record.total_bytes != payload.len() as u64 {
            return Err(UploadError::PayloadSizeMismatch {
                expected: record.total_bytes,
                payload: payload.len(),
            });
        }
        let identity = self.store.identity();
        if record.owner != identity {
            return Err(UploadError::NotOwner {
                owner: record.owner,
                identity,
            });
        }
        Ok(())
    }

    fn verify_prefix(
        &self,
        addresses: &UploadAddresses,
        payload: &[u8],
        len: usize,
    ) -> Result<(), UploadError> {
        let image = self
            .store
            .fetch_image(&addresses.image)?
            .ok_or(UploadError::NotInitialized {
                processor: addresses.processor,
            })?;

        let stored = image
            .payload()
            .get(..len)
            .ok_or_else(|| StoreError::InvalidAccountData {
                address: addresses.image,
                reason: format!("image holds {} bytes, cursor is at {len}", image.total_bytes),
            })?;

        match first_difference(stored, &payload[..len]) {
            Some(offset) => Err(UploadError::PayloadMismatch { offset }),
            None => Ok(()),
        }
    }

    /// Writes one chunk, resolving unconfirmed attempts against the ledger cursor.
    fn send_chunk(
        &self,
        addresses: &UploadAddresses,
        chunk: &Chunk<'_>,
        report: &mut UploadReport,
    ) -> Result<(), UploadError> {
        let before = report.bytes_written;
        let after = before + chunk.data.len() as u64;
        let mut attempts = 0u32;

        loop {
            match self.store.write_chunk(addresses, chunk.data) {
                Ok(signature) => {
                    tracing::debug!(
                        %signature,
                        index = chunk.index,
                        offset = chunk.offset,
                        len = chunk.data.len(),
                        "Chunk confirmed"
                    );
                    break;
                }
                Err(StoreError::Rejected(reason)) => {
                    return Err(UploadError::Rejected {
                        reason,
                        bytes_written: before,
                    });
                }
                Err(err) if err.is_ambiguous() => {
                    self.store.settle()?;
                    let found = self.resume_point_at(addresses)?.bytes_written;
                    if found == after {
                        tracing::warn!(
                            error = %err,
                            index = chunk.index,
                            "Chunk landed despite unconfirmed write"
                        );
                        break;
                    }
                    if found != before {
                        return Err(UploadError::CursorDiverged {
                            expected: before,
                            found,
                        });
                    }

                    attempts += 1;
                    report.retries += 1;
                    if attempts > self.config.max_write_retries {
                        return Err(UploadError::RetriesExhausted {
                            attempts,
                            bytes_written: before,
                        });
                    }
                    tracing::warn!(
                        error = %err,
                        index = chunk.index,
                        attempt = attempts,
                        "Chunk not landed, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        report.chunks_sent += 1;
        report.bytes_sent += chunk.data.len() as u64;
        report.bytes_written = after;
        Ok(())
    }

    /// Closes a complete upload and returns the detected image type.
    ///
    /// Finalizing an already closed upload returns its stored type.
    pub fn finalize(&self, seed_key: Pubkey) -> Result<ImageType, UploadError> {
        let addresses = self.addresses(seed_key);
        let record = self.resume_point_at(&addresses)?;

        if !record.closed {
            if !record.is_complete() {
                return Err(UploadError::Incomplete {
                    bytes_written: record.bytes_written,
                    total_bytes: record.total_bytes,
                });
            }

            match self.store.finalize(&addresses) {
                Ok(signature) => {
                    tracing::info!(%signature, %seed_key, "Upload finalized");
                }
                Err(err) if err.is_ambiguous() => {
                    self.store.settle()?;
                    if !self.resume_point_at(&addresses)?.closed {
                        return Err(err.into());
                    }
                }
                Err(StoreError::Rejected(reason)) => {
                    return Err(UploadError::Rejected {
                        reason,
                        bytes_written: record.bytes_written,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        let image = self
            .store
            .fetch_image(&addresses.image)?
            .ok_or(UploadError::NotInitialized {
                processor: addresses.processor,
            })?;
        Ok(image.image_type)
    }

    pub fn upload_and_finalize(
        &self,
        seed_key: Pubkey,
        payload: &[u8],
    ) -> Result<(UploadReport, ImageType), UploadError> {
        let report = self.upload(seed_key, payload)?;
        let image_type = self.finalize(seed_key)?;
        Ok((report, image_type))
    }

    /// Returns `data[0..total_bytes]` of the image record.
    pub fn read_back(&self, seed_key: Pubkey) -> Result<Vec<u8>, UploadError> {
        let addresses = self.addresses(seed_key);
        let record = self.resume_point_at(&addresses)?;
        let image = self
            .store
            .fetch_image(&addresses.image)?
            .ok_or(UploadError::NotInitialized {
                processor: addresses.processor,
            })?;

        if image.total_bytes != record.total_bytes {
            return Err(StoreError::InvalidAccountData {
                address: addresses.image,
                reason: format!(
                    "image holds {} bytes, processor expects {}",
                    image.total_bytes, record.total_bytes
                ),
            }
            .into());
        }
        Ok(image.payload().to_vec())
    }

    /// Checks that the upload is complete and byte-identical to `expected`.
    pub fn verify(&self, seed_key: Pubkey, expected: &[u8]) -> Result<(), UploadError> {
        let record = self.resume_point(seed_key)?;
        if !record.is_complete() {
            return Err(UploadError::Incomplete {
                bytes_written: record.bytes_written,
                total_bytes: record.total_bytes,
            });
        }

        let stored = self.read_back(seed_key)?;
        if stored.len() != expected.len() {
            return Err(UploadError::PayloadSizeMismatch {
                expected: record.total_bytes,
                payload: expected.len(),
            });
        }
        match first_difference(&stored, expected) {
            Some(offset) => Err(UploadError::PayloadMismatch { offset }),
            None => Ok(()),
        }
    }
}

fn first_difference(left: &[u8], right: &[u8]) -> Option<usize> {
    left.iter().zip(right).position(|(a, b)| a != b)
}
