use anchor_lang::prelude::Pubkey;
use image_writer::state::ImageType;
use image_writer::ImageWriterError;
use image_writer_sdk::memory::{Fault, InMemoryLedger, LedgerHandle};
use image_writer_sdk::{ImageUploader, LedgerStore, SdkConfig, UploadError, UploaderConfig};
use rstest::rstest;
use serde_json::json;

const FUNDS: u64 = 10_000_000_000;

/// A PNG signature followed by filler, `len` bytes in total.
///
/// Payloads shorter than the signature carry only its leading bytes.
fn png_payload(len: usize) -> Vec<u8> {
    let mut payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let prefix = ImageType::PNG_SIGNATURE.len().min(len);
    payload[..prefix].copy_from_slice(&ImageType::PNG_SIGNATURE[..prefix]);
    payload
}

fn funded_store(ledger: &InMemoryLedger) -> LedgerHandle {
    let identity = Pubkey::new_unique();
    ledger.fund(identity, FUNDS);
    ledger.connect(identity)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[rstest]
#[case::three_chunks(1230, 500, vec![500, 500, 230])]
#[case::exact_chunk(500, 500, vec![500])]
#[case::single_byte(1, 500, vec![1])]
#[case::shorter_than_signature(5, 500, vec![5])]
#[case::default_chunk_size(1001, 0, vec![500, 500, 1])]
#[case::max_chunk_size(1800, 900, vec![900, 900])]
fn test_upload_splits_payload(
    #[case] len: usize,
    #[case] chunk_size: u32,
    #[case] expected_writes: Vec<usize>,
) {
    init_tracing();
    let ledger = InMemoryLedger::default();
    let config = UploaderConfig {
        chunk_size,
        ..UploaderConfig::default()
    };
    let uploader = ImageUploader::new(funded_store(&ledger), config);
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(len);

    let report = uploader.upload_new(seed_key, &payload).unwrap();

    assert_eq!(ledger.landed_writes(), expected_writes);
    assert_eq!(report.chunks_sent, expected_writes.len());
    assert_eq!(uploader.read_back(seed_key).unwrap(), payload);
}

#[test]
fn test_interrupted_upload_resumes_at_cursor() {
    init_tracing();
    let ledger = InMemoryLedger::default();
    let store = funded_store(&ledger);
    let uploader = ImageUploader::new(store.clone(), UploaderConfig::default());
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(1230);

    // The first run dies after two confirmed chunks.
    let addresses = uploader.initialize(seed_key, 1230).unwrap();
    store.write_chunk(&addresses, &payload[..500]).unwrap();
    store.write_chunk(&addresses, &payload[500..1000]).unwrap();

    let resume = uploader.resume_point(seed_key).unwrap();
    assert_eq!(resume.bytes_written, 1000);

    let report = uploader.upload(seed_key, &payload).unwrap();

    assert_eq!(report.resumed_from, 1000);
    assert_eq!(report.chunks_sent, 1);
    assert_eq!(report.bytes_sent, 230);
    assert_eq!(ledger.landed_writes(), vec![500, 500, 230]);
    uploader.verify(seed_key, &payload).unwrap();
}

#[test]
fn test_fresh_driver_resumes_another_drivers_upload() {
    let ledger = InMemoryLedger::default();
    let store = funded_store(&ledger);
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(2600);
    let first = ImageUploader::new(store.clone(), UploaderConfig::default());
    first.initialize(seed_key, 2600).unwrap();
    ledger.inject_fault(Fault::TimeoutBeforeLanding);
    ledger.inject_fault(Fault::TimeoutBeforeLanding);
    let config = UploaderConfig {
        max_write_retries: 1,
        ..UploaderConfig::default()
    };
    let flaky = ImageUploader::new(store.clone(), config);
    assert!(matches!(
        flaky.upload(seed_key, &payload).unwrap_err(),
        UploadError::RetriesExhausted {
            attempts: 2,
            bytes_written: 0
        }
    ));

    let second = ImageUploader::new(store, UploaderConfig::default());
    let report = second.upload(seed_key, &payload).unwrap();

    assert_eq!(report.resumed_from, 0);
    assert!(report.is_complete());
    assert_eq!(ledger.landed_writes(), vec![500, 500, 500, 500, 500, 100]);
}

#[test]
fn test_lost_confirmation_does_not_duplicate_bytes() {
    init_tracing();
    let ledger = InMemoryLedger::default();
    let uploader = ImageUploader::new(funded_store(&ledger), UploaderConfig::default());
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(1230);
    uploader.initialize(seed_key, 1230).unwrap();
    ledger.inject_fault(Fault::DropConfirmation);
    ledger.inject_fault(Fault::TimeoutBeforeLanding);

    let report = uploader.upload(seed_key, &payload).unwrap();

    assert_eq!(report.retries, 1);
    assert_eq!(ledger.landed_writes(), vec![500, 500, 230]);
    assert_eq!(uploader.read_back(seed_key).unwrap(), payload);
}

#[test]
fn test_write_landing_after_transport_error_is_not_duplicated() {
    init_tracing();
    let ledger = InMemoryLedger::default();
    let uploader = ImageUploader::new(funded_store(&ledger), UploaderConfig::default());
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(1230);
    uploader.initialize(seed_key, 1230).unwrap();
    ledger.inject_fault(Fault::LandLate);
    ledger.inject_fault(Fault::LandLate);

    let report = uploader.upload(seed_key, &payload).unwrap();

    assert_eq!(report.retries, 0);
    assert_eq!(report.bytes_written, 1230);
    assert_eq!(ledger.landed_writes(), vec![500, 500, 230]);
    uploader.verify(seed_key, &payload).unwrap();
}

#[test]
fn test_other_identity_cannot_write() {
    let ledger = InMemoryLedger::default();
    let owner = ImageUploader::new(funded_store(&ledger), UploaderConfig::default());
    let intruder_store = funded_store(&ledger);
    let seed_key = Pubkey::new_unique();
    let addresses = owner.initialize(seed_key, 1230).unwrap();

    let err = intruder_store.write_chunk(&addresses, &[0xAB; 500]).unwrap_err();

    assert!(err.to_string().contains("not the upload owner"));
    assert_eq!(owner.resume_point(seed_key).unwrap().bytes_written, 0);
    assert!(ledger.landed_writes().is_empty());
}

#[test]
fn test_uploads_with_distinct_seed_keys_are_independent() {
    let ledger = InMemoryLedger::default();
    let uploader = ImageUploader::new(funded_store(&ledger), UploaderConfig::default());
    let first_key = Pubkey::new_unique();
    let second_key = Pubkey::new_unique();
    let first = png_payload(700);
    let second: Vec<u8> = b"GIF89a".iter().copied().chain([0u8; 94]).collect();

    uploader.upload_new(first_key, &first).unwrap();
    uploader.upload_new(second_key, &second).unwrap();

    assert_ne!(
        uploader.addresses(first_key).image,
        uploader.addresses(second_key).image
    );
    assert_eq!(uploader.read_back(first_key).unwrap(), first);
    assert_eq!(uploader.read_back(second_key).unwrap(), second);
    assert_eq!(uploader.finalize(first_key).unwrap(), ImageType::Png);
    assert_eq!(uploader.finalize(second_key).unwrap(), ImageType::Gif);
}

#[test]
fn test_finalize_closes_upload() {
    init_tracing();
    let ledger = InMemoryLedger::default();
    let store = funded_store(&ledger);
    let uploader = ImageUploader::new(store.clone(), UploaderConfig::default());
    let seed_key = Pubkey::new_unique();
    let payload = png_payload(1230);

    uploader.initialize(seed_key, 1230).unwrap();
    let (_, image_type) = uploader.upload_and_finalize(seed_key, &payload).unwrap();

    assert_eq!(image_type, ImageType::Png);
    let addresses = uploader.addresses(seed_key);
    let image = store.fetch_image(&addresses.image).unwrap().unwrap();
    assert_eq!(image.image_type, ImageType::Png);

    let err = store.write_chunk(&addresses, &[0; 1]).unwrap_err();
    assert!(matches!(
        err,
        image_writer_sdk::StoreError::Rejected(ImageWriterError::UploadClosed)
    ));
}

#[test]
fn test_oversized_image_rejected_at_initialize() {
    let ledger = InMemoryLedger::default();
    let uploader = ImageUploader::new(funded_store(&ledger), UploaderConfig::default());
    let seed_key = Pubkey::new_unique();

    let err = uploader.initialize(seed_key, 10_001).unwrap_err();

    assert!(matches!(
        err,
        UploadError::Rejected {
            reason: ImageWriterError::ImageTooLarge,
            ..
        }
    ));
    assert!(!ledger.account_exists(&uploader.addresses(seed_key).processor));
}

#[test]
fn test_uploader_from_json_config() {
    let raw = json!({
        "rpc": { "url": "http://localhost:8899", "commitment": "processed" },
        "uploader": { "chunk_size": 300, "max_write_retries": 1 }
    });
    let config = SdkConfig::from_json_str(&raw.to_string()).unwrap();
    let ledger = InMemoryLedger::default();
    let uploader = ImageUploader::new(funded_store(&ledger), config.uploader);
    let seed_key = Pubkey::new_unique();

    uploader.upload_new(seed_key, &png_payload(700)).unwrap();

    assert_eq!(uploader.resume_point(seed_key).unwrap().chunk_size, 300);
    assert_eq!(ledger.landed_writes(), vec![300, 300, 100]);
}
