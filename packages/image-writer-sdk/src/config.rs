//! Configuration for the upload driver.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use image_writer::constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use solana_sdk::commitment_config::CommitmentConfig;

use crate::error::ConfigError;

/// The top level configuration for the SDK.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SdkConfig {
    /// How to reach the cluster.
    pub rpc: RpcConfig,
    /// How uploads are driven.
    #[serde(default)]
    pub uploader: UploaderConfig,
}

/// The configuration for the Solana RPC connection.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct RpcConfig {
    /// The Solana RPC URL.
    pub url: String,
    /// Commitment level used for reads and confirmations.
    #[serde(default)]
    pub commitment: Commitment,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// The image-writer program ID. Defaults to the compiled-in ID.
    #[serde(default)]
    pub program_id: Option<String>,
}

/// The configuration for the uploader.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct UploaderConfig {
    /// Chunk size requested at initialization. Zero lets the program pick its default.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// How many times an unconfirmed write is re-sent before giving up.
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,
    /// Compare bytes already on chain with the payload before resuming.
    #[serde(default = "default_true")]
    pub verify_on_resume: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

const fn default_max_write_retries() -> u32 {
    3
}

/// Returns true, used as a default value for boolean fields.
const fn default_true() -> bool {
    true
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_write_retries: default_max_write_retries(),
            verify_on_resume: true,
        }
    }
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => Self::processed(),
            Commitment::Confirmed => Self::confirmed(),
            Commitment::Finalized => Self::finalized(),
        }
    }
}

impl RpcConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured program ID, or the compiled-in one.
    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        self.program_id.as_deref().map_or(Ok(image_writer::ID), |id| {
            Pubkey::from_str(id)
                .map_err(|e| ConfigError::Invalid(format!("rpc.program_id `{id}`: {e}")))
        })
    }
}

impl SdkConfig {
    /// Checks constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.url.is_empty() {
            return Err(ConfigError::Invalid("rpc.url must not be empty".to_string()));
        }
        if self.uploader.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "uploader.chunk_size {} exceeds the maximum of {MAX_CHUNK_SIZE}",
                self.uploader.chunk_size
            )));
        }
        self.rpc.program_id()?;
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_config(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parse a JSON document into the target struct while producing detailed
/// path-aware error messages (e.g. `uploader.chunk_size`).
pub fn parse_config<T>(json: &str) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_str(json);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|e| ConfigError::Parse {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}
