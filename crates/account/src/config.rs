//! Tunables of an account and its multisig signer.

use std::path::Path;

/// Default cap on multisig owner slots.
pub const DEFAULT_MAX_OWNERS: usize = 20;

/// Default cap on the size of an aggregated multisig signature (8KB).
pub const DEFAULT_MAX_SIGNATURE_DATA: usize = 8192;

/// Default cap on the number of calls in one batch.
pub const DEFAULT_MAX_CALLS_PER_BATCH: usize = 256;

/// Configuration of the access-control engine.
///
/// Every field is optional in the toml representation and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "DeserConfig")]
pub struct GuardConfig {
    pub max_owners: usize,
    pub max_signature_data: usize,
    pub max_calls_per_batch: usize,

    /// Reject guarded calls moving an asset that has no spend limit while spend limits are
    /// enabled for the key.
    pub deny_unlisted_tokens: bool,

    /// Accumulate spend for super admin keys. Super admins are never rejected by a limit; their
    /// recorded spend saturates at the limit.
    pub record_super_admin_spend: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_owners: DEFAULT_MAX_OWNERS,
            max_signature_data: DEFAULT_MAX_SIGNATURE_DATA,
            max_calls_per_batch: DEFAULT_MAX_CALLS_PER_BATCH,
            deny_unlisted_tokens: true,
            record_super_admin_spend: false,
        }
    }
}

impl GuardConfig {
    /// Parses [`GuardConfig`] from a toml formatted file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file_contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&file_contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let this = toml::from_str(contents)?;
        Ok(this)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open file for reading")]
    OpenFile(#[from] std::io::Error),
    #[error("failed parsing file contents")]
    Parse(#[from] toml::de::Error),
    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DeserConfig {
    max_owners: usize,
    max_signature_data: usize,
    max_calls_per_batch: usize,
    deny_unlisted_tokens: bool,
    record_super_admin_spend: bool,
}

impl Default for DeserConfig {
    fn default() -> Self {
        let GuardConfig {
            max_owners,
            max_signature_data,
            max_calls_per_batch,
            deny_unlisted_tokens,
            record_super_admin_spend,
        } = GuardConfig::default();
        Self {
            max_owners,
            max_signature_data,
            max_calls_per_batch,
            deny_unlisted_tokens,
            record_super_admin_spend,
        }
    }
}

impl TryFrom<DeserConfig> for GuardConfig {
    type Error = Error;

    fn try_from(value: DeserConfig) -> Result<Self, Self::Error> {
        let DeserConfig {
            max_owners,
            max_signature_data,
            max_calls_per_batch,
            deny_unlisted_tokens,
            record_super_admin_spend,
        } = value;

        for (field, value) in [
            ("max_owners", max_owners),
            ("max_signature_data", max_signature_data),
            ("max_calls_per_batch", max_calls_per_batch),
        ] {
            if value == 0 {
                return Err(Error::Zero { field });
            }
        }

        Ok(Self {
            max_owners,
            max_signature_data,
            max_calls_per_batch,
            deny_unlisted_tokens,
            record_super_admin_spend,
        })
    }
}
