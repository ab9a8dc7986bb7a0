//! Versioned, serializable snapshot of an account's state.
//!
//! Fields are only ever added. Readers fill fields introduced after a document's version with
//! their defaults, so every record an older version stored restores identically.
//!
//! Version history:
//! - 1: keys, whitelist entries, spend limits.
//! - 2: call checkers and per-key spend limit switches.
//! - 3: multisig configs held for the account.

use alloy::primitives::{Address, B256, FixedBytes, U256};
use keyguard_primitives::{Key, KeyError, SpendPeriod};
use serde::{Deserialize, Serialize};

use crate::{
    account::{Account, AccountState},
    config::GuardConfig,
    error::KeyguardError,
    key_registry::KeyRegistry,
    multisig_signer::{MultiSigSigner, StoredMultisigConfig},
    spend_ledger::SpendRecord,
};

/// Version written by [`AccountSnapshot::capture`].
pub const SCHEMA_VERSION: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to (de)serialize snapshot")]
    Json(#[from] serde_json::Error),

    #[error("schema version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("invalid key in snapshot")]
    InvalidKey(#[from] KeyError),

    #[error("entry references key {key_hash} which is not in the snapshot")]
    OrphanedEntry { key_hash: B256 },

    #[error("entry rejected by the account")]
    Rejected(#[from] KeyguardError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub key_hash: B256,
    pub target: Address,
    pub fn_sel: FixedBytes<4>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCheckerEntry {
    pub key_hash: B256,
    pub target: Address,
    pub checker: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendLimitEntry {
    pub key_hash: B256,
    pub token: Address,
    pub period: SpendPeriod,
    pub limit: U256,
    pub spent: U256,
    pub window_start: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendSwitchEntry {
    pub key_hash: B256,
    pub enabled: bool,
}

/// Multisig config of the `External` key `key_hash` on the snapshot's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigConfigEntry {
    pub key_hash: B256,
    pub threshold: u64,
    pub owners: Vec<B256>,
}

/// Serialized form of an [`Account`] and the multisig configs held for it.
///
/// Keys are stored without their hashes; every other entry addresses its key by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub schema_version: u32,
    pub address: Address,
    pub keys: Vec<Key>,
    pub permissions: Vec<PermissionEntry>,
    pub spend_limits: Vec<SpendLimitEntry>,

    // v2
    #[serde(default)]
    pub call_checkers: Vec<CallCheckerEntry>,
    #[serde(default)]
    pub spend_limits_enabled: Vec<SpendSwitchEntry>,

    // v3
    #[serde(default)]
    pub multisig_configs: Vec<MultisigConfigEntry>,
}

impl AccountSnapshot {
    pub fn capture(account: &Account, multisig: &MultiSigSigner) -> Self {
        let state = account.state();
        let keys = state.keys().get_keys().map(|(key, _)| key.clone()).collect();

        let mut permissions = Vec::new();
        let mut call_checkers = Vec::new();
        for &key_hash in state.executor().permissioned_keys() {
            permissions.extend(state.executor().can_execute_entries(&key_hash).into_iter().map(
                |entry| PermissionEntry { key_hash, target: entry.target, fn_sel: entry.fnSel },
            ));
            call_checkers.extend(state.executor().call_checker_infos(&key_hash).into_iter().map(
                |info| CallCheckerEntry { key_hash, target: info.target, checker: info.checker },
            ));
        }

        let ledger = state.executor().spend_ledger();
        let mut spend_limits = Vec::new();
        let mut spend_limits_enabled = Vec::new();
        for (key_hash, enabled) in ledger.key_flags() {
            spend_limits_enabled.push(SpendSwitchEntry { key_hash, enabled });
            spend_limits.extend(ledger.records(&key_hash).map(|(token, period, record)| {
                SpendLimitEntry {
                    key_hash,
                    token,
                    period,
                    limit: record.limit,
                    spent: record.spent,
                    window_start: record.window_start,
                }
            }));
        }

        let multisig_configs = multisig
            .configs_of(account.address())
            .into_iter()
            .map(|(key_hash, config)| MultisigConfigEntry {
                key_hash,
                threshold: config.threshold as u64,
                owners: config.owners.clone(),
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION,
            address: account.address(),
            keys,
            permissions,
            spend_limits,
            call_checkers,
            spend_limits_enabled,
            multisig_configs,
        }
    }

    /// Rebuilds the account, re-deriving every key hash, and stores its multisig configs in
    /// `multisig`.
    ///
    /// `multisig` is only written once the whole snapshot has been accepted.
    pub fn restore(
        self,
        config: GuardConfig,
        multisig: &mut MultiSigSigner,
    ) -> Result<Account, SchemaError> {
        if self.schema_version == 0 || self.schema_version > SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion(self.schema_version));
        }

        let mut state = AccountState::default();
        for key in self.keys {
            key.validate()?;
            state.keys.authorize(key)?;
        }

        let known = |keys: &KeyRegistry, key_hash: B256| {
            if keys.contains(&key_hash) {
                Ok(())
            } else {
                Err(SchemaError::OrphanedEntry { key_hash })
            }
        };

        for entry in self.permissions {
            known(&state.keys, entry.key_hash)?;
            state.executor.restore_can_execute(entry.key_hash, entry.target, entry.fn_sel);
        }
        for entry in self.call_checkers {
            if entry.key_hash != keyguard_contracts::ANY_KEYHASH {
                known(&state.keys, entry.key_hash)?;
            }
            let CallCheckerEntry { key_hash, target, checker } = entry;
            state.executor.set_call_checker(&state.keys, key_hash, target, checker)?;
        }
        let ledger = state.executor.spend_ledger_mut();
        for entry in self.spend_limits_enabled {
            known(&state.keys, entry.key_hash)?;
            ledger.set_spend_limits_enabled(entry.key_hash, entry.enabled);
        }
        for entry in self.spend_limits {
            known(&state.keys, entry.key_hash)?;
            // Documents written before limits clamped their spend may hold `spent > limit`.
            let record = SpendRecord {
                limit: entry.limit,
                spent: entry.spent.min(entry.limit),
                window_start: entry.window_start,
            };
            ledger.restore_record(entry.key_hash, entry.token, entry.period, record);
        }

        let mut multisig_state = multisig.clone();
        // Configs outlive the key they were set up for, so they are not tied to `keys`.
        for entry in self.multisig_configs {
            let stored = StoredMultisigConfig {
                threshold: usize::try_from(entry.threshold).unwrap_or(usize::MAX),
                owners: entry.owners,
            };
            multisig_state.restore_config(self.address, entry.key_hash, stored)?;
        }
        *multisig = multisig_state;

        Ok(Account::from_state(self.address, state, config))
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }
}
