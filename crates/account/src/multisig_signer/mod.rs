pub mod dispatch;

pub use keyguard_contracts::{
    IMultiSigSigner::{
        MultisigConfig, addOwnerCall, getConfigCall, initConfigCall,
        isValidSignatureWithKeyHashCall, removeOwnerCall, setThresholdCall,
    },
    MULTISIG_SIGNER_ADDRESS,
};

use std::collections::HashMap;

use alloy::{
    primitives::{Address, B256, Bytes, FixedBytes, IntoLogData, LogData, U256},
    sol_types::SolValue,
};
use keyguard_contracts::{
    IMultiSigSigner, MultiSigSignerError, MultiSigSignerEvent, SIGNATURE_FAIL_VALUE,
    SIGNATURE_MAGIC_VALUE,
};
use keyguard_primitives::{
    KeyType, key_hash,
    signature::{SECP256K1_SIGNATURE_LENGTH, recover_secp256k1},
};
use tracing::{debug, trace};

use crate::{
    config::GuardConfig,
    error::Result,
    host::{CallContext, SignatureValidator},
};

/// Multisig configuration of one `(account, keyHash)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredMultisigConfig {
    /// Required number of votes. Always within `1..=owners.len()`.
    pub threshold: usize,
    /// Owner slots. A key hash listed twice carries two votes.
    pub owners: Vec<B256>,
}

/// Threshold signature validator for `External` keys.
///
/// Each owner slot is worth one vote. Signatures are matched greedily against unconsumed
/// slots, so an owner listed twice is only counted twice when it signs twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSigSigner {
    /// configs[account][keyHash]
    configs: HashMap<Address, HashMap<B256, StoredMultisigConfig>>,
    max_owners: usize,
    max_signature_data: usize,
    events: Vec<LogData>,
}

impl Default for MultiSigSigner {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl MultiSigSigner {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            configs: HashMap::new(),
            max_owners: config.max_owners,
            max_signature_data: config.max_signature_data,
            events: Vec::new(),
        }
    }

    /// Creates the config for `(msg_sender, keyHash)`.
    pub fn init_config(&mut self, msg_sender: Address, call: initConfigCall) -> Result<()> {
        let initConfigCall { keyHash: key_hash, threshold, owners } = call;

        if self.config(msg_sender, key_hash).is_some() {
            return Err(MultiSigSignerError::config_already_set().into());
        }
        if owners.len() > self.max_owners {
            return Err(MultiSigSignerError::too_many_owners(U256::from(self.max_owners)).into());
        }
        let threshold_votes = threshold.saturating_to::<usize>();
        if threshold_votes == 0 || threshold_votes > owners.len() {
            return Err(MultiSigSignerError::invalid_threshold().into());
        }

        trace!(
            %msg_sender,
            %key_hash,
            %threshold,
            owners = owners.len(),
            "initializing multisig config"
        );
        self.configs.entry(msg_sender).or_default().insert(
            key_hash,
            StoredMultisigConfig { threshold: threshold_votes, owners: owners.clone() },
        );

        self.emit_event(MultiSigSignerEvent::ConfigInitialized(
            IMultiSigSigner::ConfigInitialized {
                account: msg_sender,
                keyHash: key_hash,
                threshold,
                owners,
            },
        ));
        Ok(())
    }

    /// Appends an owner slot. The caller must be executing under `keyHash`.
    pub fn add_owner(&mut self, ctx: &CallContext<'_>, call: addOwnerCall) -> Result<()> {
        let max_owners = self.max_owners;
        let config = self.authorized_config_mut(ctx, call.keyHash)?;
        if config.owners.len() >= max_owners {
            return Err(MultiSigSignerError::too_many_owners(U256::from(max_owners)).into());
        }
        config.owners.push(call.ownerKeyHash);

        trace!(
            account = %ctx.account,
            key_hash = %call.keyHash,
            owner = %call.ownerKeyHash,
            "added multisig owner"
        );
        self.emit_event(MultiSigSignerEvent::OwnerAdded(IMultiSigSigner::OwnerAdded {
            account: ctx.account,
            keyHash: call.keyHash,
            ownerKeyHash: call.ownerKeyHash,
        }));
        Ok(())
    }

    /// Removes the first slot held by `ownerKeyHash`. The caller must be executing under
    /// `keyHash`.
    pub fn remove_owner(&mut self, ctx: &CallContext<'_>, call: removeOwnerCall) -> Result<()> {
        let config = self.authorized_config_mut(ctx, call.keyHash)?;
        let slot = config
            .owners
            .iter()
            .position(|owner| *owner == call.ownerKeyHash)
            .ok_or(MultiSigSignerError::owner_not_found())?;
        if config.owners.len() - 1 < config.threshold {
            return Err(MultiSigSignerError::invalid_threshold().into());
        }
        config.owners.remove(slot);

        trace!(
            account = %ctx.account,
            key_hash = %call.keyHash,
            owner = %call.ownerKeyHash,
            "removed multisig owner"
        );
        self.emit_event(MultiSigSignerEvent::OwnerRemoved(IMultiSigSigner::OwnerRemoved {
            account: ctx.account,
            keyHash: call.keyHash,
            ownerKeyHash: call.ownerKeyHash,
        }));
        Ok(())
    }

    /// Changes the threshold. The caller must be executing under `keyHash`.
    pub fn set_threshold(&mut self, ctx: &CallContext<'_>, call: setThresholdCall) -> Result<()> {
        let config = self.authorized_config_mut(ctx, call.keyHash)?;
        let threshold = call.threshold.saturating_to::<usize>();
        if threshold == 0 || threshold > config.owners.len() {
            return Err(MultiSigSignerError::invalid_threshold().into());
        }
        config.threshold = threshold;

        trace!(
            account = %ctx.account,
            key_hash = %call.keyHash,
            threshold,
            "changed multisig threshold"
        );
        self.emit_event(MultiSigSignerEvent::ThresholdChanged(IMultiSigSigner::ThresholdChanged {
            account: ctx.account,
            keyHash: call.keyHash,
            threshold: call.threshold,
        }));
        Ok(())
    }

    /// Returns the config, or a zero threshold with no owners if none exists.
    pub fn get_config(&self, call: getConfigCall) -> Result<MultisigConfig> {
        Ok(self
            .config(call.account, call.keyHash)
            .map(|config| MultisigConfig {
                threshold: U256::from(config.threshold),
                owners: config.owners.clone(),
            })
            .unwrap_or_else(|| MultisigConfig { threshold: U256::ZERO, owners: Vec::new() }))
    }

    pub fn config(&self, account: Address, key_hash: B256) -> Option<&StoredMultisigConfig> {
        self.configs.get(&account)?.get(&key_hash)
    }

    /// Validates an aggregated signature for `ctx.account`.
    ///
    /// The signature is `abi.encode(bytes[])`. Each element is either a 65-byte secp256k1
    /// signature, whose owner is the secp256k1 key of the recovered address, or
    /// `innerSignature || ownerKeyHash`, verified against the owner key registered on the
    /// account. Malformed input of any kind yields the fail value.
    pub fn is_valid_signature_with_key_hash(
        &self,
        ctx: &CallContext<'_>,
        call: isValidSignatureWithKeyHashCall,
    ) -> FixedBytes<4> {
        let isValidSignatureWithKeyHashCall { digest, keyHash: key_hash, signature } = call;

        if signature.len() > self.max_signature_data {
            return SIGNATURE_FAIL_VALUE;
        }
        let Some(config) = self.config(ctx.account, key_hash) else {
            return SIGNATURE_FAIL_VALUE;
        };
        let Ok(signatures) = <Vec<Bytes>>::abi_decode(&signature) else {
            return SIGNATURE_FAIL_VALUE;
        };

        let mut consumed = vec![false; config.owners.len()];
        let mut votes = 0;
        for signature in &signatures {
            let Some(owner) = signer_key_hash(ctx, &digest, signature) else {
                continue;
            };
            let slot = config
                .owners
                .iter()
                .zip(&consumed)
                .position(|(slot_owner, used)| *slot_owner == owner && !used);
            if let Some(slot) = slot {
                consumed[slot] = true;
                votes += 1;
            }
        }

        if votes >= config.threshold {
            SIGNATURE_MAGIC_VALUE
        } else {
            debug!(
                account = %ctx.account,
                %key_hash,
                votes,
                threshold = config.threshold,
                "multisig threshold not met"
            );
            SIGNATURE_FAIL_VALUE
        }
    }

    /// Events emitted so far, oldest first.
    /// Configs held for `account`, ordered by key hash.
    pub fn configs_of(&self, account: Address) -> Vec<(B256, &StoredMultisigConfig)> {
        let mut configs: Vec<_> = self
            .configs
            .get(&account)
            .into_iter()
            .flatten()
            .map(|(key_hash, config)| (*key_hash, config))
            .collect();
        configs.sort_unstable_by_key(|(key_hash, _)| *key_hash);
        configs
    }

    /// Stores a config read back from a snapshot, replacing any existing one.
    ///
    /// The bounds of `init_config` still apply, since a config outside them could never
    /// validate a signature.
    pub(crate) fn restore_config(
        &mut self,
        account: Address,
        key_hash: B256,
        config: StoredMultisigConfig,
    ) -> Result<()> {
        if config.owners.len() > self.max_owners {
            return Err(MultiSigSignerError::too_many_owners(U256::from(self.max_owners)).into());
        }
        if config.threshold == 0 || config.threshold > config.owners.len() {
            return Err(MultiSigSignerError::invalid_threshold().into());
        }
        self.configs.entry(account).or_default().insert(key_hash, config);
        Ok(())
    }

    pub fn events(&self) -> &[LogData] {
        &self.events
    }

    fn emit_event(&mut self, event: MultiSigSignerEvent) {
        self.events.push(event.into_log_data());
    }

    fn authorized_config_mut(
        &mut self,
        ctx: &CallContext<'_>,
        key_hash: B256,
    ) -> Result<&mut StoredMultisigConfig> {
        if ctx.key_hash != key_hash {
            debug!(
                account = %ctx.account,
                context = %ctx.key_hash,
                %key_hash,
                "multisig mutation outside its key"
            );
            return Err(MultiSigSignerError::invalid_key_hash().into());
        }
        self.configs
            .get_mut(&ctx.account)
            .and_then(|configs| configs.get_mut(&key_hash))
            .ok_or_else(|| MultiSigSignerError::invalid_key_hash().into())
    }
}

impl SignatureValidator for MultiSigSigner {
    fn is_valid_signature_with_key_hash(
        &self,
        ctx: &CallContext<'_>,
        digest: B256,
        key_hash: B256,
        signature: &[u8],
    ) -> FixedBytes<4> {
        self.is_valid_signature_with_key_hash(
            ctx,
            isValidSignatureWithKeyHashCall {
                digest,
                keyHash: key_hash,
                signature: Bytes::copy_from_slice(signature),
            },
        )
    }
}

/// Key hash of the owner that produced `signature`, if it verifies.
fn signer_key_hash(ctx: &CallContext<'_>, digest: &B256, signature: &[u8]) -> Option<B256> {
    let owner = if signature.len() == SECP256K1_SIGNATURE_LENGTH {
        let signer = recover_secp256k1(digest, signature).ok()?;
        let owner = key_hash(KeyType::Secp256k1, signer.as_slice());
        if ctx.keys.resolve_key(&owner).is_some_and(|key| !key.is_usable_at(ctx.timestamp)) {
            return None;
        }
        owner
    } else {
        let split = signature.len().checked_sub(32)?;
        let (inner, owner) = signature.split_at(split);
        let owner = B256::from_slice(owner);

        let key = ctx.keys.resolve_key(&owner)?;
        if !key.key_type.is_intrinsic() || !key.is_usable_at(ctx.timestamp) {
            return None;
        }
        key.verify(digest, inner).ok()?;
        owner
    };
    Some(owner)
}
