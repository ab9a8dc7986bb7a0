pub mod dispatch;

use alloy::{
    primitives::{Address, B256, Bytes, FixedBytes, IntoLogData, LogData, U256, keccak256},
    sol_types::SolValue,
};
use keyguard_contracts::{
    AccountError, AccountEvent, IAccount, IAccount::Call, SIGNATURE_MAGIC_VALUE,
};
use keyguard_primitives::{Key, SpendPeriod};
use tracing::{debug, trace};

use crate::{
    config::GuardConfig,
    error::Result,
    guarded_executor::{CallCheckerInfo, CanExecuteEntry, GuardedExecutor},
    host::{CallContext, Host},
    key_registry::KeyRegistry,
};

/// Everything an account persists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    pub(crate) keys: KeyRegistry,
    pub(crate) executor: GuardedExecutor,
}

impl AccountState {
    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    pub fn executor(&self) -> &GuardedExecutor {
        &self.executor
    }
}

/// A smart account guarded by its authorized keys.
///
/// Administrative methods model calls the account makes to itself and are also reachable from
/// a batch through [`Account::call`]. Everything else goes through [`Account::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    address: Address,
    state: AccountState,
    config: GuardConfig,
    logs: Vec<LogData>,
}

impl Account {
    pub fn new(address: Address, config: GuardConfig) -> Self {
        Self::from_state(address, AccountState::default(), config)
    }

    pub fn from_state(address: Address, state: AccountState, config: GuardConfig) -> Self {
        Self { address, state, config, logs: Vec::new() }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Events emitted so far, oldest first.
    pub fn logs(&self) -> &[LogData] {
        &self.logs
    }

    /// Authorizes `key`, overwriting the flags of an existing one.
    ///
    /// A key authorized as super admin loses its whitelist, which no longer applies to it.
    pub fn authorize(&mut self, key: Key) -> Result<B256> {
        let key_hash = self.state.keys.authorize(key.clone())?;
        if key.is_super_admin {
            self.state.executor.clear_can_execute(&key_hash);
        }
        self.emit_event(AccountEvent::Authorized(IAccount::Authorized {
            keyHash: key_hash,
            key: key.into(),
        }));
        Ok(key_hash)
    }

    /// Revokes the key and drops every permission and spend limit attached to it.
    pub fn revoke(&mut self, key_hash: B256) -> Result<()> {
        self.state.keys.revoke(key_hash)?;
        self.state.executor.clear(&key_hash);
        self.emit_event(AccountEvent::Revoked(IAccount::Revoked { keyHash: key_hash }));
        Ok(())
    }

    pub fn get_key(&self, key_hash: &B256) -> Result<&Key> {
        self.state.keys.get_key(key_hash)
    }

    pub fn get_keys(&self) -> impl Iterator<Item = (&Key, B256)> {
        self.state.keys.get_keys()
    }

    pub fn set_can_execute(
        &mut self,
        key_hash: B256,
        target: Address,
        fn_sel: FixedBytes<4>,
        can: bool,
    ) -> Result<()> {
        self.state.executor.set_can_execute(
            self.address,
            &self.state.keys,
            key_hash,
            target,
            fn_sel,
            can,
        )?;
        self.emit_event(AccountEvent::CanExecuteSet(IAccount::CanExecuteSet {
            keyHash: key_hash,
            target,
            fnSel: fn_sel,
            can,
        }));
        Ok(())
    }

    pub fn can_execute(&self, key_hash: &B256, target: Address, data: &[u8]) -> bool {
        self.state.executor.can_execute(self.address, key_hash, target, data)
    }

    pub fn can_execute_entries(&self, key_hash: &B256) -> Vec<CanExecuteEntry> {
        self.state.executor.can_execute_entries(key_hash)
    }

    pub fn set_call_checker(
        &mut self,
        key_hash: B256,
        target: Address,
        checker: Address,
    ) -> Result<()> {
        self.state.executor.set_call_checker(&self.state.keys, key_hash, target, checker)?;
        self.emit_event(AccountEvent::CallCheckerSet(IAccount::CallCheckerSet {
            keyHash: key_hash,
            target,
            checker,
        }));
        Ok(())
    }

    pub fn call_checker_infos(&self, key_hash: &B256) -> Vec<CallCheckerInfo> {
        self.state.executor.call_checker_infos(key_hash)
    }

    pub fn set_spend_limit(
        &mut self,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
        limit: U256,
    ) -> Result<()> {
        self.state.executor.set_spend_limit(&self.state.keys, key_hash, token, period, limit)?;
        self.emit_event(AccountEvent::SpendLimitSet(IAccount::SpendLimitSet {
            keyHash: key_hash,
            token,
            period: period.into(),
            limit,
        }));
        Ok(())
    }

    pub fn remove_spend_limit(
        &mut self,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
    ) -> Result<()> {
        self.state.executor.remove_spend_limit(&self.state.keys, key_hash, token, period)?;
        self.emit_event(AccountEvent::SpendLimitRemoved(IAccount::SpendLimitRemoved {
            keyHash: key_hash,
            token,
            period: period.into(),
        }));
        Ok(())
    }

    pub fn set_spend_limits_enabled(&mut self, key_hash: B256, enabled: bool) -> Result<()> {
        self.state.executor.set_spend_limits_enabled(&self.state.keys, key_hash, enabled)?;
        self.emit_event(AccountEvent::SpendLimitsEnabledSet(IAccount::SpendLimitsEnabledSet {
            keyHash: key_hash,
            enabled,
        }));
        Ok(())
    }

    /// Spend limits of the key as seen at `timestamp`.
    pub fn spend_infos(&self, key_hash: &B256, timestamp: u64) -> Vec<IAccount::SpendInfo> {
        self.state.executor.spend_ledger().spend_infos(key_hash, timestamp)
    }

    /// Digest a key signs to authorize `calls` on this account.
    pub fn compute_digest(&self, calls: &[Call]) -> B256 {
        keccak256((self.address, calls.to_vec()).abi_encode())
    }

    /// Verifies `signature` over `calls` for `key_hash`, checks every call against the key's
    /// policy and dispatches them in order.
    ///
    /// The batch is atomic: on any failure the account state, its logs and every effect in the
    /// host since the batch started are rolled back.
    pub fn execute(
        &mut self,
        host: &mut dyn Host,
        key_hash: B256,
        signature: &[u8],
        calls: &[Call],
    ) -> Result<Vec<Bytes>> {
        if calls.len() > self.config.max_calls_per_batch {
            let max = U256::from(self.config.max_calls_per_batch);
            return Err(AccountError::batch_too_large(U256::from(calls.len()), max).into());
        }

        let timestamp = host.timestamp();
        let key = self.state.keys.get_usable_key(&key_hash, timestamp).inspect_err(|err| {
            debug!(account = %self.address, %key_hash, ?err, "key not usable");
        })?;
        let key = key.clone();

        let digest = self.compute_digest(calls);
        if !self.is_valid_signature(&*host, &key, key_hash, digest, signature, timestamp) {
            debug!(account = %self.address, %key_hash, %digest, "invalid signature");
            return Err(AccountError::invalid_signature().into());
        }

        let snapshot = self.state.clone();
        let logs = self.logs.len();
        let checkpoint = host.checkpoint();

        match self.execute_checked(host, &key, key_hash, calls, timestamp) {
            Ok(outputs) => {
                host.checkpoint_commit(checkpoint);
                trace!(
                    account = %self.address,
                    %key_hash,
                    %digest,
                    calls = calls.len(),
                    "executed batch"
                );
                self.emit_event(AccountEvent::Executed(IAccount::Executed {
                    keyHash: key_hash,
                    digest,
                    calls: U256::from(calls.len()),
                }));
                Ok(outputs)
            }
            Err(err) => {
                debug!(account = %self.address, %key_hash, %digest, ?err, "batch rejected");
                host.checkpoint_revert(checkpoint);
                self.state = snapshot;
                self.logs.truncate(logs);
                Err(err)
            }
        }
    }

    fn execute_checked(
        &mut self,
        host: &mut dyn Host,
        key: &Key,
        key_hash: B256,
        calls: &[Call],
        timestamp: u64,
    ) -> Result<Vec<Bytes>> {
        for call in calls {
            self.state
                .executor
                .check_call(&*host, &self.config, self.address, key, key_hash, call)?;
        }

        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = if call.to == self.address {
                self.call(timestamp, &call.data)?
            } else {
                let ctx = CallContext {
                    account: self.address,
                    key_hash,
                    keys: &self.state.keys,
                    timestamp,
                };
                host.dispatch(&ctx, call)?
            };
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn is_valid_signature(
        &self,
        host: &dyn Host,
        key: &Key,
        key_hash: B256,
        digest: B256,
        signature: &[u8],
        timestamp: u64,
    ) -> bool {
        let Some(validator) = key.external_validator() else {
            return key.verify(&digest, signature).is_ok();
        };

        let ctx =
            CallContext { account: self.address, key_hash, keys: &self.state.keys, timestamp };
        host.signature_validator(validator).is_some_and(|validator| {
            validator.is_valid_signature_with_key_hash(&ctx, digest, key_hash, signature)
                == SIGNATURE_MAGIC_VALUE
        })
    }

    fn emit_event(&mut self, event: AccountEvent) {
        self.logs.push(event.into_log_data());
    }
}
