pub use keyguard_contracts::IAccount::{CallCheckerInfo, CanExecuteEntry};

use alloy::{
    primitives::{Address, B256, FixedBytes, U256},
    sol_types::SolInterface,
};
use indexmap::{IndexMap, IndexSet};
use keyguard_contracts::{
    ANY_FN_SEL, ANY_KEYHASH, ANY_TARGET, AccountError, EMPTY_CALLDATA_FN_SEL, IAccount::Call,
    ICallChecker, IERC20::IERC20Calls, NATIVE_TOKEN,
};
use keyguard_primitives::{Key, SpendPeriod};
use tracing::{debug, trace};

use crate::{
    config::GuardConfig,
    dispatch::selector,
    error::Result,
    host::Host,
    key_registry::KeyRegistry,
    spend_ledger::SpendLedger,
};

/// Whitelist and checkers of one key hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct KeyPermissions {
    can_execute: IndexSet<(Address, FixedBytes<4>)>,
    /// target -> checker
    call_checkers: IndexMap<Address, Address>,
}

/// Policy engine applied to every call of a non super admin key.
///
/// A call passes when it is whitelisted, its call checker (if any) approves it and the assets
/// it moves fit every matching spend limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardedExecutor {
    permissions: IndexMap<B256, KeyPermissions>,
    spend: SpendLedger,
}

impl GuardedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or removes `(target, fn_sel)` from the key's whitelist.
    pub fn set_can_execute(
        &mut self,
        account: Address,
        keys: &KeyRegistry,
        key_hash: B256,
        target: Address,
        fn_sel: FixedBytes<4>,
        can: bool,
    ) -> Result<()> {
        if keys.get_key(&key_hash)?.is_super_admin {
            return Err(AccountError::super_admin_can_execute_everything().into());
        }
        if target == account && fn_sel == ANY_FN_SEL {
            return Err(AccountError::cannot_self_execute().into());
        }

        trace!(%key_hash, %target, %fn_sel, can, "setting can execute");
        let permissions = self.permissions.entry(key_hash).or_default();
        if can {
            permissions.can_execute.insert((target, fn_sel));
        } else {
            permissions.can_execute.shift_remove(&(target, fn_sel));
        }
        Ok(())
    }

    /// Restores a whitelist entry read back from a snapshot, without the admin checks.
    pub(crate) fn restore_can_execute(
        &mut self,
        key_hash: B256,
        target: Address,
        fn_sel: FixedBytes<4>,
    ) {
        self.permissions.entry(key_hash).or_default().can_execute.insert((target, fn_sel));
    }

    /// Drops the whitelist of `key_hash`, keeping its call checkers and spend limits.
    pub fn clear_can_execute(&mut self, key_hash: &B256) {
        if let Some(permissions) = self.permissions.get_mut(key_hash) {
            permissions.can_execute.clear();
            if permissions.call_checkers.is_empty() {
                self.permissions.shift_remove(key_hash);
            }
        }
    }

    /// Whether the whitelist of `key_hash` covers a call to `target` with `data`.
    ///
    /// Wildcard targets never cover calls to `account` itself.
    pub fn can_execute(
        &self,
        account: Address,
        key_hash: &B256,
        target: Address,
        data: &[u8],
    ) -> bool {
        let Some(permissions) = self.permissions.get(key_hash) else {
            return false;
        };
        let fn_sel = if data.len() < 4 { EMPTY_CALLDATA_FN_SEL } else { selector(data) };

        let allowed = |target: Address, fn_sel: FixedBytes<4>| {
            permissions.can_execute.contains(&(target, fn_sel))
        };
        if allowed(target, fn_sel) || allowed(target, ANY_FN_SEL) {
            return true;
        }
        target != account && (allowed(ANY_TARGET, fn_sel) || allowed(ANY_TARGET, ANY_FN_SEL))
    }

    /// Whitelisted `(target, selector)` pairs of the key, in the order they were added.
    pub fn can_execute_entries(&self, key_hash: &B256) -> Vec<CanExecuteEntry> {
        self.permissions
            .get(key_hash)
            .into_iter()
            .flat_map(|permissions| &permissions.can_execute)
            .map(|(target, fn_sel)| CanExecuteEntry { target: *target, fnSel: *fn_sel })
            .collect()
    }

    /// Sets the checker consulted for calls of `key_hash` to `target`.
    ///
    /// `key_hash` may be [`ANY_KEYHASH`] to cover every key; a zero `checker` removes the entry.
    pub fn set_call_checker(
        &mut self,
        keys: &KeyRegistry,
        key_hash: B256,
        target: Address,
        checker: Address,
    ) -> Result<()> {
        if key_hash != ANY_KEYHASH && !keys.contains(&key_hash) {
            return Err(AccountError::key_does_not_exist().into());
        }

        trace!(%key_hash, %target, %checker, "setting call checker");
        let permissions = self.permissions.entry(key_hash).or_default();
        if checker.is_zero() {
            permissions.call_checkers.shift_remove(&target);
        } else {
            permissions.call_checkers.insert(target, checker);
        }
        Ok(())
    }

    pub fn call_checker_infos(&self, key_hash: &B256) -> Vec<CallCheckerInfo> {
        self.permissions
            .get(key_hash)
            .into_iter()
            .flat_map(|permissions| &permissions.call_checkers)
            .map(|(target, checker)| CallCheckerInfo { target: *target, checker: *checker })
            .collect()
    }

    /// Checker for calls of `key_hash` to `target`, most specific entry first.
    pub fn call_checker(&self, key_hash: &B256, target: Address) -> Option<Address> {
        [
            (*key_hash, target),
            (ANY_KEYHASH, target),
            (*key_hash, ANY_TARGET),
            (ANY_KEYHASH, ANY_TARGET),
        ]
        .into_iter()
        .find_map(|(key_hash, target)| {
            self.permissions.get(&key_hash)?.call_checkers.get(&target).copied()
        })
    }

    pub fn set_spend_limit(
        &mut self,
        keys: &KeyRegistry,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
        limit: U256,
    ) -> Result<()> {
        keys.get_key(&key_hash)?;
        self.spend.set_spend_limit(key_hash, token, period, limit);
        Ok(())
    }

    pub fn remove_spend_limit(
        &mut self,
        keys: &KeyRegistry,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
    ) -> Result<()> {
        keys.get_key(&key_hash)?;
        self.spend.remove_spend_limit(key_hash, token, period);
        Ok(())
    }

    pub fn set_spend_limits_enabled(
        &mut self,
        keys: &KeyRegistry,
        key_hash: B256,
        enabled: bool,
    ) -> Result<()> {
        keys.get_key(&key_hash)?;
        self.spend.set_spend_limits_enabled(key_hash, enabled);
        Ok(())
    }

    pub fn spend_ledger(&self) -> &SpendLedger {
        &self.spend
    }

    pub(crate) fn spend_ledger_mut(&mut self) -> &mut SpendLedger {
        &mut self.spend
    }

    /// Runs `call` through the policy of `key`, debiting its spend limits on success.
    ///
    /// Debits are not rolled back here: a caller checking a batch must discard the executor
    /// state when a later call fails.
    pub fn check_call(
        &mut self,
        host: &dyn Host,
        config: &GuardConfig,
        account: Address,
        key: &Key,
        key_hash: B256,
        call: &Call,
    ) -> Result<()> {
        let timestamp = host.timestamp();
        let amounts = spend_amounts(call);

        if key.is_super_admin {
            if config.record_super_admin_spend {
                self.spend.record_unchecked(key_hash, &amounts, timestamp);
            }
            return Ok(());
        }

        if !self.can_execute(account, &key_hash, call.to, &call.data) {
            debug!(
                %key_hash,
                target = %call.to,
                fn_sel = %selector(&call.data),
                "call not whitelisted"
            );
            return Err(AccountError::unauthorized().into());
        }

        if let Some(checker) = self.call_checker(&key_hash, call.to) {
            let query = ICallChecker::canExecuteCall {
                keyHash: key_hash,
                target: call.to,
                data: call.data.clone(),
            };
            if !host.call_checker(checker).is_some_and(|c| c.can_execute(&query)) {
                debug!(%key_hash, target = %call.to, %checker, "call checker rejected call");
                return Err(AccountError::checker_rejected(checker).into());
            }
        }

        self.spend.debit(key_hash, &amounts, timestamp, config.deny_unlisted_tokens)
    }

    /// Drops every permission and spend limit of `key_hash`.
    pub fn clear(&mut self, key_hash: &B256) {
        self.permissions.shift_remove(key_hash);
        self.spend.clear(key_hash);
    }

    /// Key hashes holding a whitelist entry or a call checker.
    pub(crate) fn permissioned_keys(&self) -> impl Iterator<Item = &B256> {
        self.permissions.keys()
    }
}

/// Assets moved by `call`: the attached native value plus the amount of an ERC-20 `transfer`
/// or `approve` on the target.
pub fn spend_amounts(call: &Call) -> Vec<(Address, U256)> {
    let mut amounts = Vec::with_capacity(2);
    if !call.value.is_zero() {
        amounts.push((NATIVE_TOKEN, call.value));
    }
    match IERC20Calls::abi_decode(&call.data) {
        Ok(IERC20Calls::transfer(transfer)) => amounts.push((call.to, transfer.amount)),
        Ok(IERC20Calls::approve(approve)) => amounts.push((call.to, approve.amount)),
        Err(_) => {}
    }
    amounts
}
