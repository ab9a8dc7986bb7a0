use super::Account;
use crate::{
    dispatch::{dispatch_call, mutate, mutate_void, selector, view},
    error::Result,
};
use alloy::{
    primitives::Bytes,
    sol_types::{SolCall, SolInterface},
};
use keyguard_contracts::{
    AccountError,
    IAccount::{self, IAccountCalls},
};
use keyguard_primitives::{Key, SpendPeriod};

impl Account {
    /// Executes ABI-encoded `calldata` the account sends to itself.
    pub fn call(&mut self, timestamp: u64, calldata: &[u8]) -> Result<Bytes> {
        dispatch_call(
            calldata,
            IAccountCalls::abi_decode,
            |selector| AccountError::fn_selector_not_recognized(selector).into(),
            |call| match call {
                IAccountCalls::authorize(call) => mutate(call, |c| {
                    let key = Key::try_from(c.key).map_err(|_| AccountError::invalid_public_key())?;
                    self.authorize(key)
                }),
                IAccountCalls::revoke(call) => mutate_void(call, |c| self.revoke(c.keyHash)),
                IAccountCalls::getKey(call) => {
                    view(call, |c| self.get_key(&c.keyHash).map(|key| key.clone().into()))
                }
                IAccountCalls::getKeys(call) => view(call, |_| {
                    let (keys, key_hashes) = self
                        .get_keys()
                        .map(|(key, key_hash)| (IAccount::Key::from(key.clone()), key_hash))
                        .unzip();
                    Ok(IAccount::getKeysReturn { keys, keyHashes: key_hashes })
                }),
                IAccountCalls::setCanExecute(call) => mutate_void(call, |c| {
                    self.set_can_execute(c.keyHash, c.target, c.fnSel, c.can)
                }),
                IAccountCalls::canExecute(call) => {
                    view(call, |c| Ok(self.can_execute(&c.keyHash, c.target, &c.data)))
                }
                IAccountCalls::canExecuteEntries(call) => {
                    view(call, |c| Ok(self.can_execute_entries(&c.keyHash)))
                }
                IAccountCalls::setCallChecker(call) => mutate_void(call, |c| {
                    self.set_call_checker(c.keyHash, c.target, c.checker)
                }),
                IAccountCalls::callCheckerInfos(call) => {
                    view(call, |c| Ok(self.call_checker_infos(&c.keyHash)))
                }
                IAccountCalls::setSpendLimit(call) => mutate_void(call, |c| {
                    let period = spend_period::<IAccount::setSpendLimitCall>(c.period)?;
                    self.set_spend_limit(c.keyHash, c.token, period, c.limit)
                }),
                IAccountCalls::removeSpendLimit(call) => mutate_void(call, |c| {
                    let period = spend_period::<IAccount::removeSpendLimitCall>(c.period)?;
                    self.remove_spend_limit(c.keyHash, c.token, period)
                }),
                IAccountCalls::setSpendLimitsEnabled(call) => mutate_void(call, |c| {
                    self.set_spend_limits_enabled(c.keyHash, c.enabled)
                }),
                IAccountCalls::spendInfos(call) => {
                    view(call, |c| Ok(self.spend_infos(&c.keyHash, timestamp)))
                }
                IAccountCalls::computeDigest(call) => {
                    view(call, |c| Ok(self.compute_digest(&c.calls)))
                }
            },
        )
        .inspect_err(|_| {
            tracing::trace!(
                account = %self.address,
                selector = %selector(calldata),
                "self call failed"
            );
        })
    }
}

/// Decodes a period argument of `T`, treating an out of range value as an undecodable call.
fn spend_period<T: SolCall>(period: IAccount::SpendPeriod) -> Result<SpendPeriod> {
    SpendPeriod::try_from(period)
        .map_err(|_| AccountError::fn_selector_not_recognized(T::SELECTOR.into()).into())
}
