use alloy::primitives::{Address, B256, U256};
use indexmap::IndexMap;
use keyguard_contracts::{AccountError, IAccount};
use keyguard_primitives::SpendPeriod;
use tracing::{debug, trace};

use crate::error::Result;

/// Accumulated spend of one `(key, token, period)` limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpendRecord {
    pub limit: U256,
    pub spent: U256,
    /// Start of the window `spent` was accumulated in.
    pub window_start: u64,
}

impl SpendRecord {
    /// `spent` as seen at `timestamp`, i.e. zero once the window rolled over.
    pub fn current_spent(&self, period: SpendPeriod, timestamp: u64) -> U256 {
        if period.has_rolled_over(self.window_start, timestamp) { U256::ZERO } else { self.spent }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeySpend {
    enabled: bool,
    limits: IndexMap<(Address, SpendPeriod), SpendRecord>,
}

impl Default for KeySpend {
    fn default() -> Self {
        Self { enabled: true, limits: IndexMap::new() }
    }
}

/// Rolling spend accounting per key.
///
/// Windows are fixed and calendar aligned: the first debit after a window boundary resets
/// `spent` to zero before applying. Several limits on one token are independent and are all
/// debited together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendLedger {
    keys: IndexMap<B256, KeySpend>,
}

impl SpendLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit for `(token, period)`.
    ///
    /// Accumulated spend of an existing record is kept, clamped to the new limit when the limit
    /// is lowered below it. The window stays exhausted until it rolls over.
    pub fn set_spend_limit(
        &mut self,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
        limit: U256,
    ) {
        trace!(%key_hash, %token, ?period, %limit, "setting spend limit");
        let record =
            self.keys.entry(key_hash).or_default().limits.entry((token, period)).or_default();
        record.limit = limit;
        record.spent = record.spent.min(limit);
    }

    /// Removes the limit for `(token, period)`, returning whether one existed.
    pub fn remove_spend_limit(
        &mut self,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
    ) -> bool {
        let removed = self
            .keys
            .get_mut(&key_hash)
            .and_then(|spend| spend.limits.shift_remove(&(token, period)))
            .is_some();
        trace!(%key_hash, %token, ?period, removed, "removing spend limit");
        removed
    }

    pub fn set_spend_limits_enabled(&mut self, key_hash: B256, enabled: bool) {
        trace!(%key_hash, enabled, "toggling spend limits");
        self.keys.entry(key_hash).or_default().enabled = enabled;
    }

    /// Limits apply to keys by default.
    pub fn spend_limits_enabled(&self, key_hash: &B256) -> bool {
        self.keys.get(key_hash).is_none_or(|spend| spend.enabled)
    }

    pub fn record(
        &self,
        key_hash: &B256,
        token: Address,
        period: SpendPeriod,
    ) -> Option<&SpendRecord> {
        self.keys.get(key_hash)?.limits.get(&(token, period))
    }

    /// Limits of a key in the order they were first set.
    pub fn records(
        &self,
        key_hash: &B256,
    ) -> impl Iterator<Item = (Address, SpendPeriod, &SpendRecord)> {
        self.keys
            .get(key_hash)
            .into_iter()
            .flat_map(|spend| spend.limits.iter())
            .map(|((token, period), record)| (*token, *period, record))
    }

    pub fn spend_infos(&self, key_hash: &B256, timestamp: u64) -> Vec<IAccount::SpendInfo> {
        self.records(key_hash)
            .map(|(token, period, record)| IAccount::SpendInfo {
                token,
                period: period.into(),
                limit: record.limit,
                spent: record.spent,
                windowStart: record.window_start,
                currentWindowStart: period.window_start(timestamp),
                currentSpent: record.current_spent(period, timestamp),
            })
            .collect()
    }

    /// Debits `amounts` against every matching limit of the key, all or nothing.
    ///
    /// Nothing is debited when limits are disabled for the key. A token without any limit is
    /// rejected with `NoSpendPermissions` if `deny_unlisted` is set and passes otherwise.
    pub fn debit(
        &mut self,
        key_hash: B256,
        amounts: &[(Address, U256)],
        timestamp: u64,
        deny_unlisted: bool,
    ) -> Result<()> {
        if !self.spend_limits_enabled(&key_hash) {
            return Ok(());
        }

        let totals = sum_by_token(amounts)?;
        let mut updates = Vec::new();
        for (token, amount) in totals {
            let mut matched = false;
            for (record_token, period, record) in self.records(&key_hash) {
                if record_token != token {
                    continue;
                }
                matched = true;

                let spent = record
                    .current_spent(period, timestamp)
                    .checked_add(amount)
                    .filter(|spent| *spent <= record.limit)
                    .ok_or_else(|| {
                        debug!(
                            %key_hash,
                            %token,
                            ?period,
                            %amount,
                            limit = %record.limit,
                            "spend limit exceeded"
                        );
                        AccountError::exceeds_limit(token)
                    })?;
                updates.push(((token, period), spent, period.window_start(timestamp)));
            }

            if !matched && deny_unlisted {
                debug!(%key_hash, %token, "no spend limit for token");
                return Err(AccountError::no_spend_permissions(token).into());
            }
        }

        if let Some(spend) = self.keys.get_mut(&key_hash) {
            for (slot, spent, window_start) in updates {
                if let Some(record) = spend.limits.get_mut(&slot) {
                    let (token, period) = slot;
                    trace!(%key_hash, %token, ?period, %spent, "debited spend limit");
                    record.spent = spent;
                    record.window_start = window_start;
                }
            }
        }
        Ok(())
    }

    /// Accumulates `amounts` without enforcing limits. Spend saturates at each limit.
    pub fn record_unchecked(
        &mut self,
        key_hash: B256,
        amounts: &[(Address, U256)],
        timestamp: u64,
    ) {
        let Some(spend) = self.keys.get_mut(&key_hash) else { return };
        if !spend.enabled {
            return;
        }
        for (token, amount) in amounts {
            for ((record_token, period), record) in spend.limits.iter_mut() {
                if record_token != token {
                    continue;
                }
                record.spent = record
                    .current_spent(*period, timestamp)
                    .saturating_add(*amount)
                    .min(record.limit);
                record.window_start = period.window_start(timestamp);
            }
        }
    }

    /// Restores a record verbatim.
    pub(crate) fn restore_record(
        &mut self,
        key_hash: B256,
        token: Address,
        period: SpendPeriod,
        record: SpendRecord,
    ) {
        self.keys.entry(key_hash).or_default().limits.insert((token, period), record);
    }

    /// Drops every limit and flag of the key.
    pub fn clear(&mut self, key_hash: &B256) {
        self.keys.shift_remove(key_hash);
    }

    /// Keys with any spend state, with whether limits are enabled for them.
    pub(crate) fn key_flags(&self) -> impl Iterator<Item = (B256, bool)> + '_ {
        self.keys.iter().map(|(key_hash, spend)| (*key_hash, spend.enabled))
    }
}

fn sum_by_token(amounts: &[(Address, U256)]) -> Result<IndexMap<Address, U256>> {
    let mut totals = IndexMap::<Address, U256>::new();
    for (token, amount) in amounts {
        if amount.is_zero() {
            continue;
        }
        let total = totals.entry(*token).or_default();
        *total = total.checked_add(*amount).ok_or(AccountError::exceeds_limit(*token))?;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use proptest::prelude::*;

    // 2024-03-15T12:34:56Z
    const NOW: u64 = 1_710_506_096;
    const TOKEN: Address = address!("0x7070707070707070707070707070707070707070");

    fn key_hash() -> B256 {
        B256::repeat_byte(0x01)
    }

    #[test]
    fn test_debit_within_limit() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(100));

        ledger.debit(key_hash(), &[(TOKEN, U256::from(60))], NOW, true)?;
        ledger.debit(key_hash(), &[(TOKEN, U256::from(40))], NOW, true)?;

        let record = ledger.record(&key_hash(), TOKEN, SpendPeriod::Day).unwrap();
        assert_eq!(record.spent, U256::from(100));
        assert_eq!(record.window_start, SpendPeriod::Day.window_start(NOW));

        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(1))], NOW, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));
        Ok(())
    }

    #[test]
    fn test_rollover_resets_spent() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(100));
        ledger.debit(key_hash(), &[(TOKEN, U256::from(100))], NOW, true)?;

        let next_day = SpendPeriod::Day.window_start(NOW) + 86_400;
        let infos = ledger.spend_infos(&key_hash(), next_day);
        assert_eq!(infos[0].spent, U256::from(100));
        assert_eq!(infos[0].currentSpent, U256::ZERO);
        assert_eq!(infos[0].currentWindowStart, next_day);

        ledger.debit(key_hash(), &[(TOKEN, U256::from(30))], next_day + 5, true)?;
        let record = ledger.record(&key_hash(), TOKEN, SpendPeriod::Day).unwrap();
        assert_eq!(record.spent, U256::from(30));
        assert_eq!(record.window_start, next_day);
        Ok(())
    }

    #[test]
    fn test_all_limits_must_pass() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(100));
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Week, U256::from(150));

        ledger.debit(key_hash(), &[(TOKEN, U256::from(90))], NOW, true)?;

        // Fits the weekly limit but not the daily one; neither record moves.
        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(20))], NOW, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));

        let day = ledger.record(&key_hash(), TOKEN, SpendPeriod::Day).unwrap();
        let week = ledger.record(&key_hash(), TOKEN, SpendPeriod::Week).unwrap();
        assert_eq!(day.spent, U256::from(90));
        assert_eq!(week.spent, U256::from(90));

        // Next day: daily window resets, weekly keeps accumulating.
        let tomorrow = SpendPeriod::Day.window_start(NOW) + 86_400;
        ledger.debit(key_hash(), &[(TOKEN, U256::from(60))], tomorrow, true)?;
        let week = ledger.record(&key_hash(), TOKEN, SpendPeriod::Week).unwrap();
        assert_eq!(week.spent, U256::from(150));

        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(1))], tomorrow, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));
        Ok(())
    }

    #[test]
    fn test_forever_never_resets() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Forever, U256::from(10));
        ledger.debit(key_hash(), &[(TOKEN, U256::from(10))], 0, true)?;

        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(1))], u64::MAX / 2, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));
        Ok(())
    }

    #[test]
    fn test_unlisted_tokens() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        let other = Address::repeat_byte(0x71);
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(100));

        assert_eq!(
            ledger.debit(key_hash(), &[(other, U256::from(1))], NOW, true),
            Err(AccountError::no_spend_permissions(other).into())
        );
        ledger.debit(key_hash(), &[(other, U256::from(1))], NOW, false)?;

        // Zero amounts never touch the ledger.
        ledger.debit(key_hash(), &[(other, U256::ZERO)], NOW, true)?;
        Ok(())
    }

    #[test]
    fn test_disabled_limits_skip_accounting() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(1));
        ledger.set_spend_limits_enabled(key_hash(), false);

        ledger.debit(key_hash(), &[(TOKEN, U256::from(1_000))], NOW, true)?;
        assert_eq!(ledger.record(&key_hash(), TOKEN, SpendPeriod::Day).unwrap().spent, U256::ZERO);

        ledger.set_spend_limits_enabled(key_hash(), true);
        assert!(ledger.debit(key_hash(), &[(TOKEN, U256::from(2))], NOW, true).is_err());
        Ok(())
    }

    #[test]
    fn test_overflow_is_exceeds_limit() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::MAX);
        ledger.debit(key_hash(), &[(TOKEN, U256::MAX)], NOW, true)?;

        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(1))], NOW, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));

        let result = ledger.debit(
            B256::repeat_byte(2),
            &[(TOKEN, U256::MAX), (TOKEN, U256::from(1))],
            NOW,
            false,
        );
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));
        Ok(())
    }

    #[test]
    fn test_lowering_limit_clamps_spent() -> eyre::Result<()> {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(100));
        ledger.debit(key_hash(), &[(TOKEN, U256::from(90))], NOW, true)?;

        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(50));
        let infos = ledger.spend_infos(&key_hash(), NOW);
        assert_eq!(infos[0].limit, U256::from(50));
        assert_eq!(infos[0].spent, U256::from(50));
        assert_eq!(infos[0].currentSpent, U256::from(50));

        let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(1))], NOW, true);
        assert_eq!(result, Err(AccountError::exceeds_limit(TOKEN).into()));

        // Raising it again keeps the clamped spend.
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(80));
        ledger.debit(key_hash(), &[(TOKEN, U256::from(30))], NOW, true)?;
        let record = ledger.record(&key_hash(), TOKEN, SpendPeriod::Day).unwrap();
        assert_eq!(record.spent, U256::from(80));
        Ok(())
    }

    #[test]
    fn test_record_unchecked_saturates() {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Hour, U256::from(10));
        ledger.record_unchecked(key_hash(), &[(TOKEN, U256::from(25))], NOW);
        assert_eq!(
            ledger.record(&key_hash(), TOKEN, SpendPeriod::Hour).unwrap().spent,
            U256::from(10)
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let mut ledger = SpendLedger::new();
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Day, U256::from(1));
        ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Year, U256::from(1));

        assert!(ledger.remove_spend_limit(key_hash(), TOKEN, SpendPeriod::Day));
        assert!(!ledger.remove_spend_limit(key_hash(), TOKEN, SpendPeriod::Day));
        assert_eq!(ledger.spend_infos(&key_hash(), NOW).len(), 1);

        ledger.set_spend_limits_enabled(key_hash(), false);
        ledger.clear(&key_hash());
        assert!(ledger.spend_infos(&key_hash(), NOW).is_empty());
        assert!(ledger.spend_limits_enabled(&key_hash()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn spent_never_exceeds_limit(
            limit in 1u64..1_000,
            debits in prop::collection::vec((0u64..400, 0u64..3_600), 1..40),
        ) {
            let mut ledger = SpendLedger::new();
            ledger.set_spend_limit(key_hash(), TOKEN, SpendPeriod::Hour, U256::from(limit));

            let mut now = NOW;
            for (amount, advance) in debits {
                now += advance;
                let before = ledger
                    .record(&key_hash(), TOKEN, SpendPeriod::Hour)
                    .unwrap()
                    .current_spent(SpendPeriod::Hour, now);
                let result = ledger.debit(key_hash(), &[(TOKEN, U256::from(amount))], now, true);
                let record = *ledger.record(&key_hash(), TOKEN, SpendPeriod::Hour).unwrap();

                prop_assert!(record.spent <= record.limit);
                if result.is_ok() {
                    let spent = record.current_spent(SpendPeriod::Hour, now);
                    prop_assert_eq!(spent, before + U256::from(amount));
                } else {
                    prop_assert!(before + U256::from(amount) > U256::from(limit));
                }
            }
        }
    }
}
