use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256, Bytes};
use keyguard_contracts::{IAccount::Call, MULTISIG_SIGNER_ADDRESS};
use tracing::trace;

use super::{CallChecker, CallContext, Checkpoint, Host, SignatureValidator};
use crate::{
    config::GuardConfig,
    error::{KeyguardError, Result},
    multisig_signer::MultiSigSigner,
};

/// A call dispatched through [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedCall {
    pub account: Address,
    pub key_hash: B256,
    pub call: Call,
}

#[derive(Clone)]
struct Journal {
    multisig: MultiSigSigner,
    calls: usize,
}

/// In-memory host with a multisig signer deployed at [`MULTISIG_SIGNER_ADDRESS`].
///
/// Calls to any other address succeed with empty output and are recorded, unless the target
/// was marked as reverting.
pub struct MemoryHost {
    timestamp: u64,
    multisig: MultiSigSigner,
    call_checkers: HashMap<Address, Box<dyn CallChecker>>,
    reverting: HashSet<Address>,
    calls: Vec<DispatchedCall>,
    journal: Vec<Journal>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl MemoryHost {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            timestamp: 0,
            multisig: MultiSigSigner::new(config),
            call_checkers: HashMap::new(),
            reverting: HashSet::new(),
            calls: Vec::new(),
            journal: Vec::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    /// Deploys a call checker at `address`.
    pub fn set_call_checker(&mut self, address: Address, checker: impl CallChecker + 'static) {
        self.call_checkers.insert(address, Box::new(checker));
    }

    /// Makes every call to `target` revert.
    pub fn set_reverting(&mut self, target: Address) {
        self.reverting.insert(target);
    }

    pub fn multisig(&self) -> &MultiSigSigner {
        &self.multisig
    }

    pub fn multisig_mut(&mut self) -> &mut MultiSigSigner {
        &mut self.multisig
    }

    /// Calls dispatched to plain targets, in order.
    pub fn calls(&self) -> &[DispatchedCall] {
        &self.calls
    }
}

impl Host for MemoryHost {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn signature_validator(&self, address: Address) -> Option<&dyn SignatureValidator> {
        (address == MULTISIG_SIGNER_ADDRESS).then_some(&self.multisig as &dyn SignatureValidator)
    }

    fn call_checker(&self, address: Address) -> Option<&dyn CallChecker> {
        self.call_checkers.get(&address).map(|checker| checker.as_ref())
    }

    fn dispatch(&mut self, ctx: &CallContext<'_>, call: &Call) -> Result<Bytes> {
        if self.reverting.contains(&call.to) {
            trace!(account = %ctx.account, target = %call.to, "dispatched call reverted");
            return Err(KeyguardError::CallReverted { target: call.to, data: Bytes::new() });
        }
        if call.to == MULTISIG_SIGNER_ADDRESS {
            return self.multisig.call(ctx, &call.data);
        }

        trace!(
            account = %ctx.account,
            key_hash = %ctx.key_hash,
            target = %call.to,
            value = %call.value,
            "dispatched call"
        );
        self.calls.push(DispatchedCall {
            account: ctx.account,
            key_hash: ctx.key_hash,
            call: call.clone(),
        });
        Ok(Bytes::new())
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.journal.push(Journal { multisig: self.multisig.clone(), calls: self.calls.len() });
        Checkpoint(self.journal.len() - 1)
    }

    fn checkpoint_commit(&mut self, checkpoint: Checkpoint) {
        self.journal.truncate(checkpoint.0);
    }

    fn checkpoint_revert(&mut self, checkpoint: Checkpoint) {
        if let Some(entry) = self.journal.drain(checkpoint.0..).next() {
            self.multisig = entry.multisig;
            self.calls.truncate(entry.calls);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_registry::KeyRegistry;
    use alloy::{primitives::U256, sol_types::SolCall};
    use keyguard_contracts::{ICallChecker, IMultiSigSigner};

    fn call(to: Address) -> Call {
        Call { to, value: U256::ZERO, data: Bytes::new() }
    }

    #[test]
    fn test_revert_restores_calls_and_multisig() -> eyre::Result<()> {
        let mut host = MemoryHost::default();
        let keys = KeyRegistry::new();
        let ctx = CallContext {
            account: Address::repeat_byte(1),
            key_hash: B256::ZERO,
            keys: &keys,
            timestamp: 0,
        };

        host.dispatch(&ctx, &call(Address::repeat_byte(2)))?;
        let checkpoint = host.checkpoint();

        host.dispatch(&ctx, &call(Address::repeat_byte(3)))?;
        let init = IMultiSigSigner::initConfigCall {
            keyHash: B256::repeat_byte(9),
            threshold: U256::from(1),
            owners: vec![B256::ZERO],
        };
        let init =
            Call { to: MULTISIG_SIGNER_ADDRESS, value: U256::ZERO, data: init.abi_encode().into() };
        host.dispatch(&ctx, &init)?;
        assert_eq!(host.calls().len(), 2);
        assert!(host.multisig().config(ctx.account, B256::repeat_byte(9)).is_some());

        host.checkpoint_revert(checkpoint);
        assert_eq!(host.calls().len(), 1);
        assert!(host.multisig().config(ctx.account, B256::repeat_byte(9)).is_none());
        Ok(())
    }

    #[test]
    fn test_nested_checkpoints() -> eyre::Result<()> {
        let mut host = MemoryHost::default();
        let keys = KeyRegistry::new();
        let ctx = CallContext {
            account: Address::repeat_byte(1),
            key_hash: B256::ZERO,
            keys: &keys,
            timestamp: 0,
        };

        let outer = host.checkpoint();
        host.dispatch(&ctx, &call(Address::repeat_byte(2)))?;
        let inner = host.checkpoint();
        host.dispatch(&ctx, &call(Address::repeat_byte(3)))?;
        host.checkpoint_commit(inner);
        assert_eq!(host.calls().len(), 2);

        host.checkpoint_revert(outer);
        assert!(host.calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_reverting_target() {
        let mut host = MemoryHost::default();
        let keys = KeyRegistry::new();
        let ctx = CallContext {
            account: Address::repeat_byte(1),
            key_hash: B256::ZERO,
            keys: &keys,
            timestamp: 0,
        };
        host.set_reverting(Address::repeat_byte(2));

        let reverting = Address::repeat_byte(2);
        let result = host.dispatch(&ctx, &call(reverting));
        assert!(matches!(
            result,
            Err(KeyguardError::CallReverted { target, .. }) if target == reverting
        ));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_call_checker_lookup() {
        let mut host = MemoryHost::default();
        let checker = Address::repeat_byte(0xcc);
        host.set_call_checker(checker, |call: &ICallChecker::canExecuteCall| call.data.is_empty());

        let query = ICallChecker::canExecuteCall {
            keyHash: B256::ZERO,
            target: Address::ZERO,
            data: Bytes::new(),
        };
        assert!(host.call_checker(checker).unwrap().can_execute(&query));
        assert!(host.call_checker(Address::ZERO).is_none());
        assert!(host.signature_validator(MULTISIG_SIGNER_ADDRESS).is_some());
        assert!(host.signature_validator(checker).is_none());
    }
}
