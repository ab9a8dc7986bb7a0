//! The environment an account executes in.

pub mod memory;

pub use memory::MemoryHost;

use alloy::primitives::{Address, B256, Bytes, FixedBytes};
use keyguard_contracts::{IAccount::Call, ICallChecker};

use crate::{error::Result, key_registry::KeyResolver};

/// Context of a call an account makes.
///
/// Built by the account for a single call frame and borrowed by the callee, so it can never
/// outlive the call that created it.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    /// The calling account.
    pub account: Address,
    /// Key the account is acting under. During signature validation this is the key being
    /// validated.
    pub key_hash: B256,
    /// Read-only view of the caller's keys.
    pub keys: &'a dyn KeyResolver,
    pub timestamp: u64,
}

impl core::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallContext")
            .field("account", &self.account)
            .field("key_hash", &self.key_hash)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Validator for keys of the `External` type.
pub trait SignatureValidator {
    /// Returns the success magic value when `signature` authorizes `digest` for `key_hash`,
    /// and the fail value otherwise. Never errors.
    fn is_valid_signature_with_key_hash(
        &self,
        ctx: &CallContext<'_>,
        digest: B256,
        key_hash: B256,
        signature: &[u8],
    ) -> FixedBytes<4>;
}

/// Oracle consulted before a guarded key calls a target.
pub trait CallChecker {
    fn can_execute(&self, call: &ICallChecker::canExecuteCall) -> bool;
}

impl<F> CallChecker for F
where
    F: Fn(&ICallChecker::canExecuteCall) -> bool,
{
    fn can_execute(&self, call: &ICallChecker::canExecuteCall) -> bool {
        self(call)
    }
}

/// Journal position returned by [`Host::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub usize);

/// Everything outside the account: the clock, other contracts and the journal.
pub trait Host {
    /// Current block timestamp.
    fn timestamp(&self) -> u64;

    fn signature_validator(&self, address: Address) -> Option<&dyn SignatureValidator>;

    fn call_checker(&self, address: Address) -> Option<&dyn CallChecker>;

    /// Executes `call` on behalf of `ctx.account`, returning its output.
    fn dispatch(&mut self, ctx: &CallContext<'_>, call: &Call) -> Result<Bytes>;

    fn checkpoint(&mut self) -> Checkpoint;

    /// Keeps every effect since `checkpoint`.
    fn checkpoint_commit(&mut self, checkpoint: Checkpoint);

    /// Undoes every effect since `checkpoint`.
    fn checkpoint_revert(&mut self, checkpoint: Checkpoint);
}
