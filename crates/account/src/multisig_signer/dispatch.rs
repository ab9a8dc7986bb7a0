use super::MultiSigSigner;
use crate::{
    dispatch::{dispatch_call, mutate_void, view},
    error::{KeyguardError, Result},
    host::CallContext,
};
use alloy::{primitives::Bytes, sol_types::SolInterface};
use keyguard_contracts::{IMultiSigSigner::IMultiSigSignerCalls, MULTISIG_SIGNER_ADDRESS};

impl MultiSigSigner {
    /// Executes ABI-encoded `calldata` sent by `ctx.account`.
    pub fn call(&mut self, ctx: &CallContext<'_>, calldata: &[u8]) -> Result<Bytes> {
        dispatch_call(
            calldata,
            IMultiSigSignerCalls::abi_decode,
            |_| KeyguardError::CallReverted { target: MULTISIG_SIGNER_ADDRESS, data: Bytes::new() },
            |call| match call {
                IMultiSigSignerCalls::initConfig(call) => {
                    mutate_void(call, |c| self.init_config(ctx.account, c))
                }
                IMultiSigSignerCalls::addOwner(call) => {
                    mutate_void(call, |c| self.add_owner(ctx, c))
                }
                IMultiSigSignerCalls::removeOwner(call) => {
                    mutate_void(call, |c| self.remove_owner(ctx, c))
                }
                IMultiSigSignerCalls::setThreshold(call) => {
                    mutate_void(call, |c| self.set_threshold(ctx, c))
                }
                IMultiSigSignerCalls::getConfig(call) => view(call, |c| self.get_config(c)),
                IMultiSigSignerCalls::isValidSignatureWithKeyHash(call) => {
                    view(call, |c| Ok(self.is_valid_signature_with_key_hash(ctx, c)))
                }
            },
        )
    }
}
