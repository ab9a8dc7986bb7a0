//! ABI call dispatch helpers shared by the account and the multisig signer.

use alloy::{
    primitives::{Bytes, FixedBytes},
    sol_types::SolCall,
};
use tracing::trace;

use crate::error::{KeyguardError, Result};

/// Selector of `calldata`, or zero when it is shorter than four bytes.
pub(crate) fn selector(calldata: &[u8]) -> FixedBytes<4> {
    calldata.get(..4).map(FixedBytes::<4>::from_slice).unwrap_or_default()
}

#[inline]
pub(crate) fn dispatch_call<T>(
    calldata: &[u8],
    decode: impl FnOnce(&[u8]) -> core::result::Result<T, alloy::sol_types::Error>,
    unknown: impl FnOnce(FixedBytes<4>) -> KeyguardError,
    f: impl FnOnce(T) -> Result<Bytes>,
) -> Result<Bytes> {
    if calldata.len() < 4 {
        return Err(unknown(FixedBytes::ZERO));
    }
    match decode(calldata) {
        Ok(call) => f(call),
        Err(err) => {
            trace!(selector = %selector(calldata), %err, "failed to decode call");
            Err(unknown(selector(calldata)))
        }
    }
}

#[inline]
pub(crate) fn view<T: SolCall>(call: T, f: impl FnOnce(T) -> Result<T::Return>) -> Result<Bytes> {
    f(call).map(|ret| T::abi_encode_returns(&ret).into())
}

#[inline]
pub(crate) fn mutate<T: SolCall>(call: T, f: impl FnOnce(T) -> Result<T::Return>) -> Result<Bytes> {
    trace!(function = T::SIGNATURE, "dispatching mutation");
    f(call).map(|ret| T::abi_encode_returns(&ret).into())
}

#[inline]
pub(crate) fn mutate_void<T: SolCall>(call: T, f: impl FnOnce(T) -> Result<()>) -> Result<Bytes> {
    trace!(function = T::SIGNATURE, "dispatching mutation");
    f(call).map(|()| Bytes::new())
}
