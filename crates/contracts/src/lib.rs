//! Keyguard account interfaces and bindings.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use alloy_primitives::{Address, B256, FixedBytes, address, b256, fixed_bytes};

pub mod account;
pub mod call_checker;
pub mod erc20;
pub mod multisig_signer;

pub use account::*;
pub use call_checker::*;
pub use erc20::*;
pub use multisig_signer::*;

/// Address the multisig signer is hosted at.
pub const MULTISIG_SIGNER_ADDRESS: Address =
    address!("0x4D554C5449534947000000000000000000000000");

/// Token address used for spend accounting of the native value attached to a call.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Wildcard target matching every address except the account itself.
pub const ANY_TARGET: Address = address!("0x3232323232323232323232323232323232323232");

/// Wildcard selector matching every function on a target.
pub const ANY_FN_SEL: FixedBytes<4> = fixed_bytes!("0x32323232");

/// Selector assigned to calls carrying fewer than four bytes of calldata.
pub const EMPTY_CALLDATA_FN_SEL: FixedBytes<4> = fixed_bytes!("0xe0e0e0e0");

/// Wildcard key hash for call checkers that apply to every key.
pub const ANY_KEYHASH: B256 =
    b256!("0x3232323232323232323232323232323232323232323232323232323232323232");

/// Returned by `isValidSignatureWithKeyHash` when the signature is accepted.
pub const SIGNATURE_MAGIC_VALUE: FixedBytes<4> =
    FixedBytes(<IMultiSigSigner::isValidSignatureWithKeyHashCall as alloy_sol_types::SolCall>::SELECTOR);

/// Returned by `isValidSignatureWithKeyHash` when the signature is rejected.
pub const SIGNATURE_FAIL_VALUE: FixedBytes<4> = fixed_bytes!("0xffffffff");
