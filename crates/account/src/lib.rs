//! Keyguard smart account: key registry, guarded execution, spend limits and multisig.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod account;
pub mod config;
pub(crate) mod dispatch;
pub mod error;
pub mod guarded_executor;
pub mod host;
pub mod key_registry;
pub mod multisig_signer;
pub mod schema;
pub mod spend_ledger;

pub use account::{Account, AccountState};
pub use config::GuardConfig;
pub use error::{KeyguardError, Result};
pub use guarded_executor::GuardedExecutor;
pub use host::{CallChecker, CallContext, Host, MemoryHost, SignatureValidator};
pub use key_registry::{KeyRegistry, KeyResolver};
pub use multisig_signer::MultiSigSigner;
pub use schema::{AccountSnapshot, SchemaError};
pub use spend_ledger::SpendLedger;

pub use keyguard_contracts as contracts;
pub use keyguard_primitives as primitives;
