//! Keyguard primitive types: key records, key hashes, signature verification and spend periods.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod key;
pub mod period;
pub mod signature;

pub use key::{Key, KeyError, KeyType, key_hash};
pub use period::SpendPeriod;
pub use signature::SignatureError;
