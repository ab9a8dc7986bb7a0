use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, keccak256};
use alloy_sol_types::SolValue;
use keyguard_contracts::IAccount;
use serde::{Deserialize, Serialize};

use crate::signature::{self, SignatureError};

/// Length of a secp256k1 public key: the signer's address.
pub const SECP256K1_PUBLIC_KEY_LENGTH: usize = 20;

/// Length of a P256 public key: uncompressed `x || y`.
pub const P256_PUBLIC_KEY_LENGTH: usize = 64;

/// Length of an external public key: `validator || salt`.
pub const EXTERNAL_PUBLIC_KEY_LENGTH: usize = 32;

/// Errors raised when a key record does not describe a usable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key type {0}")]
    UnknownKeyType(u8),

    #[error("{key_type:?} public key must be {expected} bytes, got {actual}")]
    InvalidLength {
        key_type: KeyType,
        expected: usize,
        actual: usize,
    },

    #[error("public key encodes the zero address")]
    ZeroAddress,
}

/// Signature scheme of a key.
///
/// Discriminants match the `IAccount.KeyType` ABI enum and feed into the key hash, so they
/// must never be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum KeyType {
    P256 = 0,
    WebAuthnP256 = 1,
    Secp256k1 = 2,
    /// Signatures are checked by the validator contract embedded in the public key.
    External = 3,
}

impl KeyType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether signatures for this key type are verified with built-in cryptography.
    pub const fn is_intrinsic(self) -> bool {
        !matches!(self, Self::External)
    }

    /// Expected length of a public key of this type.
    pub const fn public_key_length(self) -> usize {
        match self {
            Self::Secp256k1 => SECP256K1_PUBLIC_KEY_LENGTH,
            Self::P256 | Self::WebAuthnP256 => P256_PUBLIC_KEY_LENGTH,
            Self::External => EXTERNAL_PUBLIC_KEY_LENGTH,
        }
    }
}

impl TryFrom<u8> for KeyType {
    type Error = KeyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::P256),
            1 => Ok(Self::WebAuthnP256),
            2 => Ok(Self::Secp256k1),
            3 => Ok(Self::External),
            other => Err(KeyError::UnknownKeyType(other)),
        }
    }
}

impl From<KeyType> for IAccount::KeyType {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::P256 => Self::P256,
            KeyType::WebAuthnP256 => Self::WebAuthnP256,
            KeyType::Secp256k1 => Self::Secp256k1,
            KeyType::External => Self::External,
        }
    }
}

impl TryFrom<IAccount::KeyType> for KeyType {
    type Error = KeyError;

    fn try_from(value: IAccount::KeyType) -> Result<Self, Self::Error> {
        match value {
            IAccount::KeyType::P256 => Ok(Self::P256),
            IAccount::KeyType::WebAuthnP256 => Ok(Self::WebAuthnP256),
            IAccount::KeyType::Secp256k1 => Ok(Self::Secp256k1),
            IAccount::KeyType::External => Ok(Self::External),
            IAccount::KeyType::__Invalid => Err(KeyError::UnknownKeyType(u8::MAX)),
        }
    }
}

/// Computes the key hash identifying `(key_type, public_key)`.
///
/// `keccak256(abi.encode(uint8(keyType), keccak256(publicKey)))`
pub fn key_hash(key_type: KeyType, public_key: &[u8]) -> B256 {
    keccak256((U256::from(key_type.as_u8()), keccak256(public_key)).abi_encode())
}

/// Key record authorized on an account.
///
/// The key hash is derived from `key_type` and `public_key` and is never stored in the record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Timestamp from which the key is no longer usable. `0` never expires.
    pub expiry: u64,
    pub key_type: KeyType,
    pub is_super_admin: bool,
    pub public_key: Bytes,
}

impl Key {
    pub fn new(key_type: KeyType, public_key: impl Into<Bytes>) -> Self {
        Self { expiry: 0, key_type, is_super_admin: false, public_key: public_key.into() }
    }

    /// Secp256k1 key for the signer at `address`.
    pub fn secp256k1(address: Address) -> Self {
        Self::new(KeyType::Secp256k1, address.to_vec())
    }

    /// P256 key from its affine coordinates.
    pub fn p256(x: B256, y: B256) -> Self {
        Self::new(KeyType::P256, [x.as_slice(), y.as_slice()].concat())
    }

    /// WebAuthn P256 key from its affine coordinates.
    pub fn webauthn_p256(x: B256, y: B256) -> Self {
        Self::new(KeyType::WebAuthnP256, [x.as_slice(), y.as_slice()].concat())
    }

    /// External key delegating to `validator`. The salt distinguishes several keys bound to
    /// the same validator.
    pub fn external(validator: Address, salt: FixedBytes<12>) -> Self {
        Self::new(KeyType::External, [validator.as_slice(), salt.as_slice()].concat())
    }

    pub fn with_expiry(mut self, expiry: u64) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_super_admin(mut self, is_super_admin: bool) -> Self {
        self.is_super_admin = is_super_admin;
        self
    }

    pub fn key_hash(&self) -> B256 {
        key_hash(self.key_type, &self.public_key)
    }

    /// Checks that the public key has the shape its key type requires.
    pub fn validate(&self) -> Result<(), KeyError> {
        let expected = self.key_type.public_key_length();
        if self.public_key.len() != expected {
            return Err(KeyError::InvalidLength {
                key_type: self.key_type,
                expected,
                actual: self.public_key.len(),
            });
        }

        match self.key_type {
            KeyType::Secp256k1 | KeyType::External
                if self.public_key[..20].iter().all(|b| *b == 0) =>
            {
                Err(KeyError::ZeroAddress)
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` while the key has not reached its expiry.
    pub const fn is_usable_at(&self, timestamp: u64) -> bool {
        self.expiry == 0 || timestamp < self.expiry
    }

    /// Validator address of an external key.
    pub fn external_validator(&self) -> Option<Address> {
        (self.key_type == KeyType::External && self.public_key.len() == EXTERNAL_PUBLIC_KEY_LENGTH)
            .then(|| Address::from_slice(&self.public_key[..20]))
    }

    /// Verifies `signature` over `digest` with built-in cryptography.
    ///
    /// External keys always fail here; their validator has to be consulted instead.
    pub fn verify(&self, digest: &B256, signature: &[u8]) -> Result<(), SignatureError> {
        signature::verify(self.key_type, &self.public_key, digest, signature)
    }
}

impl From<Key> for IAccount::Key {
    fn from(key: Key) -> Self {
        Self {
            expiry: key.expiry,
            keyType: key.key_type.into(),
            isSuperAdmin: key.is_super_admin,
            publicKey: key.public_key,
        }
    }
}

impl TryFrom<IAccount::Key> for Key {
    type Error = KeyError;

    fn try_from(key: IAccount::Key) -> Result<Self, Self::Error> {
        Ok(Self {
            expiry: key.expiry,
            key_type: key.keyType.try_into()?,
            is_super_admin: key.isSuperAdmin,
            public_key: key.publicKey,
        })
    }
}
