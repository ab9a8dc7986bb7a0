use alloy::primitives::B256;
use indexmap::IndexMap;
use keyguard_contracts::AccountError;
use keyguard_primitives::Key;
use tracing::trace;

use crate::error::Result;

/// Read-only access to an account's keys.
///
/// Validators resolve owner key hashes through this while the account is mid-call, so it never
/// exposes mutation.
pub trait KeyResolver {
    fn resolve_key(&self, key_hash: &B256) -> Option<&Key>;
}

/// Keys authorized on an account, enumerable in authorization order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRegistry {
    keys: IndexMap<B256, Key>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `key` under its key hash.
    ///
    /// Authorizing a key that is already present overwrites its expiry and super admin flag in
    /// place and returns the same hash.
    pub fn authorize(&mut self, key: Key) -> Result<B256> {
        key.validate().map_err(|_| AccountError::invalid_public_key())?;

        let key_hash = key.key_hash();
        trace!(
            %key_hash,
            key_type = ?key.key_type,
            expiry = key.expiry,
            super_admin = key.is_super_admin,
            "authorizing key"
        );
        self.keys.insert(key_hash, key);
        Ok(key_hash)
    }

    /// Removes the key. Callers are responsible for dropping state keyed by the hash.
    pub fn revoke(&mut self, key_hash: B256) -> Result<Key> {
        let key = self
            .keys
            .shift_remove(&key_hash)
            .ok_or(AccountError::key_does_not_exist())?;
        trace!(%key_hash, "revoked key");
        Ok(key)
    }

    pub fn get_key(&self, key_hash: &B256) -> Result<&Key> {
        self.keys.get(key_hash).ok_or_else(|| AccountError::key_does_not_exist().into())
    }

    /// Returns the key if it exists and has not expired at `timestamp`.
    pub fn get_usable_key(&self, key_hash: &B256, timestamp: u64) -> Result<&Key> {
        let key = self.get_key(key_hash)?;
        if !key.is_usable_at(timestamp) {
            return Err(AccountError::key_expired().into());
        }
        Ok(key)
    }

    pub fn contains(&self, key_hash: &B256) -> bool {
        self.keys.contains_key(key_hash)
    }

    /// All keys with their hashes, in authorization order.
    pub fn get_keys(&self) -> impl Iterator<Item = (&Key, B256)> {
        self.keys.iter().map(|(key_hash, key)| (key, *key_hash))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyResolver for KeyRegistry {
    fn resolve_key(&self, key_hash: &B256) -> Option<&Key> {
        self.keys.get(key_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use keyguard_primitives::KeyType;

    fn key(byte: u8) -> Key {
        Key::secp256k1(Address::repeat_byte(byte))
    }

    #[test]
    fn test_authorize_and_get() -> eyre::Result<()> {
        let mut registry = KeyRegistry::new();
        let key_hash = registry.authorize(key(1))?;

        assert_eq!(key_hash, key(1).key_hash());
        assert_eq!(registry.get_key(&key_hash)?, &key(1));
        assert!(registry.contains(&key_hash));
        Ok(())
    }

    #[test]
    fn test_reauthorize_overwrites_in_place() -> eyre::Result<()> {
        let mut registry = KeyRegistry::new();
        let first = registry.authorize(key(1))?;
        registry.authorize(key(2))?;

        let again = registry.authorize(key(1).with_expiry(50).with_super_admin(true))?;
        assert_eq!(first, again);
        assert_eq!(registry.len(), 2);

        let keys: Vec<_> = registry.get_keys().collect();
        assert_eq!(keys[0].1, first);
        assert_eq!(keys[0].0.expiry, 50);
        assert!(keys[0].0.is_super_admin);
        Ok(())
    }

    #[test]
    fn test_revoke() -> eyre::Result<()> {
        let mut registry = KeyRegistry::new();
        let key_hash = registry.authorize(key(1))?;

        assert_eq!(registry.revoke(key_hash)?, key(1));
        assert_eq!(
            registry.get_key(&key_hash),
            Err(AccountError::key_does_not_exist().into())
        );
        assert_eq!(registry.revoke(key_hash), Err(AccountError::key_does_not_exist().into()));
        Ok(())
    }

    #[test]
    fn test_revoke_keeps_order_of_remaining_keys() -> eyre::Result<()> {
        let mut registry = KeyRegistry::new();
        let hashes = [1, 2, 3].map(|b| registry.authorize(key(b)).unwrap());
        registry.revoke(hashes[1])?;

        let remaining: Vec<_> = registry.get_keys().map(|(_, h)| h).collect();
        assert_eq!(remaining, vec![hashes[0], hashes[2]]);
        Ok(())
    }

    #[test]
    fn test_invalid_public_key() {
        let mut registry = KeyRegistry::new();
        let result = registry.authorize(Key::new(KeyType::P256, vec![0u8; 33]));
        assert_eq!(result, Err(AccountError::invalid_public_key().into()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expiry() -> eyre::Result<()> {
        let mut registry = KeyRegistry::new();
        let key_hash = registry.authorize(key(1).with_expiry(100))?;

        assert!(registry.get_usable_key(&key_hash, 99).is_ok());
        assert_eq!(
            registry.get_usable_key(&key_hash, 100),
            Err(AccountError::key_expired().into())
        );
        assert_eq!(
            registry.get_usable_key(&B256::ZERO, 0),
            Err(AccountError::key_does_not_exist().into())
        );
        Ok(())
    }
}
