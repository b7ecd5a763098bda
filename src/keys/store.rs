use crate::{IdentityKeyPair, PreKey, PreKeyBundle};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;

/// Storage for the local party's pre-keys.
///
/// A [`Session`](crate::Session) consults the store while decrypting a
/// pre-key message and deletes each ordinary pre-key once it has been used.
pub trait PreKeyStore {
    /// Failure reported by the backing storage.
    type Error: Display;

    /// Loads the pre-key with the given ID, or `None` if it is absent.
    fn load_prekey(&mut self, prekey_id: u16) -> Result<Option<PreKey>, Self::Error>;

    /// Deletes the pre-key with the given ID.
    fn delete_prekey(&mut self, prekey_id: u16) -> Result<(), Self::Error>;
}

/// A [`PreKeyStore`] kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryPreKeyStore {
    keys: HashMap<u16, PreKey>,
}

impl MemoryPreKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pre-key, replacing any pre-key with the same ID.
    pub fn insert(&mut self, prekey: PreKey) {
        self.keys.insert(prekey.key_id, prekey);
    }

    /// Whether a pre-key with the given ID is stored.
    pub fn contains(&self, prekey_id: u16) -> bool {
        self.keys.contains_key(&prekey_id)
    }

    /// Number of stored pre-keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store holds no pre-keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// A bundle for the stored pre-key, signed by `identity`.
    pub fn public_bundle(
        &self,
        identity: &IdentityKeyPair,
        prekey_id: u16,
    ) -> Option<PreKeyBundle> {
        self.keys
            .get(&prekey_id)
            .map(|prekey| PreKeyBundle::signed(identity, prekey))
    }

    /// Signed bundles for every stored pre-key, ordered by ID.
    pub fn public_bundles(&self, identity: &IdentityKeyPair) -> Vec<PreKeyBundle> {
        let mut bundles: Vec<_> = self
            .keys
            .values()
            .map(|prekey| PreKeyBundle::signed(identity, prekey))
            .collect();
        bundles.sort_by_key(|bundle| bundle.prekey_id);
        bundles
    }
}

impl FromIterator<PreKey> for MemoryPreKeyStore {
    fn from_iter<I: IntoIterator<Item = PreKey>>(iter: I) -> Self {
        let mut store = Self::new();
        for prekey in iter {
            store.insert(prekey);
        }
        store
    }
}

impl PreKeyStore for MemoryPreKeyStore {
    type Error = Infallible;

    fn load_prekey(&mut self, prekey_id: u16) -> Result<Option<PreKey>, Self::Error> {
        Ok(self.keys.get(&prekey_id).cloned())
    }

    fn delete_prekey(&mut self, prekey_id: u16) -> Result<(), Self::Error> {
        self.keys.remove(&prekey_id);
        Ok(())
    }
}
