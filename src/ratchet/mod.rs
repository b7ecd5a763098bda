mod chain;
mod state;

use crate::cbor::{self, Decode, Encode};
use crate::derived::{CipherKey, DerivedSecrets, MacKey};
use crate::{DecodeError, Error, KeyPair, PublicKey};
pub use chain::{ChainKey, RecvChain, SendChain};
use ciborium::Value;
pub use state::SessionState;
use zeroize::Zeroizing;

/// Root of the asymmetric ratchet. Every DH turn replaces it and yields a
/// fresh chain key.
#[derive(Clone)]
pub struct RootKey {
    key: CipherKey,
}

impl RootKey {
    pub(crate) fn from_cipher_key(key: CipherKey) -> Self {
        Self { key }
    }

    /// Mixes DH(`ours`, `theirs`) into the root key.
    pub fn dh_ratchet(
        &self,
        ours: &KeyPair,
        theirs: &PublicKey,
    ) -> Result<(Self, ChainKey), Error> {
        let secret = Zeroizing::new(ours.secret_key.shared_secret(theirs));
        let DerivedSecrets {
            cipher_key,
            mac_key,
        } = DerivedSecrets::kdf(secret.as_slice(), self.key.as_bytes(), b"dh_ratchet")?;

        Ok((
            Self::from_cipher_key(cipher_key),
            ChainKey::from_mac_key(mac_key, 0),
        ))
    }
}

impl Encode for RootKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, self.key.encode())])
    }
}

impl Decode for RootKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut key = None;
        for (field, value) in cbor::entries(value, "RootKey")? {
            if field == 0 {
                key = Some(CipherKey::decode(value)?);
            }
        }
        Ok(Self::from_cipher_key(cbor::required(key, "RootKey.key")?))
    }
}

/// Keys of a single message.
#[derive(Clone)]
pub struct MessageKeys {
    pub(crate) cipher_key: CipherKey,
    pub(crate) mac_key: MacKey,
    pub(crate) counter: u32,
}

impl MessageKeys {
    /// Counter of the message these keys belong to.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.cipher_key.encrypt(plaintext, self.counter)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.cipher_key.decrypt(ciphertext, self.counter)
    }
}

impl Encode for MessageKeys {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, self.cipher_key.encode()),
            (1, self.mac_key.encode()),
            (2, cbor::uint(self.counter)),
        ])
    }
}

impl Decode for MessageKeys {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut cipher_key = None;
        let mut mac_key = None;
        let mut counter = None;
        for (key, value) in cbor::entries(value, "MessageKeys")? {
            match key {
                0 => cipher_key = Some(CipherKey::decode(value)?),
                1 => mac_key = Some(MacKey::decode(value)?),
                2 => counter = Some(cbor::to_uint(value, "MessageKeys.counter")?),
                _ => {}
            }
        }

        Ok(Self {
            cipher_key: cbor::required(cipher_key, "MessageKeys.cipher_key")?,
            mac_key: cbor::required(mac_key, "MessageKeys.mac_key")?,
            counter: cbor::required(counter, "MessageKeys.counter")?,
        })
    }
}
