//! Symmetric keys derived from the ratchet.

use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error};
use aes_gcm_siv::aead::Aead;
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use ciborium::Value;
use hkdf::Hkdf;
use hmac::{Hmac, Mac as _};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

const NONCE_SIZE: usize = 12;

/// Per-message encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; 32],
}

impl CipherKey {
    pub(crate) fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// The nonce is the big-endian counter padded with zeros. A cipher key
    /// only ever encrypts under the counter it was derived for, so no nonce
    /// repeats under one key.
    fn nonce(counter: u32) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&counter.to_be_bytes());
        nonce
    }

    fn cipher(&self) -> Aes256GcmSiv {
        Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&self.key))
    }

    /// Encrypts `plaintext` for the message with the given counter.
    pub fn encrypt(&self, plaintext: &[u8], counter: u32) -> Result<Vec<u8>, Error> {
        let nonce = Self::nonce(counter);
        Ok(self.cipher().encrypt(Nonce::from_slice(&nonce), plaintext)?)
    }

    /// Decrypts `ciphertext` of the message with the given counter.
    pub fn decrypt(&self, ciphertext: &[u8], counter: u32) -> Result<Vec<u8>, Error> {
        let nonce = Self::nonce(counter);
        Ok(self.cipher().decrypt(Nonce::from_slice(&nonce), ciphertext)?)
    }
}

impl Encode for CipherKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, cbor::bytes(&self.key))])
    }
}

impl Decode for CipherKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut key = None;
        for (field, value) in cbor::entries(value, "CipherKey")? {
            if field == 0 {
                key = Some(cbor::to_fixed::<32>(value, "CipherKey.key")?);
            }
        }
        Ok(Self::new(cbor::required(key, "CipherKey.key")?))
    }
}

/// An HMAC-SHA256 tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mac([u8; 32]);

impl Mac {
    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Key for HMAC-SHA256. Authenticates envelopes and stretches chain keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey {
    key: [u8; 32],
}

impl MacKey {
    pub(crate) fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn hmac(&self) -> Result<HmacSha256, Error> {
        <HmacSha256 as hmac::Mac>::new_from_slice(&self.key)
            .map_err(|err| Error::Crypto(format!("HMAC initialisation failed: {err:?}")))
    }

    /// Computes the tag of `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Mac, Error> {
        let mut hmac = self.hmac()?;
        hmac.update(message);

        let mut tag = [0u8; 32];
        tag.copy_from_slice(&hmac.finalize().into_bytes());
        Ok(Mac(tag))
    }

    /// Checks `mac` against `message` in constant time.
    pub fn verify(&self, mac: &Mac, message: &[u8]) -> Result<bool, Error> {
        let mut hmac = self.hmac()?;
        hmac.update(message);
        Ok(hmac.verify_slice(&mac.0).is_ok())
    }
}

impl Encode for MacKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, cbor::bytes(&self.key))])
    }
}

impl Decode for MacKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut key = None;
        for (field, value) in cbor::entries(value, "MacKey")? {
            if field == 0 {
                key = Some(cbor::to_fixed::<32>(value, "MacKey.key")?);
            }
        }
        Ok(Self::new(cbor::required(key, "MacKey.key")?))
    }
}

/// A cipher key and a MAC key expanded together with HKDF-SHA256.
pub struct DerivedSecrets {
    pub cipher_key: CipherKey,
    pub mac_key: MacKey,
}

impl DerivedSecrets {
    /// Expands `input` under `salt` and `info` into 64 bytes of key material.
    pub fn kdf(input: &[u8], salt: &[u8], info: &[u8]) -> Result<Self, Error> {
        Self::expand(Hkdf::<Sha256>::new(Some(salt), input), info)
    }

    /// Expands `input` under `info` with an all-zero salt.
    pub fn kdf_without_salt(input: &[u8], info: &[u8]) -> Result<Self, Error> {
        Self::expand(Hkdf::<Sha256>::new(None, input), info)
    }

    fn expand(hkdf: Hkdf<Sha256>, info: &[u8]) -> Result<Self, Error> {
        let mut okm = [0u8; 64];
        hkdf.expand(info, &mut okm)
            .map_err(|err| Error::Crypto(format!("HKDF expansion failed: {err:?}")))?;

        let mut cipher_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        cipher_key.copy_from_slice(&okm[..32]);
        mac_key.copy_from_slice(&okm[32..]);
        okm.zeroize();

        Ok(Self {
            cipher_key: CipherKey::new(cipher_key),
            mac_key: MacKey::new(mac_key),
        })
    }
}
