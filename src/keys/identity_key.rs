use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error, KeyPair, PublicKey, SecretKey};
use ciborium::Value;

const IDENTITY_KEY_PAIR_VERSION: u8 = 1;

/// The long-term public identity of a party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityKey {
    /// The underlying public key.
    pub public_key: PublicKey,
}

impl IdentityKey {
    /// Wraps a public key as an identity.
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    /// Hex fingerprint of the identity, suitable for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint()
    }
}

impl Encode for IdentityKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, self.public_key.encode())])
    }
}

impl Decode for IdentityKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut public_key = None;
        for (key, value) in cbor::entries(value, "IdentityKey")? {
            if key == 0 {
                public_key = Some(PublicKey::decode(value)?);
            }
        }

        Ok(Self::new(cbor::required(public_key, "IdentityKey.public_key")?))
    }
}

/// Long-term identity key pair of the local device.
///
/// Persist it once with [`serialise`](Self::serialise); every session of the
/// device borrows it.
#[derive(Clone)]
pub struct IdentityKeyPair {
    /// Format version of the key pair.
    pub version: u8,
    /// The long-term secret.
    pub secret_key: SecretKey,
    /// The public identity published to peers.
    pub public_key: IdentityKey,
}

impl IdentityKeyPair {
    /// Generates a fresh identity.
    pub fn new() -> Result<Self, Error> {
        let KeyPair {
            secret_key,
            public_key,
        } = KeyPair::new()?;

        Ok(Self {
            version: IDENTITY_KEY_PAIR_VERSION,
            secret_key,
            public_key: IdentityKey::new(public_key),
        })
    }

    /// Encodes the key pair, secret included, for storage.
    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        cbor::serialise(self)
    }

    /// Decodes a key pair previously produced by [`serialise`](Self::serialise).
    pub fn deserialise(bytes: &[u8]) -> Result<Self, Error> {
        cbor::deserialise(bytes)
    }
}

impl Encode for IdentityKeyPair {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, cbor::uint(self.version)),
            (1, self.secret_key.encode()),
            (2, self.public_key.encode()),
        ])
    }
}

impl Decode for IdentityKeyPair {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut version = None;
        let mut secret_key = None;
        let mut public_key = None;
        for (key, value) in cbor::entries(value, "IdentityKeyPair")? {
            match key {
                0 => version = Some(cbor::to_uint(value, "IdentityKeyPair.version")?),
                1 => secret_key = Some(SecretKey::decode(value)?),
                2 => public_key = Some(IdentityKey::decode(value)?),
                _ => {}
            }
        }

        let version = cbor::required(version, "IdentityKeyPair.version")?;
        let secret_key = cbor::required(secret_key, "IdentityKeyPair.secret_key")?;
        let public_key = cbor::required(public_key, "IdentityKeyPair.public_key")?;

        if secret_key.public_key() != public_key.public_key {
            return Err(DecodeError::InvalidKey(
                "identity does not match its secret key",
            ));
        }

        Ok(Self {
            version,
            secret_key,
            public_key,
        })
    }
}
