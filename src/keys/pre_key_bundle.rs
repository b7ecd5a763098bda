use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error, IdentityKey, IdentityKeyPair, PreKey, PublicKey};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use ciborium::Value;
use serde::{Deserialize, Serialize};

const PRE_KEY_BUNDLE_VERSION: u8 = 1;

/// Outcome of checking a bundle's signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreKeyAuth {
    /// The signature does not match the identity key.
    Invalid,
    /// The signature matches the identity key.
    Valid,
    /// The bundle is unsigned; trust is left to the caller.
    Unknown,
}

/// The public material a peer needs to open a session with us.
///
/// A bundle pairs one pre-key's public half with our identity and,
/// optionally, a signature of that pre-key made with our identity key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyBundle {
    /// Format version of the bundle.
    pub version: u8,
    /// ID of the pre-key this bundle publishes.
    pub prekey_id: u16,
    /// Public half of the pre-key.
    pub public_key: PublicKey,
    /// Identity of the bundle's owner.
    pub identity_key: IdentityKey,
    /// Ed25519 signature of the pre-key's Edwards bytes, if signed.
    pub signature: Option<[u8; 64]>,
}

/// JSON convenience form of a bundle: `{"id": <prekey_id>, "key": <base64url>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialisedPreKeyBundle {
    /// ID of the published pre-key.
    pub id: u16,
    /// URL-safe base64 of the serialised bundle.
    pub key: String,
}

impl PreKeyBundle {
    /// Builds an unsigned bundle.
    pub fn new(identity_key: IdentityKey, prekey: &PreKey) -> Self {
        Self {
            version: PRE_KEY_BUNDLE_VERSION,
            prekey_id: prekey.key_id,
            public_key: prekey.key_pair.public_key,
            identity_key,
            signature: None,
        }
    }

    /// Builds a bundle whose pre-key is signed with the identity key.
    pub fn signed(identity_pair: &IdentityKeyPair, prekey: &PreKey) -> Self {
        let public_key = prekey.key_pair.public_key;
        let signature = identity_pair.secret_key.sign(public_key.edward_bytes());

        Self {
            signature: Some(signature),
            ..Self::new(identity_pair.public_key, prekey)
        }
    }

    /// Checks the signature against the bundle's identity key.
    pub fn verify(&self) -> PreKeyAuth {
        match &self.signature {
            None => PreKeyAuth::Unknown,
            Some(signature) => {
                if self
                    .identity_key
                    .public_key
                    .verify(signature, self.public_key.edward_bytes())
                {
                    PreKeyAuth::Valid
                } else {
                    PreKeyAuth::Invalid
                }
            }
        }
    }

    /// Encodes the bundle into its canonical wire form.
    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        cbor::serialise(self)
    }

    /// Decodes a bundle from its canonical wire form.
    pub fn deserialise(bytes: &[u8]) -> Result<Self, Error> {
        cbor::deserialise(bytes)
    }

    /// Returns the JSON convenience form.
    pub fn serialised_json(&self) -> Result<SerialisedPreKeyBundle, Error> {
        Ok(SerialisedPreKeyBundle {
            id: self.prekey_id,
            key: URL_SAFE.encode(self.serialise()?),
        })
    }

    /// Decodes the JSON convenience form, checking that its ID agrees with
    /// the embedded bundle.
    pub fn from_serialised_json(json: &SerialisedPreKeyBundle) -> Result<Self, Error> {
        let bytes = URL_SAFE
            .decode(&json.key)
            .map_err(|err| DecodeError::Cbor(format!("Invalid base64 bundle: {err}")))?;
        let bundle = Self::deserialise(&bytes)?;

        if bundle.prekey_id != json.id {
            return Err(DecodeError::InvalidKey("bundle ID does not match its JSON ID").into());
        }

        Ok(bundle)
    }
}

impl Encode for PreKeyBundle {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, cbor::uint(self.version)),
            (1, cbor::uint(self.prekey_id)),
            (2, self.public_key.encode()),
            (3, self.identity_key.encode()),
            (
                4,
                cbor::optional(self.signature.as_ref(), |signature| cbor::bytes(signature)),
            ),
        ])
    }
}

impl Decode for PreKeyBundle {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut version = None;
        let mut prekey_id = None;
        let mut public_key = None;
        let mut identity_key = None;
        let mut signature = None;
        for (key, value) in cbor::entries(value, "PreKeyBundle")? {
            match key {
                0 => version = Some(cbor::to_uint(value, "PreKeyBundle.version")?),
                1 => prekey_id = Some(cbor::to_uint(value, "PreKeyBundle.prekey_id")?),
                2 => public_key = Some(PublicKey::decode(value)?),
                3 => identity_key = Some(IdentityKey::decode(value)?),
                4 => {
                    signature = cbor::to_optional(value, |value| {
                        cbor::to_fixed::<64>(value, "PreKeyBundle.signature")
                    })?
                }
                _ => {}
            }
        }

        Ok(Self {
            version: cbor::required(version, "PreKeyBundle.version")?,
            prekey_id: cbor::required(prekey_id, "PreKeyBundle.prekey_id")?,
            public_key: cbor::required(public_key, "PreKeyBundle.public_key")?,
            identity_key: cbor::required(identity_key, "PreKeyBundle.identity_key")?,
            signature,
        })
    }
}
