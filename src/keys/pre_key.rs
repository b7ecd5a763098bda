use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error, InputError, KeyPair};
use ciborium::Value;

const PRE_KEY_VERSION: u8 = 1;

/// An ephemeral key published ahead of time so that peers can open a
/// session while this party is offline.
///
/// Ordinary pre-keys are deleted from the store after their first use. The
/// pre-key with ID [`PreKey::MAX_PREKEY_ID`] is the last-resort key and is
/// never deleted.
#[derive(Clone)]
pub struct PreKey {
    /// Format version of the pre-key.
    pub version: u8,
    /// Identifier the peer quotes back in its pre-key message.
    pub key_id: u16,
    /// The ephemeral key pair.
    pub key_pair: KeyPair,
}

impl PreKey {
    /// Highest valid ID, reserved for the last-resort pre-key.
    pub const MAX_PREKEY_ID: u16 = 0xFFFF;

    /// Generates a pre-key with the given ID.
    pub fn new(key_id: u16) -> Result<Self, Error> {
        Ok(Self {
            version: PRE_KEY_VERSION,
            key_id,
            key_pair: KeyPair::new()?,
        })
    }

    /// Generates a pre-key from an untyped ID, rejecting IDs outside `0..=0xFFFF`.
    pub fn try_new(key_id: i64) -> Result<Self, Error> {
        Self::new(validate_pre_key_id(key_id)?)
    }

    /// Generates the last-resort pre-key.
    pub fn last_resort() -> Result<Self, Error> {
        Self::new(Self::MAX_PREKEY_ID)
    }

    /// Whether this is the last-resort pre-key.
    pub fn is_last_resort(&self) -> bool {
        self.key_id == Self::MAX_PREKEY_ID
    }

    /// Generates `size` consecutive pre-keys starting at `start`.
    ///
    /// IDs wrap modulo `0xFFFF`, so a batch never contains the last-resort ID.
    pub fn generate_prekeys(start: i64, size: i64) -> Result<Vec<Self>, Error> {
        let start = u32::from(validate_pre_key_id(start)?);
        let size = u32::from(validate_pre_key_id(size)?);

        (0..size)
            .map(|offset| {
                let key_id = (start + offset) % u32::from(Self::MAX_PREKEY_ID);
                let key_id = u16::try_from(key_id)
                    .map_err(|_| Error::Internal("pre-key ID exceeds u16".to_string()))?;
                Self::new(key_id)
            })
            .collect()
    }

    /// Encodes the pre-key, secret included, for storage.
    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        cbor::serialise(self)
    }

    /// Decodes a pre-key previously produced by [`serialise`](Self::serialise).
    pub fn deserialise(bytes: &[u8]) -> Result<Self, Error> {
        cbor::deserialise(bytes)
    }
}

/// Checks that `pre_key_id` is a valid pre-key ID.
pub fn validate_pre_key_id(pre_key_id: i64) -> Result<u16, InputError> {
    u16::try_from(pre_key_id).map_err(|_| {
        InputError::RangeError(format!(
            "PreKey ID ({pre_key_id}) must be between or equal to 0 and {}.",
            PreKey::MAX_PREKEY_ID
        ))
    })
}

impl Encode for PreKey {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, cbor::uint(self.version)),
            (1, cbor::uint(self.key_id)),
            (2, self.key_pair.encode()),
        ])
    }
}

impl Decode for PreKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut version = None;
        let mut key_id = None;
        let mut key_pair = None;
        for (key, value) in cbor::entries(value, "PreKey")? {
            match key {
                0 => version = Some(cbor::to_uint(value, "PreKey.version")?),
                1 => key_id = Some(cbor::to_uint(value, "PreKey.key_id")?),
                2 => key_pair = Some(KeyPair::decode(value)?),
                _ => {}
            }
        }

        Ok(Self {
            version: cbor::required(version, "PreKey.version")?,
            key_id: cbor::required(key_id, "PreKey.key_id")?,
            key_pair: cbor::required(key_pair, "PreKey.key_pair")?,
        })
    }
}
