use crate::cbor;
use crate::{DecodeError, Error};
use ciborium::Value;
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::fmt;

/// Random 16-byte identifier of one session state.
///
/// Both parties of a handshake share the tag; it travels in every cipher
/// message so the receiver can pick the matching state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionTag([u8; 16]);

impl SessionTag {
    /// Generates a fresh random tag.
    pub fn new() -> Result<Self, Error> {
        let mut tag = [0u8; 16];
        OsRng.try_fill_bytes(&mut tag).map_err(|_| Error::Random)?;
        Ok(Self(tag))
    }

    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub(crate) fn encode(&self) -> Value {
        cbor::bytes(&self.0)
    }

    pub(crate) fn decode(value: Value, field: &'static str) -> Result<Self, DecodeError> {
        cbor::to_fixed::<16>(value, field).map(Self)
    }
}

impl From<[u8; 16]> for SessionTag {
    fn from(tag: [u8; 16]) -> Self {
        Self(tag)
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_random() {
        let first = SessionTag::new().unwrap();
        let second = SessionTag::new().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_display_is_hex() {
        let tag = SessionTag::from([0xAB; 16]);
        assert_eq!(tag.to_string(), "ab".repeat(16));
    }

    #[test]
    fn test_tag_length_is_validated() {
        assert_eq!(
            SessionTag::decode(cbor::bytes(&[0u8; 15]), "tag"),
            Err(DecodeError::InvalidArrayLen {
                field: "tag",
                expected: 16,
                actual: 15
            })
        );

        let tag = SessionTag::new().unwrap();
        assert_eq!(SessionTag::decode(tag.encode(), "tag").unwrap(), tag);
    }
}
