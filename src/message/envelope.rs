use crate::cbor::{self, Decode, Encode};
use crate::derived::{Mac, MacKey};
use crate::{DecodeError, Error, Message};
use ciborium::Value;

const ENVELOPE_VERSION: u8 = 1;

/// The unit exchanged between peers: a message and the MAC over its
/// serialised form.
///
/// The serialised message bytes are kept alongside the decoded message, so
/// the MAC is checked against exactly the bytes that were received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub(crate) version: u8,
    pub(crate) mac: Mac,
    pub(crate) message: Message,
    pub(crate) message_enc: Vec<u8>,
}

impl Envelope {
    pub(crate) fn new(mac_key: &MacKey, message: Message) -> Result<Self, Error> {
        let message_enc = message.serialise()?;
        let mac = mac_key.sign(&message_enc)?;

        Ok(Self {
            version: ENVELOPE_VERSION,
            mac,
            message,
            message_enc,
        })
    }

    pub(crate) fn verify(&self, mac_key: &MacKey) -> Result<bool, Error> {
        mac_key.verify(&self.mac, &self.message_enc)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn mac(&self) -> &Mac {
        &self.mac
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        cbor::serialise(self)
    }

    pub fn deserialise(bytes: &[u8]) -> Result<Self, Error> {
        cbor::deserialise(bytes)
    }
}

impl Encode for Envelope {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, cbor::uint(self.version)),
            (1, cbor::bytes(self.mac.as_bytes())),
            (2, cbor::bytes(&self.message_enc)),
        ])
    }
}

impl Decode for Envelope {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut version = None;
        let mut mac = None;
        let mut message_enc = None;
        for (key, value) in cbor::entries(value, "Envelope")? {
            match key {
                0 => version = Some(cbor::to_uint(value, "Envelope.version")?),
                1 => mac = Some(cbor::to_fixed::<32>(value, "Envelope.mac")?),
                2 => message_enc = Some(cbor::to_bytes(value, "Envelope.message")?),
                _ => {}
            }
        }

        let version = cbor::required(version, "Envelope.version")?;
        if version != ENVELOPE_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let mac = Mac::from_bytes(cbor::required(mac, "Envelope.mac")?);
        let message_enc = cbor::required(message_enc, "Envelope.message")?;

        Ok(Self {
            version,
            mac,
            message: Message::from_bytes(&message_enc)?,
            message_enc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CipherMessage, KeyPair, SessionTag};

    fn envelope(mac_key: &MacKey) -> Envelope {
        let message = Message::Cipher(CipherMessage {
            session_tag: SessionTag::new().unwrap(),
            counter: 0,
            prev_counter: 0,
            ratchet_key: KeyPair::new().unwrap().public_key,
            cipher_text: vec![1, 2, 3],
        });
        Envelope::new(mac_key, message).unwrap()
    }

    #[test]
    fn test_serialisation_preserves_mac() {
        let mac_key = MacKey::new([3u8; 32]);
        let envelope = envelope(&mac_key);

        let restored = Envelope::deserialise(&envelope.serialise().unwrap()).unwrap();
        assert_eq!(restored, envelope);
        assert!(restored.verify(&mac_key).unwrap());
        assert!(!restored.verify(&MacKey::new([4u8; 32])).unwrap());
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let envelope = envelope(&MacKey::new([3u8; 32]));
        let value = cbor::map(vec![
            (0, cbor::uint(2u8)),
            (1, cbor::bytes(envelope.mac.as_bytes())),
            (2, cbor::bytes(&envelope.message_enc)),
        ]);

        assert_eq!(
            Envelope::decode(value),
            Err(DecodeError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_tampered_message_fails_verification() {
        let mac_key = MacKey::new([3u8; 32]);
        let mut envelope = envelope(&mac_key);
        let last = envelope.message_enc.len() - 1;
        envelope.message_enc[last] ^= 0x01;

        assert!(!envelope.verify(&mac_key).unwrap());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Envelope::deserialise(&[]).is_err());
        assert!(Envelope::deserialise(&[0xFF, 0x00, 0x13]).is_err());
        assert!(Envelope::deserialise(&cbor::to_vec(&cbor::uint(1u8)).unwrap()).is_err());
    }
}
