mod cipher_message;
mod envelope;
mod session_tag;

use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error};
pub use cipher_message::{CipherMessage, PreKeyMessage};
pub use envelope::Envelope;
pub use session_tag::SessionTag;

const CIPHER_MESSAGE_TYPE: u8 = 1;
const PRE_KEY_MESSAGE_TYPE: u8 = 2;

/// A message carried inside an [`Envelope`].
///
/// On the wire the CBOR map is preceded by a one-byte type: `1` for a
/// cipher message, `2` for a pre-key message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Cipher(CipherMessage),
    PreKey(PreKeyMessage),
}

impl Message {
    /// The cipher message, unwrapping a pre-key message if needed.
    pub fn cipher_message(&self) -> &CipherMessage {
        match self {
            Self::Cipher(message) => message,
            Self::PreKey(message) => &message.message,
        }
    }

    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        let (message_type, value) = match self {
            Self::Cipher(message) => (CIPHER_MESSAGE_TYPE, message.encode()),
            Self::PreKey(message) => (PRE_KEY_MESSAGE_TYPE, message.encode()),
        };

        let mut bytes = vec![message_type];
        bytes.extend(cbor::to_vec(&value)?);
        Ok(bytes)
    }

    pub fn deserialise(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self::from_bytes(bytes)?)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (&message_type, body) = bytes
            .split_first()
            .ok_or(DecodeError::MissingField("Message.type"))?;
        let value = cbor::from_slice(body)?;

        match message_type {
            CIPHER_MESSAGE_TYPE => CipherMessage::decode(value).map(Self::Cipher),
            PRE_KEY_MESSAGE_TYPE => PreKeyMessage::decode(value).map(Self::PreKey),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}
