use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, IdentityKey, PublicKey, SessionTag};
use ciborium::Value;

/// An encrypted message of an established session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CipherMessage {
    /// Session state the message belongs to.
    pub session_tag: SessionTag,
    /// Index of the message in the sender's current chain.
    pub counter: u32,
    /// Length of the sender's previous chain.
    pub prev_counter: u32,
    /// Sender's current ratchet public key.
    pub ratchet_key: PublicKey,
    /// AEAD ciphertext of the payload.
    pub cipher_text: Vec<u8>,
}

impl Encode for CipherMessage {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, self.session_tag.encode()),
            (1, cbor::uint(self.counter)),
            (2, cbor::uint(self.prev_counter)),
            (3, self.ratchet_key.encode()),
            (4, cbor::bytes(&self.cipher_text)),
        ])
    }
}

impl Decode for CipherMessage {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut session_tag = None;
        let mut counter = None;
        let mut prev_counter = None;
        let mut ratchet_key = None;
        let mut cipher_text = None;
        for (key, value) in cbor::entries(value, "CipherMessage")? {
            match key {
                0 => session_tag = Some(SessionTag::decode(value, "CipherMessage.session_tag")?),
                1 => counter = Some(cbor::to_uint(value, "CipherMessage.counter")?),
                2 => prev_counter = Some(cbor::to_uint(value, "CipherMessage.prev_counter")?),
                3 => ratchet_key = Some(PublicKey::decode(value)?),
                4 => cipher_text = Some(cbor::to_bytes(value, "CipherMessage.cipher_text")?),
                _ => {}
            }
        }

        Ok(Self {
            session_tag: cbor::required(session_tag, "CipherMessage.session_tag")?,
            counter: cbor::required(counter, "CipherMessage.counter")?,
            prev_counter: cbor::required(prev_counter, "CipherMessage.prev_counter")?,
            ratchet_key: cbor::required(ratchet_key, "CipherMessage.ratchet_key")?,
            cipher_text: cbor::required(cipher_text, "CipherMessage.cipher_text")?,
        })
    }
}

/// The first messages of an initiator: a cipher message together with the
/// handshake inputs the responder needs to derive the same session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyMessage {
    /// ID of the responder's pre-key the handshake used.
    pub prekey_id: u16,
    /// Initiator's ephemeral handshake key.
    pub base_key: PublicKey,
    /// Initiator's identity.
    pub identity_key: IdentityKey,
    /// The wrapped cipher message.
    pub message: CipherMessage,
}

impl Encode for PreKeyMessage {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, cbor::uint(self.prekey_id)),
            (1, self.base_key.encode()),
            (2, self.identity_key.encode()),
            (3, self.message.encode()),
        ])
    }
}

impl Decode for PreKeyMessage {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut prekey_id = None;
        let mut base_key = None;
        let mut identity_key = None;
        let mut message = None;
        for (key, value) in cbor::entries(value, "PreKeyMessage")? {
            match key {
                0 => prekey_id = Some(cbor::to_uint(value, "PreKeyMessage.prekey_id")?),
                1 => base_key = Some(PublicKey::decode(value)?),
                2 => identity_key = Some(IdentityKey::decode(value)?),
                3 => message = Some(CipherMessage::decode(value)?),
                _ => {}
            }
        }

        Ok(Self {
            prekey_id: cbor::required(prekey_id, "PreKeyMessage.prekey_id")?,
            base_key: cbor::required(base_key, "PreKeyMessage.base_key")?,
            identity_key: cbor::required(identity_key, "PreKeyMessage.identity_key")?,
            message: cbor::required(message, "PreKeyMessage.message")?,
        })
    }
}
