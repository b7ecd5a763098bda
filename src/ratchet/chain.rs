use crate::cbor::{self, Decode, Encode};
use crate::derived::{DerivedSecrets, MacKey};
use crate::ratchet::MessageKeys;
use crate::{CipherMessage, DecodeError, DecryptError, Envelope, Error, KeyPair, PublicKey};
use ciborium::Value;
use std::collections::VecDeque;
use tracing::debug;

/// Symmetric ratchet of one chain.
#[derive(Clone)]
pub struct ChainKey {
    key: MacKey,
    idx: u32,
}

impl ChainKey {
    pub(crate) fn from_mac_key(key: MacKey, idx: u32) -> Self {
        Self { key, idx }
    }

    /// Index of the next message on this chain.
    pub fn index(&self) -> u32 {
        self.idx
    }

    /// Advances the chain by one step.
    pub fn next(&self) -> Result<Self, Error> {
        let idx = self
            .idx
            .checked_add(1)
            .ok_or_else(|| Error::Internal("Chain index overflow".to_string()))?;
        let key = MacKey::new(*self.key.sign(&[0x01])?.as_bytes());

        Ok(Self { key, idx })
    }

    /// Derives the keys of the message at the current index.
    pub fn message_keys(&self) -> Result<MessageKeys, Error> {
        let base = self.key.sign(&[0x00])?;
        let DerivedSecrets {
            cipher_key,
            mac_key,
        } = DerivedSecrets::kdf_without_salt(base.as_bytes(), b"hash_ratchet")?;

        Ok(MessageKeys {
            cipher_key,
            mac_key,
            counter: self.idx,
        })
    }
}

impl Encode for ChainKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, self.key.encode()), (1, cbor::uint(self.idx))])
    }
}

impl Decode for ChainKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut key = None;
        let mut idx = None;
        for (field, value) in cbor::entries(value, "ChainKey")? {
            match field {
                0 => key = Some(MacKey::decode(value)?),
                1 => idx = Some(cbor::to_uint(value, "ChainKey.idx")?),
                _ => {}
            }
        }

        Ok(Self {
            key: cbor::required(key, "ChainKey.key")?,
            idx: cbor::required(idx, "ChainKey.idx")?,
        })
    }
}

/// Our current sending chain and the ratchet key pair it was derived with.
#[derive(Clone)]
pub struct SendChain {
    pub(crate) chain_key: ChainKey,
    pub(crate) ratchet_key: KeyPair,
}

impl SendChain {
    pub(crate) fn new(chain_key: ChainKey, ratchet_key: KeyPair) -> Self {
        Self {
            chain_key,
            ratchet_key,
        }
    }
}

impl Encode for SendChain {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, self.chain_key.encode()),
            (1, self.ratchet_key.encode()),
        ])
    }
}

impl Decode for SendChain {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut chain_key = None;
        let mut ratchet_key = None;
        for (key, value) in cbor::entries(value, "SendChain")? {
            match key {
                0 => chain_key = Some(ChainKey::decode(value)?),
                1 => ratchet_key = Some(KeyPair::decode(value)?),
                _ => {}
            }
        }

        Ok(Self::new(
            cbor::required(chain_key, "SendChain.chain_key")?,
            cbor::required(ratchet_key, "SendChain.ratchet_key")?,
        ))
    }
}

/// A receiving chain for one of the peer's ratchet keys.
///
/// Keys for messages skipped over by a later message are buffered, oldest
/// first, so that the skipped messages can still be decrypted when they
/// arrive. The buffer holds at most `max_counter_gap` keys.
#[derive(Clone)]
pub struct RecvChain {
    pub(crate) chain_key: ChainKey,
    pub(crate) ratchet_key: PublicKey,
    pub(crate) message_keys: VecDeque<MessageKeys>,
}

impl RecvChain {
    pub(crate) fn new(chain_key: ChainKey, ratchet_key: PublicKey) -> Self {
        Self {
            chain_key,
            ratchet_key,
            message_keys: VecDeque::new(),
        }
    }

    /// Decrypts a message older than the chain index with a buffered key.
    ///
    /// The buffered key is consumed even if the MAC does not verify.
    pub(crate) fn try_message_keys(
        &mut self,
        envelope: &Envelope,
        message: &CipherMessage,
    ) -> Result<Vec<u8>, Error> {
        if self
            .message_keys
            .front()
            .is_some_and(|keys| keys.counter > message.counter)
        {
            return Err(DecryptError::OutdatedMessage.into());
        }

        let position = self
            .message_keys
            .iter()
            .position(|keys| keys.counter == message.counter)
            .ok_or(DecryptError::DuplicateMessage)?;
        let keys = self
            .message_keys
            .remove(position)
            .ok_or_else(|| Error::Internal("Buffered message keys vanished".to_string()))?;

        if !envelope.verify(&keys.mac_key)? {
            return Err(DecryptError::InvalidSignature.into());
        }

        keys.decrypt(&message.cipher_text)
    }

    /// Derives the keys between the chain index and `message.counter`
    /// without touching the chain.
    ///
    /// Returns the chain key at `message.counter`, the keys for that
    /// message, and the keys of every skipped message in counter order.
    pub(crate) fn stage_message_keys(
        &self,
        message: &CipherMessage,
        max_counter_gap: u32,
    ) -> Result<(ChainKey, MessageKeys, Vec<MessageKeys>), Error> {
        let index = self.chain_key.idx;
        let gap = message.counter.saturating_sub(index);
        if gap > max_counter_gap {
            return Err(DecryptError::TooDistantFuture {
                counter: message.counter,
                index,
            }
            .into());
        }

        let mut skipped = Vec::with_capacity(gap_len(gap));
        let mut chain_key = self.chain_key.clone();
        for _ in 0..gap {
            skipped.push(chain_key.message_keys()?);
            chain_key = chain_key.next()?;
        }
        let keys = chain_key.message_keys()?;

        Ok((chain_key, keys, skipped))
    }

    /// Appends staged skipped keys, evicting the oldest buffered keys to stay
    /// within `max_counter_gap`.
    pub(crate) fn commit_message_keys(
        &mut self,
        keys: Vec<MessageKeys>,
        max_counter_gap: u32,
    ) -> Result<(), Error> {
        let capacity = gap_len(max_counter_gap);
        if keys.len() > capacity {
            return Err(Error::Internal(format!(
                "Cannot buffer {} skipped message keys, the limit is {capacity}",
                keys.len()
            )));
        }

        let excess = (self.message_keys.len() + keys.len()).saturating_sub(capacity);
        if excess > 0 {
            debug!(evicted = excess, "Evicting oldest skipped message keys");
            self.message_keys.drain(..excess);
        }

        if !keys.is_empty() {
            debug!(skipped = keys.len(), "Buffering skipped message keys");
        }
        self.message_keys.extend(keys);

        Ok(())
    }
}

fn gap_len(gap: u32) -> usize {
    usize::try_from(gap).unwrap_or(usize::MAX)
}

impl Encode for RecvChain {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, self.chain_key.encode()),
            (1, self.ratchet_key.encode()),
            (
                2,
                Value::Array(self.message_keys.iter().map(Encode::encode).collect()),
            ),
        ])
    }
}

impl Decode for RecvChain {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut chain_key = None;
        let mut ratchet_key = None;
        let mut message_keys = None;
        for (key, value) in cbor::entries(value, "RecvChain")? {
            match key {
                0 => chain_key = Some(ChainKey::decode(value)?),
                1 => ratchet_key = Some(PublicKey::decode(value)?),
                2 => {
                    message_keys = Some(
                        cbor::to_array(value, "RecvChain.message_keys")?
                            .into_iter()
                            .map(MessageKeys::decode)
                            .collect::<Result<VecDeque<_>, _>>()?,
                    )
                }
                _ => {}
            }
        }

        Ok(Self {
            chain_key: cbor::required(chain_key, "RecvChain.chain_key")?,
            ratchet_key: cbor::required(ratchet_key, "RecvChain.ratchet_key")?,
            message_keys: cbor::required(message_keys, "RecvChain.message_keys")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_key() -> ChainKey {
        ChainKey::from_mac_key(MacKey::new([5u8; 32]), 0)
    }

    #[test]
    fn test_chain_advances_deterministically() {
        let chain_key = chain_key();
        let first = chain_key.next().unwrap();
        let second = chain_key.next().unwrap();

        assert_eq!(first.index(), 1);
        assert_eq!(first.key.sign(b"x").unwrap(), second.key.sign(b"x").unwrap());
        assert_ne!(
            first.key.sign(b"x").unwrap(),
            chain_key.key.sign(b"x").unwrap()
        );
    }

    #[test]
    fn test_message_keys_do_not_advance_the_chain() {
        let chain_key = chain_key();
        let keys = chain_key.message_keys().unwrap();

        assert_eq!(keys.counter, 0);
        assert_eq!(chain_key.index(), 0);

        let next_keys = chain_key.next().unwrap().message_keys().unwrap();
        assert_eq!(next_keys.counter, 1);
        assert_ne!(
            keys.cipher_key.as_bytes(),
            next_keys.cipher_key.as_bytes()
        );
    }

    #[test]
    fn test_index_overflow_is_an_error() {
        let chain_key = ChainKey::from_mac_key(MacKey::new([5u8; 32]), u32::MAX);
        assert!(matches!(chain_key.next(), Err(Error::Internal(_))));
    }

    #[test]
    fn test_commit_evicts_oldest_keys() {
        let mut chain = RecvChain::new(chain_key(), KeyPair::new().unwrap().public_key);
        let mut cursor = chain_key();
        let mut keys = Vec::new();
        for _ in 0..5 {
            keys.push(cursor.message_keys().unwrap());
            cursor = cursor.next().unwrap();
        }

        chain.commit_message_keys(keys[..3].to_vec(), 4).unwrap();
        chain.commit_message_keys(keys[3..].to_vec(), 4).unwrap();

        let counters: Vec<u32> = chain.message_keys.iter().map(|keys| keys.counter).collect();
        assert_eq!(counters, vec![1, 2, 3, 4]);

        assert!(matches!(
            chain.commit_message_keys(keys, 4),
            Err(Error::Internal(_))
        ));
    }
}
