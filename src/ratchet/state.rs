use crate::cbor::{self, Decode, Encode};
use crate::derived::DerivedSecrets;
use crate::ratchet::{ChainKey, RecvChain, RootKey, SendChain};
use crate::{
    CipherMessage, DecodeError, DecryptError, Envelope, Error, IdentityKey, IdentityKeyPair,
    KeyPair, Message, PreKeyBundle, PreKeyMessage, PublicKey, SessionConfig, SessionTag,
};
use ciborium::Value;
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Ratchet state of one session tag.
///
/// Receive chains are ordered newest first. The send chain belongs to our
/// most recent ratchet key pair, and `prev_counter` is the length of the send
/// chain it replaced.
#[derive(Clone)]
pub struct SessionState {
    pub(crate) recv_chains: VecDeque<RecvChain>,
    pub(crate) send_chain: SendChain,
    pub(crate) root_key: RootKey,
    pub(crate) prev_counter: u32,
}

/// Derives the root and first chain key from the three handshake agreements.
fn handshake(secrets: [[u8; 32]; 3]) -> Result<(RootKey, ChainKey), Error> {
    let mut master_key = Zeroizing::new(Vec::with_capacity(96));
    for mut secret in secrets {
        master_key.extend_from_slice(&secret);
        secret.zeroize();
    }

    let DerivedSecrets {
        cipher_key,
        mac_key,
    } = DerivedSecrets::kdf_without_salt(&master_key, b"handshake")?;

    Ok((
        RootKey::from_cipher_key(cipher_key),
        ChainKey::from_mac_key(mac_key, 0),
    ))
}

impl SessionState {
    /// Builds the initiator's state from our identity, our ephemeral base key
    /// and the responder's bundle.
    pub(crate) fn init_as_alice(
        alice_identity: &IdentityKeyPair,
        alice_base: &KeyPair,
        bob: &PreKeyBundle,
    ) -> Result<Self, Error> {
        let (root_key, chain_key) = handshake([
            alice_identity.secret_key.shared_secret(&bob.public_key),
            alice_base
                .secret_key
                .shared_secret(&bob.identity_key.public_key),
            alice_base.secret_key.shared_secret(&bob.public_key),
        ])?;

        let mut recv_chains = VecDeque::new();
        recv_chains.push_front(RecvChain::new(chain_key, bob.public_key));

        let send_ratchet = KeyPair::new()?;
        let (root_key, send_chain_key) = root_key.dh_ratchet(&send_ratchet, &bob.public_key)?;

        Ok(Self {
            recv_chains,
            send_chain: SendChain::new(send_chain_key, send_ratchet),
            root_key,
            prev_counter: 0,
        })
    }

    /// Builds the responder's state from our identity, the pre-key the
    /// initiator chose, and the initiator's identity and base key.
    pub(crate) fn init_as_bob(
        bob_identity: &IdentityKeyPair,
        bob_prekey: &KeyPair,
        alice_identity: &IdentityKey,
        alice_base: &PublicKey,
    ) -> Result<Self, Error> {
        let (root_key, chain_key) = handshake([
            bob_prekey
                .secret_key
                .shared_secret(&alice_identity.public_key),
            bob_identity.secret_key.shared_secret(alice_base),
            bob_prekey.secret_key.shared_secret(alice_base),
        ])?;

        Ok(Self {
            recv_chains: VecDeque::new(),
            send_chain: SendChain::new(chain_key, bob_prekey.clone()),
            root_key,
            prev_counter: 0,
        })
    }

    /// Performs a DH ratchet turn on observing a new ratchet key of the peer.
    fn ratchet(&mut self, ratchet_key: PublicKey, config: &SessionConfig) -> Result<(), Error> {
        let new_ratchet = KeyPair::new()?;

        let (recv_root_key, recv_chain_key) = self
            .root_key
            .dh_ratchet(&self.send_chain.ratchet_key, &ratchet_key)?;
        let (send_root_key, send_chain_key) =
            recv_root_key.dh_ratchet(&new_ratchet, &ratchet_key)?;

        self.recv_chains
            .push_front(RecvChain::new(recv_chain_key, ratchet_key));
        self.recv_chains.truncate(config.max_recv_chains);

        self.prev_counter = self.send_chain.chain_key.index();
        self.send_chain = SendChain::new(send_chain_key, new_ratchet);
        self.root_key = send_root_key;

        debug!(
            prev_counter = self.prev_counter,
            recv_chains = self.recv_chains.len(),
            "Ratchet turned"
        );

        Ok(())
    }

    /// Encrypts `plaintext` on the send chain and advances it.
    ///
    /// With `pending_prekey` set, the message is wrapped in a pre-key message
    /// so the peer can complete the handshake.
    pub(crate) fn encrypt(
        &mut self,
        identity_key: &IdentityKey,
        pending_prekey: Option<(u16, PublicKey)>,
        session_tag: SessionTag,
        plaintext: &[u8],
    ) -> Result<Envelope, Error> {
        let chain_key = &self.send_chain.chain_key;
        let keys = chain_key.message_keys()?;

        let message = CipherMessage {
            session_tag,
            counter: chain_key.index(),
            prev_counter: self.prev_counter,
            ratchet_key: self.send_chain.ratchet_key.public_key,
            cipher_text: keys.encrypt(plaintext)?,
        };
        let message = match pending_prekey {
            None => Message::Cipher(message),
            Some((prekey_id, base_key)) => Message::PreKey(PreKeyMessage {
                prekey_id,
                base_key,
                identity_key: *identity_key,
                message,
            }),
        };

        let envelope = Envelope::new(&keys.mac_key, message)?;
        self.send_chain.chain_key = chain_key.next()?;

        Ok(envelope)
    }

    /// Decrypts `message`, which arrived in `envelope`.
    ///
    /// The state may be partially updated when this fails; callers decrypt
    /// on a copy and keep it only on success.
    pub(crate) fn decrypt(
        &mut self,
        envelope: &Envelope,
        message: &CipherMessage,
        config: &SessionConfig,
    ) -> Result<Vec<u8>, Error> {
        let position = self
            .recv_chains
            .iter()
            .position(|chain| chain.ratchet_key == message.ratchet_key);
        let position = match position {
            Some(position) => position,
            None => {
                self.ratchet(message.ratchet_key, config)?;
                0
            }
        };

        let chain = self
            .recv_chains
            .get_mut(position)
            .ok_or_else(|| Error::Internal("Receive chain vanished".to_string()))?;

        match message.counter.cmp(&chain.chain_key.index()) {
            Ordering::Less => chain.try_message_keys(envelope, message),
            Ordering::Equal => {
                let keys = chain.chain_key.message_keys()?;
                if !envelope.verify(&keys.mac_key)? {
                    return Err(DecryptError::InvalidSignature.into());
                }

                let plaintext = keys.decrypt(&message.cipher_text)?;
                chain.chain_key = chain.chain_key.next()?;
                Ok(plaintext)
            }
            Ordering::Greater => {
                let (chain_key, keys, skipped) =
                    chain.stage_message_keys(message, config.max_counter_gap)?;
                if !envelope.verify(&keys.mac_key)? {
                    return Err(DecryptError::InvalidSignature.into());
                }

                let plaintext = keys.decrypt(&message.cipher_text)?;
                chain.chain_key = chain_key.next()?;
                chain.commit_message_keys(skipped, config.max_counter_gap)?;
                Ok(plaintext)
            }
        }
    }
}

impl Encode for SessionState {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (
                0,
                Value::Array(self.recv_chains.iter().map(Encode::encode).collect()),
            ),
            (1, self.send_chain.encode()),
            (2, self.root_key.encode()),
            (3, cbor::uint(self.prev_counter)),
        ])
    }
}

impl Decode for SessionState {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut recv_chains = None;
        let mut send_chain = None;
        let mut root_key = None;
        let mut prev_counter = None;
        for (key, value) in cbor::entries(value, "SessionState")? {
            match key {
                0 => {
                    recv_chains = Some(
                        cbor::to_array(value, "SessionState.recv_chains")?
                            .into_iter()
                            .map(RecvChain::decode)
                            .collect::<Result<VecDeque<_>, _>>()?,
                    )
                }
                1 => send_chain = Some(SendChain::decode(value)?),
                2 => root_key = Some(RootKey::decode(value)?),
                3 => prev_counter = Some(cbor::to_uint(value, "SessionState.prev_counter")?),
                _ => {}
            }
        }

        Ok(Self {
            recv_chains: cbor::required(recv_chains, "SessionState.recv_chains")?,
            send_chain: cbor::required(send_chain, "SessionState.send_chain")?,
            root_key: cbor::required(root_key, "SessionState.root_key")?,
            prev_counter: cbor::required(prev_counter, "SessionState.prev_counter")?,
        })
    }
}
