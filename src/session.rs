use crate::cbor::{self, Decode, Encode};
use crate::{
    CipherMessage, DecodeError, DecryptError, Envelope, Error, IdentityKey, IdentityKeyPair,
    KeyPair, Message, PreKeyAuth, PreKeyBundle, PreKeyMessage, PreKeyStore, PublicKey,
    SessionConfig, SessionState, SessionTag,
};
use ciborium::Value;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

const SESSION_VERSION: u8 = 1;

#[derive(Clone)]
struct IndexedState {
    idx: usize,
    state: SessionState,
}

/// A secure messaging session with one remote party.
///
/// A session is opened either from the peer's [`PreKeyBundle`] (we are the
/// initiator) or from the first [`PreKeyMessage`] the peer sent us (we are
/// the responder). It keeps one [`SessionState`] per session tag, so that
/// concurrent handshakes between the same two identities can all be
/// decrypted; new messages are always sent on the most recently used state.
///
/// The session borrows the local identity, which must outlive it. Persist it
/// with [`serialise`](Self::serialise) after every successful `encrypt` or
/// `decrypt`.
#[derive(Clone)]
pub struct Session<'a> {
    version: u8,
    session_tag: SessionTag,
    local_identity: &'a IdentityKeyPair,
    remote_identity: IdentityKey,
    pending_prekey: Option<(u16, PublicKey)>,
    session_states: HashMap<SessionTag, IndexedState>,
    counter: usize,
    config: SessionConfig,
}

impl<'a> Session<'a> {
    /// Opens a session as the initiator, from the responder's pre-key bundle.
    ///
    /// Every envelope produced by [`encrypt`](Self::encrypt) is a pre-key
    /// message until the first message from the responder is decrypted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBundle`] if the bundle is signed and the signature does
    /// not verify. Unsigned bundles are accepted. [`InputError::RangeError`]
    /// if `config` fails [`SessionConfig::validate`].
    ///
    /// [`InputError::RangeError`]: crate::InputError::RangeError
    pub fn init_from_prekey(
        local_identity: &'a IdentityKeyPair,
        bundle: &PreKeyBundle,
        config: Option<SessionConfig>,
    ) -> Result<Self, Error> {
        let config = checked_config(config)?;
        if bundle.verify() == PreKeyAuth::Invalid {
            warn!(
                prekey_id = bundle.prekey_id,
                remote_identity = %bundle.identity_key.fingerprint(),
                "Rejecting pre-key bundle with an invalid signature"
            );
            return Err(Error::InvalidBundle);
        }

        let base_key = KeyPair::new()?;
        let state = SessionState::init_as_alice(local_identity, &base_key, bundle)?;
        let session_tag = SessionTag::new()?;

        let mut session = Self::empty(
            local_identity,
            bundle.identity_key,
            session_tag,
            config,
        );
        session.pending_prekey = Some((bundle.prekey_id, base_key.public_key));
        session.insert_session_state(session_tag, state);

        debug!(
            session_tag = %session_tag,
            prekey_id = bundle.prekey_id,
            "Initiated session from pre-key bundle"
        );

        Ok(session)
    }

    /// Opens a session as the responder, from the initiator's first envelope.
    ///
    /// Returns the session and the decrypted payload. The pre-key the
    /// envelope refers to is deleted from `store` unless it is the
    /// last-resort pre-key.
    pub fn init_from_message<S: PreKeyStore>(
        local_identity: &'a IdentityKeyPair,
        store: &mut S,
        envelope: &Envelope,
        config: Option<SessionConfig>,
    ) -> Result<(Self, Vec<u8>), Error> {
        let config = checked_config(config)?;
        let Message::PreKey(message) = envelope.message() else {
            return Err(DecryptError::InvalidMessage(
                "Can't initialise a session from a CipherMessage".to_string(),
            )
            .into());
        };

        let mut session = Self::empty(
            local_identity,
            message.identity_key,
            message.message.session_tag,
            config,
        );
        let plaintext = session.decrypt(store, envelope)?;

        debug!(
            session_tag = %session.session_tag,
            prekey_id = message.prekey_id,
            "Initiated session from pre-key message"
        );

        Ok((session, plaintext))
    }

    fn empty(
        local_identity: &'a IdentityKeyPair,
        remote_identity: IdentityKey,
        session_tag: SessionTag,
        config: SessionConfig,
    ) -> Self {
        Self {
            version: SESSION_VERSION,
            session_tag,
            local_identity,
            remote_identity,
            pending_prekey: None,
            session_states: HashMap::new(),
            counter: 0,
            config,
        }
    }

    /// Tag of the state new messages are sent on.
    pub fn session_tag(&self) -> SessionTag {
        self.session_tag
    }

    /// Our identity.
    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity.public_key
    }

    /// The peer's identity.
    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    /// The responder's pre-key ID and our base key, while the handshake is
    /// not yet confirmed by a reply.
    pub fn pending_prekey(&self) -> Option<(u16, PublicKey)> {
        self.pending_prekey
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Encrypts `plaintext` on the current session state.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Envelope, Error> {
        let entry = self
            .session_states
            .get_mut(&self.session_tag)
            .ok_or_else(|| {
                Error::Internal(format!("No session state for tag {}", self.session_tag))
            })?;

        let envelope = entry.state.encrypt(
            &self.local_identity.public_key,
            self.pending_prekey,
            self.session_tag,
            plaintext,
        )?;

        trace!(
            session_tag = %self.session_tag,
            counter = envelope.message().cipher_message().counter,
            prekey = self.pending_prekey.is_some(),
            "Encrypted message"
        );

        Ok(envelope)
    }

    /// Decrypts an envelope from the peer.
    ///
    /// A failed decryption leaves the session exactly as it was; the
    /// envelope can be dropped and the session used for further messages.
    /// `store` is only consulted for pre-key messages that open a new
    /// session state.
    pub fn decrypt<S: PreKeyStore>(
        &mut self,
        store: &mut S,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, Error> {
        match envelope.message() {
            Message::Cipher(message) => self.decrypt_cipher_message(envelope, message),
            Message::PreKey(message) => {
                if message.identity_key != self.remote_identity {
                    warn!(
                        expected = %self.remote_identity.fingerprint(),
                        actual = %message.identity_key.fingerprint(),
                        "Remote identity changed"
                    );
                    return Err(DecryptError::RemoteIdentityChanged.into());
                }

                match self.decrypt_cipher_message(envelope, &message.message) {
                    Err(Error::Decrypt(
                        DecryptError::InvalidMessage(_) | DecryptError::PrekeyNotFound(_),
                    )) => self.decrypt_prekey_message(store, envelope, message),
                    result => result,
                }
            }
        }
    }

    fn decrypt_cipher_message(
        &mut self,
        envelope: &Envelope,
        message: &CipherMessage,
    ) -> Result<Vec<u8>, Error> {
        let mut state = self
            .session_states
            .get(&message.session_tag)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| {
                DecryptError::InvalidMessage(format!(
                    "No session state for tag {}",
                    message.session_tag
                ))
            })?;

        let plaintext = state.decrypt(envelope, message, &self.config)?;

        trace!(
            session_tag = %message.session_tag,
            counter = message.counter,
            prev_counter = message.prev_counter,
            "Decrypted message"
        );

        if self.pending_prekey.take().is_some() {
            debug!(session_tag = %message.session_tag, "Handshake confirmed by peer");
        }
        self.insert_session_state(message.session_tag, state);

        Ok(plaintext)
    }

    fn decrypt_prekey_message<S: PreKeyStore>(
        &mut self,
        store: &mut S,
        envelope: &Envelope,
        message: &PreKeyMessage,
    ) -> Result<Vec<u8>, Error> {
        let prekey = store
            .load_prekey(message.prekey_id)
            .map_err(|err| Error::PreKeyStore(err.to_string()))?
            .ok_or(DecryptError::PrekeyNotFound(message.prekey_id))?;

        let mut state = SessionState::init_as_bob(
            self.local_identity,
            &prekey.key_pair,
            &message.identity_key,
            &message.base_key,
        )?;
        let plaintext = state.decrypt(envelope, &message.message, &self.config)?;

        if !prekey.is_last_resort() {
            store
                .delete_prekey(message.prekey_id)
                .map_err(|err| Error::PreKeyStore(err.to_string()))?;
            debug!(prekey_id = message.prekey_id, "Deleted used pre-key");
        }

        self.pending_prekey = None;
        self.insert_session_state(message.message.session_tag, state);

        Ok(plaintext)
    }

    fn insert_session_state(&mut self, session_tag: SessionTag, state: SessionState) {
        if let Some(entry) = self.session_states.get_mut(&session_tag) {
            entry.state = state;
        } else {
            if self.counter == usize::MAX {
                self.session_states.clear();
                self.counter = 0;
            }

            self.session_states.insert(
                session_tag,
                IndexedState {
                    idx: self.counter,
                    state,
                },
            );
            self.counter += 1;

            debug!(
                session_tag = %session_tag,
                states = self.session_states.len(),
                "Added session state"
            );
        }

        self.session_tag = session_tag;

        if self.session_states.len() > self.config.max_session_states {
            self.evict_oldest_session_state();
        }
    }

    fn evict_oldest_session_state(&mut self) {
        let oldest = self
            .session_states
            .iter()
            .filter(|(tag, _)| **tag != self.session_tag)
            .min_by_key(|(_, entry)| entry.idx)
            .map(|(tag, _)| *tag);

        if let Some(tag) = oldest {
            self.session_states.remove(&tag);
            debug!(session_tag = %tag, "Evicted oldest session state");
        }
    }

    /// Encodes the session, secrets included, for storage.
    ///
    /// The local identity is stored by its public key only; supply the key
    /// pair again to [`deserialise`](Self::deserialise).
    pub fn serialise(&self) -> Result<Vec<u8>, Error> {
        let mut states: Vec<_> = self.session_states.iter().collect();
        states.sort_by_key(|(_, entry)| entry.idx);

        let value = cbor::map(vec![
            (0, cbor::uint(self.version)),
            (1, self.session_tag.encode()),
            (2, self.local_identity.public_key.encode()),
            (3, self.remote_identity.encode()),
            (
                4,
                cbor::optional(self.pending_prekey.as_ref(), |(prekey_id, base_key)| {
                    cbor::map(vec![(0, cbor::uint(*prekey_id)), (1, base_key.encode())])
                }),
            ),
            (
                5,
                Value::Map(
                    states
                        .into_iter()
                        .map(|(tag, entry)| (tag.encode(), entry.state.encode()))
                        .collect(),
                ),
            ),
        ]);

        cbor::to_vec(&value)
    }

    /// Restores a session produced by [`serialise`](Self::serialise).
    ///
    /// # Errors
    ///
    /// [`DecodeError::LocalIdentityChanged`] if the session was stored for a
    /// different local identity.
    pub fn deserialise(
        local_identity: &'a IdentityKeyPair,
        bytes: &[u8],
        config: Option<SessionConfig>,
    ) -> Result<Self, Error> {
        let config = checked_config(config)?;
        let value = cbor::from_slice(bytes)?;
        Ok(Self::decode(local_identity, value, config)?)
    }

    fn decode(
        local_identity: &'a IdentityKeyPair,
        value: Value,
        config: SessionConfig,
    ) -> Result<Self, DecodeError> {
        let mut version = None;
        let mut session_tag = None;
        let mut stored_identity = None;
        let mut remote_identity = None;
        let mut pending_prekey = None;
        let mut states = None;
        for (key, value) in cbor::entries(value, "Session")? {
            match key {
                0 => version = Some(cbor::to_uint(value, "Session.version")?),
                1 => session_tag = Some(SessionTag::decode(value, "Session.session_tag")?),
                2 => stored_identity = Some(IdentityKey::decode(value)?),
                3 => remote_identity = Some(IdentityKey::decode(value)?),
                4 => pending_prekey = cbor::to_optional(value, decode_pending_prekey)?,
                5 => {
                    states = Some(
                        cbor::raw_map(value, "Session.session_states")?
                            .into_iter()
                            .map(|(tag, state)| {
                                Ok((
                                    SessionTag::decode(tag, "Session.session_states")?,
                                    SessionState::decode(state)?,
                                ))
                            })
                            .collect::<Result<Vec<_>, DecodeError>>()?,
                    )
                }
                _ => {}
            }
        }

        let version = cbor::required(version, "Session.version")?;
        if version != SESSION_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        if cbor::required(stored_identity, "Session.local_identity")? != local_identity.public_key {
            return Err(DecodeError::LocalIdentityChanged);
        }
        let session_tag = cbor::required(session_tag, "Session.session_tag")?;

        let mut session = Self::empty(
            local_identity,
            cbor::required(remote_identity, "Session.remote_identity")?,
            session_tag,
            config,
        );
        session.pending_prekey = pending_prekey;
        for (tag, state) in cbor::required(states, "Session.session_states")? {
            session.session_states.insert(
                tag,
                IndexedState {
                    idx: session.counter,
                    state,
                },
            );
            session.counter += 1;
        }

        if !session.session_states.contains_key(&session_tag) {
            return Err(DecodeError::MissingField("Session.session_states[session_tag]"));
        }

        Ok(session)
    }
}

fn checked_config(config: Option<SessionConfig>) -> Result<SessionConfig, Error> {
    let config = config.unwrap_or_default();
    config.validate()?;
    Ok(config)
}

fn decode_pending_prekey(value: Value) -> Result<(u16, PublicKey), DecodeError> {
    let mut prekey_id = None;
    let mut base_key = None;
    for (key, value) in cbor::entries(value, "Session.pending_prekey")? {
        match key {
            0 => prekey_id = Some(cbor::to_uint(value, "Session.pending_prekey.prekey_id")?),
            1 => base_key = Some(PublicKey::decode(value)?),
            _ => {}
        }
    }

    Ok((
        cbor::required(prekey_id, "Session.pending_prekey.prekey_id")?,
        cbor::required(base_key, "Session.pending_prekey.base_key")?,
    ))
}
