/// Errors that can occur during Proteus protocol operations.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// Wire bytes could not be decoded into a protocol entity.
    #[error("Decoding failed: {0}")]
    Decode(#[from] DecodeError),

    /// A single message could not be decrypted. The session stays usable.
    #[error("Decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    /// A caller-supplied argument was outside its valid domain.
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    /// A cryptographic primitive failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// A pre-key bundle carries a signature that does not match its identity key.
    #[error("Pre-key bundle signature is invalid")]
    InvalidBundle,

    /// The external pre-key store reported a failure.
    #[error("Pre-key store error: {0}")]
    PreKeyStore(String),

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,

    /// An internal invariant was violated. Indicates a bug, not bad input.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures while decoding CBOR wire bytes.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// The bytes are not well-formed CBOR.
    #[error("Malformed CBOR: {0}")]
    Cbor(String),

    /// A field holds a CBOR value of the wrong major type.
    #[error("Field `{field}` should be {expected}")]
    UnexpectedType {
        /// Field being decoded.
        field: &'static str,
        /// Expected CBOR type.
        expected: &'static str,
    },

    /// A required field is absent from the map.
    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    /// A byte string has the wrong length.
    #[error("Field `{field}` should be {expected} bytes, not {actual} bytes")]
    InvalidArrayLen {
        /// Field being decoded.
        field: &'static str,
        /// Required length in bytes.
        expected: usize,
        /// Length found on the wire.
        actual: usize,
    },

    /// An integer does not fit the declared width of its field.
    #[error("Integer in field `{field}` is out of range")]
    IntegerOutOfRange {
        /// Field being decoded.
        field: &'static str,
    },

    /// Key material is not a valid curve point or is internally inconsistent.
    #[error("Invalid key material: {0}")]
    InvalidKey(&'static str),

    /// The leading message-type byte is neither a cipher nor a pre-key message.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// The entity declares a version this implementation does not speak.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// A persisted session belongs to a different local identity.
    #[error("Local identity changed")]
    LocalIdentityChanged,
}

/// Per-message decryption failures.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum DecryptError {
    /// A pre-key message names a different identity than the established session.
    #[error("Remote identity changed")]
    RemoteIdentityChanged,

    /// The envelope MAC does not verify under the derived message key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The message cannot be processed by this session.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The message key for this counter was already consumed.
    #[error("Duplicate message")]
    DuplicateMessage,

    /// The counter is further ahead of the chain than the allowed gap.
    #[error("Message {counter} is from too distant in the future (chain at {index})")]
    TooDistantFuture {
        /// Counter carried by the message.
        counter: u32,
        /// Current index of the receive chain.
        index: u32,
    },

    /// The message key for this counter has already been evicted.
    #[error("Outdated message")]
    OutdatedMessage,

    /// The pre-key referenced by a pre-key message is not in the store.
    #[error("Pre-key {0} not found")]
    PrekeyNotFound(u16),
}

/// Invalid caller-supplied arguments.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum InputError {
    /// A numeric argument lies outside its valid range.
    #[error("{0}")]
    RangeError(String),
}

impl From<aes_gcm_siv::Error> for Error {
    fn from(value: aes_gcm_siv::Error) -> Self {
        Self::Crypto(value.to_string())
    }
}
