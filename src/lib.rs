//! An implementation of the Proteus protocol: an X3DH-style handshake over
//! pre-keys followed by a double ratchet, with every entity encoded as
//! integer-keyed CBOR.
//!
//! A party publishes a [`PreKeyBundle`] per [`PreKey`]. The initiator opens
//! a [`Session`] from one of those bundles, the responder opens its side from
//! the first [`Envelope`] it receives:
//!
//! ```
//! use proteus::{IdentityKeyPair, MemoryPreKeyStore, PreKey, PreKeyBundle, Session};
//!
//! let alice_identity = IdentityKeyPair::new()?;
//! let bob_identity = IdentityKeyPair::new()?;
//!
//! let prekey = PreKey::new(1)?;
//! let bundle = PreKeyBundle::signed(&bob_identity, &prekey);
//! let mut bob_store: MemoryPreKeyStore = [prekey].into_iter().collect();
//!
//! let mut alice = Session::init_from_prekey(&alice_identity, &bundle, None)?;
//! let envelope = alice.encrypt(b"Hello, Bob!")?;
//!
//! let (mut bob, plaintext) =
//!     Session::init_from_message(&bob_identity, &mut bob_store, &envelope, None)?;
//! assert_eq!(plaintext, b"Hello, Bob!");
//!
//! let reply = bob.encrypt(b"Hello, Alice!")?;
//! assert_eq!(alice.decrypt(&mut bob_store, &reply)?, b"Hello, Alice!");
//! # Ok::<(), proteus::Error>(())
//! ```

mod cbor;

mod config;
pub use config::*;

mod derived;
pub use derived::{CipherKey, DerivedSecrets, Mac, MacKey};

mod error;
pub use error::{DecodeError, DecryptError, Error, InputError};

mod keys;
pub use keys::*;

mod message;
pub use message::*;

mod ratchet;
pub use ratchet::*;

mod session;
pub use session::Session;
