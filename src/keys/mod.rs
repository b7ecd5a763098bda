mod identity_key;
mod key_pair;
mod pre_key;
mod pre_key_bundle;
mod store;

pub use identity_key::{IdentityKey, IdentityKeyPair};
pub use key_pair::{KeyPair, PublicKey, SecretKey};
pub use pre_key::{PreKey, validate_pre_key_id};
pub use pre_key_bundle::{PreKeyAuth, PreKeyBundle, SerialisedPreKeyBundle};
pub use store::{MemoryPreKeyStore, PreKeyStore};
