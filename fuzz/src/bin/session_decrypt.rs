#[macro_use]
extern crate afl;
use proteus::{Envelope, IdentityKeyPair, MemoryPreKeyStore, PreKey, PreKeyBundle, Session};

fn main() {
    // The Victim
    let alice = IdentityKeyPair::new().expect("Setup failed");

    // The Attacker context
    let bob = IdentityKeyPair::new().expect("Setup failed");
    let prekey = PreKey::new(1).expect("Setup failed");
    let bob_bundle = PreKeyBundle::signed(&bob, &prekey);

    let mut session = Session::init_from_prekey(&alice, &bob_bundle, None).expect("Setup failed");
    let mut store: MemoryPreKeyStore = PreKey::generate_prekeys(0, 16)
        .expect("Setup failed")
        .into_iter()
        .collect();

    fuzz!(|data: &[u8]| {
        if let Ok(envelope) = Envelope::deserialise(data) {
            let _ = session.decrypt(&mut store, &envelope);
        }
    });
}
