#[cfg(test)]
mod integration_tests {
    use proteus::{
        DecryptError, Envelope, Error, IdentityKeyPair, MemoryPreKeyStore, Message, PreKey,
        PreKeyAuth, PreKeyBundle, SerialisedPreKeyBundle, Session, SessionConfig,
    };

    fn publish(identity: &IdentityKeyPair, store: &MemoryPreKeyStore, id: u16) -> PreKeyBundle {
        store.public_bundle(identity, id).unwrap()
    }

    #[test]
    fn test_full_protocol_flow() {
        println!("Step 1: Creating identities for Alice and Bob...");
        let alice_identity = IdentityKeyPair::new().unwrap();
        let bob_identity = IdentityKeyPair::new().unwrap();

        println!("Step 2: Bob generates pre-keys and publishes a bundle...");
        let mut bob_store: MemoryPreKeyStore =
            PreKey::generate_prekeys(0, 10).unwrap().into_iter().collect();
        bob_store.insert(PreKey::last_resort().unwrap());
        let bundle = publish(&bob_identity, &bob_store, 3);

        println!("Step 3: Alice fetches the bundle over JSON and verifies it...");
        let json = serde_json::to_string(&bundle.serialised_json().unwrap()).unwrap();
        let fetched: SerialisedPreKeyBundle = serde_json::from_str(&json).unwrap();
        let fetched = PreKeyBundle::from_serialised_json(&fetched).unwrap();
        assert_eq!(fetched.verify(), PreKeyAuth::Valid);

        println!("Step 4: Alice opens a session from Bob's bundle...");
        let mut alice = Session::init_from_prekey(&alice_identity, &fetched, None).unwrap();

        println!("Step 5: Alice sends her first message...");
        let alice_message_1 = "Hey Bob, this is a secure message!";
        let wire = alice
            .encrypt(alice_message_1.as_bytes())
            .unwrap()
            .serialise()
            .unwrap();

        println!("Step 6: Bob opens his side from Alice's pre-key message...");
        let envelope = Envelope::deserialise(&wire).unwrap();
        assert!(matches!(envelope.message(), Message::PreKey(_)));
        let (mut bob, decrypted) =
            Session::init_from_message(&bob_identity, &mut bob_store, &envelope, None).unwrap();
        assert_eq!(String::from_utf8(decrypted).unwrap(), alice_message_1);
        assert_eq!(
            bob.remote_identity().fingerprint(),
            alice_identity.public_key.fingerprint()
        );
        assert!(!bob_store.contains(3));

        println!("Step 7: Bob replies to Alice...");
        let bob_message_1 = "Hi Alice! I received your secure message.";
        let reply = bob.encrypt(bob_message_1.as_bytes()).unwrap();

        println!("Step 8: Alice decrypts Bob's reply...");
        let decrypted = alice.decrypt(&mut MemoryPreKeyStore::new(), &reply).unwrap();
        assert_eq!(String::from_utf8(decrypted).unwrap(), bob_message_1);
        assert!(alice.pending_prekey().is_none());

        println!("Step 9: Testing session serialisation and restoration...");
        let alice_data = alice.serialise().unwrap();
        let bob_data = bob.serialise().unwrap();
        let mut alice = Session::deserialise(&alice_identity, &alice_data, None).unwrap();
        let mut bob = Session::deserialise(&bob_identity, &bob_data, None).unwrap();

        println!("Step 10: Testing out-of-order message delivery...");
        let alice_messages = [
            "Message A - should be received third",
            "Message B - should be received first",
            "Message C - should be received second",
        ];
        let envelopes: Vec<Envelope> = alice_messages
            .iter()
            .map(|message| alice.encrypt(message.as_bytes()).unwrap())
            .collect();

        for i in [1, 2, 0] {
            let decrypted = bob.decrypt(&mut bob_store, &envelopes[i]).unwrap();
            assert_eq!(String::from_utf8(decrypted).unwrap(), alice_messages[i]);
        }

        println!("Step 11: Replaying a message fails...");
        assert_eq!(
            bob.decrypt(&mut bob_store, &envelopes[1]),
            Err(Error::Decrypt(DecryptError::DuplicateMessage))
        );

        println!("Step 12: Testing multiple DH ratchet rotations...");
        for i in 0..3 {
            let bob_message = format!("Rotation test from Bob {i}");
            let encrypted = bob.encrypt(bob_message.as_bytes()).unwrap();
            let decrypted = alice.decrypt(&mut MemoryPreKeyStore::new(), &encrypted).unwrap();
            assert_eq!(String::from_utf8(decrypted).unwrap(), bob_message);

            let alice_message = format!("Rotation test from Alice {i}");
            let encrypted = alice.encrypt(alice_message.as_bytes()).unwrap();
            let decrypted = bob.decrypt(&mut bob_store, &encrypted).unwrap();
            assert_eq!(String::from_utf8(decrypted).unwrap(), alice_message);
        }

        println!("Step 13: Testing large message...");
        let large_message = vec![b'X'; 100 * 1024];
        let encrypted = alice.encrypt(&large_message).unwrap();
        let decrypted = bob.decrypt(&mut bob_store, &encrypted).unwrap();
        assert_eq!(decrypted, large_message);

        println!("Step 14: Testing empty message...");
        let encrypted = bob.encrypt(b"").unwrap();
        let decrypted = alice.decrypt(&mut MemoryPreKeyStore::new(), &encrypted).unwrap();
        assert!(decrypted.is_empty());

        println!("All integration tests passed successfully!");
    }

    #[test]
    fn test_multiple_sessions() {
        println!("Setting up identities for Alice, Bob and Charlie...");
        let alice_identity = IdentityKeyPair::new().unwrap();
        let bob_identity = IdentityKeyPair::new().unwrap();
        let charlie_identity = IdentityKeyPair::new().unwrap();

        let mut bob_store: MemoryPreKeyStore =
            PreKey::generate_prekeys(0, 5).unwrap().into_iter().collect();
        let mut charlie_store: MemoryPreKeyStore =
            PreKey::generate_prekeys(100, 5).unwrap().into_iter().collect();

        println!("Alice opens sessions with Bob and Charlie...");
        let mut alice_bob = Session::init_from_prekey(
            &alice_identity,
            &publish(&bob_identity, &bob_store, 0),
            None,
        )
        .unwrap();
        let mut alice_charlie = Session::init_from_prekey(
            &alice_identity,
            &publish(&charlie_identity, &charlie_store, 100),
            None,
        )
        .unwrap();

        println!("Bob and Charlie receive Alice's messages...");
        let to_bob = alice_bob.encrypt(b"Hey Bob, it's Alice!").unwrap();
        let to_charlie = alice_charlie.encrypt(b"Hey Charlie, it's Alice!").unwrap();

        let (mut bob, decrypted) =
            Session::init_from_message(&bob_identity, &mut bob_store, &to_bob, None).unwrap();
        assert_eq!(decrypted, b"Hey Bob, it's Alice!");
        let (mut charlie, decrypted) =
            Session::init_from_message(&charlie_identity, &mut charlie_store, &to_charlie, None)
                .unwrap();
        assert_eq!(decrypted, b"Hey Charlie, it's Alice!");

        println!("Envelopes cannot be decrypted by the wrong peer...");
        assert!(charlie.decrypt(&mut charlie_store, &to_bob).is_err());

        println!("Bob and Charlie respond to Alice...");
        let from_bob = bob.encrypt(b"Hi Alice, it's Bob!").unwrap();
        let from_charlie = charlie.encrypt(b"Hey Alice, Charlie here!").unwrap();
        let mut empty = MemoryPreKeyStore::new();
        assert_eq!(
            alice_bob.decrypt(&mut empty, &from_bob).unwrap(),
            b"Hi Alice, it's Bob!"
        );
        assert_eq!(
            alice_charlie.decrypt(&mut empty, &from_charlie).unwrap(),
            b"Hey Alice, Charlie here!"
        );
        assert!(alice_bob.decrypt(&mut empty, &from_charlie).is_err());

        println!("Multiple session test passed successfully!");
    }

    #[test]
    fn test_simultaneous_handshakes() {
        println!("Alice and Bob open sessions to each other at the same time...");
        let alice_identity = IdentityKeyPair::new().unwrap();
        let bob_identity = IdentityKeyPair::new().unwrap();
        let mut alice_store: MemoryPreKeyStore =
            PreKey::generate_prekeys(0, 2).unwrap().into_iter().collect();
        let mut bob_store: MemoryPreKeyStore =
            PreKey::generate_prekeys(0, 2).unwrap().into_iter().collect();

        let mut alice = Session::init_from_prekey(
            &alice_identity,
            &publish(&bob_identity, &bob_store, 0),
            None,
        )
        .unwrap();
        let mut bob = Session::init_from_prekey(
            &bob_identity,
            &publish(&alice_identity, &alice_store, 0),
            None,
        )
        .unwrap();

        let alice_tag = alice.session_tag();
        let bob_tag = bob.session_tag();
        let from_alice = alice.encrypt(b"from Alice").unwrap();
        let from_bob = bob.encrypt(b"from Bob").unwrap();

        println!("Each side adds the other's handshake as a second session state...");
        assert_eq!(
            bob.decrypt(&mut bob_store, &from_alice).unwrap(),
            b"from Alice"
        );
        assert_eq!(
            alice.decrypt(&mut alice_store, &from_bob).unwrap(),
            b"from Bob"
        );
        assert_eq!(alice.session_tag(), bob_tag);
        assert_eq!(bob.session_tag(), alice_tag);
        assert!(!alice_store.contains(0));
        assert!(!bob_store.contains(0));

        println!("Both handshakes are confirmed, so no pre-key headers are sent...");
        assert!(alice.pending_prekey().is_none());
        assert!(bob.pending_prekey().is_none());

        println!("The conversation continues on the most recent state...");
        let message = alice.encrypt(b"converged").unwrap();
        assert!(matches!(message.message(), Message::Cipher(_)));
        assert_eq!(bob.decrypt(&mut bob_store, &message).unwrap(), b"converged");
    }

    #[test]
    fn test_bounded_configuration() {
        println!("Bob restricts how far ahead a chain may skip...");
        let alice_identity = IdentityKeyPair::new().unwrap();
        let bob_identity = IdentityKeyPair::new().unwrap();
        let mut bob_store: MemoryPreKeyStore = [PreKey::new(1).unwrap()].into_iter().collect();
        let config = SessionConfig {
            max_counter_gap: 3,
            ..SessionConfig::default()
        };

        let mut alice =
            Session::init_from_prekey(&alice_identity, &publish(&bob_identity, &bob_store, 1), None)
                .unwrap();
        let hello = alice.encrypt(b"hello").unwrap();
        let (mut bob, _) =
            Session::init_from_message(&bob_identity, &mut bob_store, &hello, Some(config.clone()))
                .unwrap();
        assert_eq!(bob.config(), &config);

        let envelopes: Vec<Envelope> = (0..5).map(|_| alice.encrypt(b"later").unwrap()).collect();
        assert!(matches!(
            bob.decrypt(&mut bob_store, &envelopes[4]),
            Err(Error::Decrypt(DecryptError::TooDistantFuture { counter: 5, index: 1 }))
        ));
        assert_eq!(bob.decrypt(&mut bob_store, &envelopes[3]).unwrap(), b"later");
        assert_eq!(bob.decrypt(&mut bob_store, &envelopes[4]).unwrap(), b"later");

        println!("The configuration survives a restore when supplied again...");
        let stored = bob.serialise().unwrap();
        let restored = Session::deserialise(&bob_identity, &stored, Some(config.clone())).unwrap();
        assert_eq!(restored.config(), &config);
    }

    #[test]
    fn test_identity_persistence() {
        println!("Persisting and restoring identities and pre-keys...");
        let identity = IdentityKeyPair::new().unwrap();
        let restored = IdentityKeyPair::deserialise(&identity.serialise().unwrap()).unwrap();
        assert_eq!(restored.public_key, identity.public_key);

        let prekey = PreKey::new(42).unwrap();
        let restored_prekey = PreKey::deserialise(&prekey.serialise().unwrap()).unwrap();

        println!("A restored identity and pre-key still complete a handshake...");
        let alice_identity = IdentityKeyPair::new().unwrap();
        let bundle = PreKeyBundle::signed(&identity, &prekey);
        let bundle = PreKeyBundle::deserialise(&bundle.serialise().unwrap()).unwrap();
        let mut alice = Session::init_from_prekey(&alice_identity, &bundle, None).unwrap();

        let mut store: MemoryPreKeyStore = [restored_prekey].into_iter().collect();
        let hello = alice.encrypt(b"hello again").unwrap();
        let (_, decrypted) =
            Session::init_from_message(&restored, &mut store, &hello, None).unwrap();
        assert_eq!(decrypted, b"hello again");
    }
}
