use crate::cbor::{self, Decode, Encode};
use crate::{DecodeError, Error};
use ciborium::Value;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::TryRngCore;
use rand::rngs::OsRng;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Generates a cryptographically secure random 32-byte seed.
pub(crate) fn generate_random_seed() -> Result<Box<[u8; 32]>, Error> {
    let mut seed = Box::new([0u8; 32]);
    OsRng
        .try_fill_bytes(seed.as_mut_slice())
        .map_err(|_| Error::Random)?;
    Ok(seed)
}

/// Public half of a key pair, held in both curve representations.
///
/// The Edwards form verifies signatures and is what goes on the wire; the
/// Montgomery form is derived from it once, at construction, and is used for
/// Diffie-Hellman agreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    edward: VerifyingKey,
    curve: x25519_dalek::PublicKey,
}

impl PublicKey {
    /// Builds a public key from its 32-byte Edwards encoding.
    pub fn from_edward_bytes(bytes: &[u8; 32]) -> Result<Self, DecodeError> {
        let edward = VerifyingKey::from_bytes(bytes)
            .map_err(|_| DecodeError::InvalidKey("not a valid Ed25519 point"))?;
        Ok(Self::from(edward))
    }

    /// Verifies a detached Ed25519 signature over `message`.
    pub fn verify(&self, signature: &[u8; 64], message: &[u8]) -> bool {
        self.edward
            .verify_strict(message, &Signature::from_bytes(signature))
            .is_ok()
    }

    /// Hex encoding of the Edwards bytes, used to compare identities.
    pub fn fingerprint(&self) -> String {
        hex::encode(self.edward.as_bytes())
    }

    /// Edwards (signing) representation.
    pub fn edward_bytes(&self) -> &[u8; 32] {
        self.edward.as_bytes()
    }

    /// Montgomery (key agreement) representation.
    pub fn curve_bytes(&self) -> &[u8; 32] {
        self.curve.as_bytes()
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(edward: VerifyingKey) -> Self {
        let curve = x25519_dalek::PublicKey::from(edward.to_montgomery().to_bytes());
        Self { edward, curve }
    }
}

impl Encode for PublicKey {
    fn encode(&self) -> Value {
        cbor::map(vec![(0, cbor::bytes(self.edward.as_bytes()))])
    }
}

impl Decode for PublicKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut edward = None;
        for (key, value) in cbor::entries(value, "PublicKey")? {
            if key == 0 {
                edward = Some(cbor::to_fixed::<32>(value, "PublicKey.pub_edward")?);
            }
        }

        Self::from_edward_bytes(&cbor::required(edward, "PublicKey.pub_edward")?)
    }
}

/// Secret half of a key pair, held in both curve representations.
///
/// The X25519 scalar is derived from the Ed25519 seed exactly as the public
/// Montgomery point is derived from the Edwards point, so agreement against
/// a [`PublicKey`] always matches the peer's computation.
#[derive(Clone)]
pub struct SecretKey {
    edward: Box<SigningKey>,
    curve: StaticSecret,
}

impl SecretKey {
    fn from_signing_key(edward: SigningKey) -> Self {
        let mut scalar = edward.to_scalar_bytes();
        let curve = StaticSecret::from(scalar);
        scalar.zeroize();

        Self {
            edward: Box::new(edward),
            curve,
        }
    }

    /// Produces a deterministic Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.edward.sign(message).to_bytes()
    }

    /// Performs X25519 agreement with the peer's public key.
    pub fn shared_secret(&self, public_key: &PublicKey) -> [u8; 32] {
        self.curve.diffie_hellman(&public_key.curve).to_bytes()
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        PublicKey::from(self.edward.verifying_key())
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl Encode for SecretKey {
    fn encode(&self) -> Value {
        let mut keypair_bytes = self.edward.to_keypair_bytes();
        let value = cbor::map(vec![(0, cbor::bytes(&keypair_bytes))]);
        keypair_bytes.zeroize();
        value
    }
}

impl Decode for SecretKey {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut edward = None;
        for (key, value) in cbor::entries(value, "SecretKey")? {
            if key == 0 {
                edward = Some(cbor::to_fixed::<64>(value, "SecretKey.sec_edward")?);
            }
        }

        let mut keypair_bytes = cbor::required(edward, "SecretKey.sec_edward")?;
        let signing_key = SigningKey::from_keypair_bytes(&keypair_bytes);
        keypair_bytes.zeroize();

        let signing_key = signing_key
            .map_err(|_| DecodeError::InvalidKey("secret key does not match its public half"))?;
        Ok(Self::from_signing_key(signing_key))
    }
}

/// A secret key together with its public key.
#[derive(Clone)]
pub struct KeyPair {
    /// The secret half.
    pub secret_key: SecretKey,
    /// The public half.
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair from a random seed.
    pub fn new() -> Result<Self, Error> {
        let mut seed = generate_random_seed()?;
        let secret_key = SecretKey::from_signing_key(SigningKey::from_bytes(&seed));
        seed.zeroize();

        Ok(Self {
            public_key: secret_key.public_key(),
            secret_key,
        })
    }
}

impl Encode for KeyPair {
    fn encode(&self) -> Value {
        cbor::map(vec![
            (0, self.secret_key.encode()),
            (1, self.public_key.encode()),
        ])
    }
}

impl Decode for KeyPair {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut secret_key = None;
        let mut public_key = None;
        for (key, value) in cbor::entries(value, "KeyPair")? {
            match key {
                0 => secret_key = Some(SecretKey::decode(value)?),
                1 => public_key = Some(PublicKey::decode(value)?),
                _ => {}
            }
        }

        let secret_key = cbor::required(secret_key, "KeyPair.secret_key")?;
        let public_key = cbor::required(public_key, "KeyPair.public_key")?;
        if secret_key.public_key() != public_key {
            return Err(DecodeError::InvalidKey("key pair halves do not match"));
        }

        Ok(Self {
            secret_key,
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_and_verification() {
        let key_pair = KeyPair::new().unwrap();
        let message = b"This is a test message";

        let signature = key_pair.secret_key.sign(message);
        assert!(key_pair.public_key.verify(&signature, message));

        let modified_message = b"This is a modified message";
        assert!(!key_pair.public_key.verify(&signature, modified_message));

        let other = KeyPair::new().unwrap();
        assert!(!other.public_key.verify(&signature, message));
    }

    #[test]
    fn test_shared_secret_agreement() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();

        let alice_shared = alice.secret_key.shared_secret(&bob.public_key);
        let bob_shared = bob.secret_key.shared_secret(&alice.public_key);

        assert_eq!(alice_shared, bob_shared);
        assert_ne!(alice_shared, [0u8; 32]);
    }

    #[test]
    fn test_curve_conversion_is_deterministic() {
        let key_pair = KeyPair::new().unwrap();
        let edward = *key_pair.public_key.edward_bytes();

        let first = PublicKey::from_edward_bytes(&edward).unwrap();
        let second = PublicKey::from_edward_bytes(&edward).unwrap();

        assert_eq!(first.curve_bytes(), second.curve_bytes());
        assert_eq!(first.curve_bytes(), key_pair.public_key.curve_bytes());
    }

    #[test]
    fn test_round_tripped_keys_agree() {
        let alice = KeyPair::new().unwrap();
        let bob = KeyPair::new().unwrap();

        let encoded = cbor::to_vec(&alice.encode()).unwrap();
        let restored = KeyPair::decode(cbor::from_slice(&encoded).unwrap()).unwrap();

        assert_eq!(restored.public_key, alice.public_key);
        assert_eq!(
            restored.secret_key.shared_secret(&bob.public_key),
            alice.secret_key.shared_secret(&bob.public_key)
        );
        assert_eq!(
            bob.secret_key.shared_secret(&restored.public_key),
            bob.secret_key.shared_secret(&alice.public_key)
        );
    }

    #[test]
    fn test_mismatched_key_pair_is_rejected() {
        let first = KeyPair::new().unwrap();
        let second = KeyPair::new().unwrap();

        let value = cbor::map(vec![
            (0, first.secret_key.encode()),
            (1, second.public_key.encode()),
        ]);

        assert!(matches!(
            KeyPair::decode(value),
            Err(DecodeError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_public_key_length_is_validated() {
        let value = cbor::map(vec![(0, cbor::bytes(&[7u8; 31]))]);
        assert_eq!(
            PublicKey::decode(value),
            Err(DecodeError::InvalidArrayLen {
                field: "PublicKey.pub_edward",
                expected: 32,
                actual: 31
            })
        );
    }
}
