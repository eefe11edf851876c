//! Domain-separated event signing.
//!
//! Crypto is a capability: stages that need to sign (event creation) hold a
//! [`Signer`]; stages that verify (signature validation) use
//! [`verify_event_signature`] with keys from the address book. The domain
//! tag prevents an event signature from being replayed in another context.

use crate::Hash;
use ed25519_dalek::{Signer as _, Verifier as _};
use std::fmt;

/// Domain tag for event signatures.
///
/// Format: `BRAID_EVENT` || event hash
pub const DOMAIN_EVENT: &[u8] = b"BRAID_EVENT";

/// Build the signing message for an event.
///
/// The signature covers the event hash, which in turn covers the canonical
/// encoding of the hashed contents.
pub fn event_signing_message(hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_EVENT.len() + Hash::BYTES);
    message.extend_from_slice(DOMAIN_EVENT);
    message.extend_from_slice(hash.as_bytes());
    message
}

/// An ed25519 public key as stored in the address book.
#[derive(Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct PublicKey(pub [u8; 32]);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pk:{}..", &hex::encode(self.0)[..8])
    }
}

/// An ed25519 signature over an event signing message.
#[derive(Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EventSignature(pub [u8; 64]);

impl EventSignature {
    /// All-zero signature, used by fixtures that skip verification.
    pub fn zero() -> Self {
        Self([0u8; 64])
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for EventSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}..", &hex::encode(self.0)[..8])
    }
}

/// Signing capability for event creation.
pub trait Signer: Send + Sync {
    /// Sign an event signing message.
    fn sign(&self, message: &[u8]) -> EventSignature;

    /// The public key that verifies this signer's signatures.
    fn public_key(&self) -> PublicKey;
}

/// Ed25519 signer backed by an in-memory key.
pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    /// Create a signer from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Generate a fresh random signer.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> EventSignature {
        EventSignature(self.key.sign(message).to_bytes())
    }

    fn public_key(&self) -> PublicKey {
        PublicKey(self.key.verifying_key().to_bytes())
    }
}

/// Verify an event signature against a public key from the address book.
///
/// Returns `false` for malformed keys as well as signature mismatches; the
/// caller drops the event either way.
pub fn verify_event_signature(public_key: &PublicKey, hash: &Hash, signature: &EventSignature) -> bool {
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    key.verify(&event_signing_message(hash), &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]);
        let hash = Hash::from_bytes(b"event");
        let sig = signer.sign(&event_signing_message(&hash));
        assert!(verify_event_signature(&signer.public_key(), &hash, &sig));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]);
        let other = Ed25519Signer::from_seed(&[8u8; 32]);
        let hash = Hash::from_bytes(b"event");
        let sig = signer.sign(&event_signing_message(&hash));
        assert!(!verify_event_signature(&other.public_key(), &hash, &sig));
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let signer = Ed25519Signer::from_seed(&[7u8; 32]);
        let hash = Hash::from_bytes(b"event");
        let sig = signer.sign(&event_signing_message(&hash));
        let tampered = Hash::from_bytes(b"other event");
        assert!(!verify_event_signature(&signer.public_key(), &tampered, &sig));
    }
}
