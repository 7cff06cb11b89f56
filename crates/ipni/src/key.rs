use crate::Error;
use ed25519_dalek::{Signer, Verifier};

/// Keypair is the service's ed25519 identity, used to sign
/// advertisements and head records.
#[derive(Clone)]
pub struct Keypair {
    signing: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Parse a base64-encoded 32-byte ed25519 secret, as carried in
    /// service configuration.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = base64::decode(encoded).map_err(|_| Error::InvalidKey)?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| Error::InvalidKey)?;
        Ok(Self {
            signing: ed25519_dalek::SigningKey::from_bytes(&secret),
        })
    }

    pub fn generate() -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// The peer identifier bound to this key: base-58 of the public key
    /// with a leading `z`.
    pub fn peer_id(&self) -> String {
        peer_id(&self.public_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", self.peer_id())
    }
}

pub fn peer_id(public: &[u8; 32]) -> String {
    format!("z{}", bs58::encode(public).into_string())
}

/// Verify `signature` over `message` against a raw public key.
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), Error> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public).map_err(|_| Error::InvalidKey)?;
    let signature: [u8; 64] = signature.try_into().map_err(|_| Error::BadSignature)?;
    key.verify(message, &ed25519_dalek::Signature::from_bytes(&signature))
        .map_err(|_| Error::BadSignature)
}
