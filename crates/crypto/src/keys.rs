use std::path::Path;

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use ghosttalk_core::SessionId;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Key file has wrong length")]
    BadKeyFile,
}

/// Convert a 32-byte Ed25519 seed to an X25519 static secret.
/// SHA-512 + clamp per RFC 7748 §5, never a plain seed copy.
pub fn ed25519_seed_to_x25519(seed: &[u8; 32]) -> StaticSecret {
    let hash = Sha512::digest(seed);
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash[..32]);
    key[0] &= 248;
    key[31] &= 127;
    key[31] |= 64;
    StaticSecret::from(key)
}

/// Convert a compressed Ed25519 public key to X25519 Montgomery form.
pub fn ed25519_pubkey_to_x25519(pubkey: &[u8; 32]) -> Result<X25519Public, KeyError> {
    let point = CompressedEdwardsY(*pubkey)
        .decompress()
        .ok_or(KeyError::InvalidPublicKey)?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

/// A node's long-term identity: one Ed25519 key pair, with the X25519
/// encryption secret derived from the same seed.
///
/// The Ed25519 public key doubles as the node id (and, on clients, as the
/// Session ID).
pub struct NodeIdentity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    encryption_secret: StaticSecret,
}

impl Clone for NodeIdentity {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl NodeIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_seed(&signing_key.to_bytes())
    }

    /// Rebuild an identity from its 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        let encryption_secret = ed25519_seed_to_x25519(seed);
        Self {
            signing_key,
            verifying_key,
            encryption_secret,
        }
    }

    /// Load the seed from `path`, or generate one and persist it (0600).
    pub fn load_or_generate(path: &Path) -> Result<Self, KeyError> {
        if path.exists() {
            let bytes = std::fs::read(path)?;
            let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| KeyError::BadKeyFile)?;
            return Ok(Self::from_seed(&seed));
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, identity.signing_key.to_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(identity)
    }

    /// The node's public identity.
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Identity interpreted as a client Session ID.
    pub fn session_id(&self) -> SessionId {
        self.public_key()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// X25519 public key peers use for onion ECDH.
    pub fn encryption_public(&self) -> [u8; 32] {
        X25519Public::from(&self.encryption_secret).to_bytes()
    }

    /// ECDH against an ephemeral public key from a packet header.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519Public::from(*their_public);
        *self.encryption_secret.diffie_hellman(&their_public).as_bytes()
    }
}
