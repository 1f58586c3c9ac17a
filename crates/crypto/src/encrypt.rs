use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use ghosttalk_core::{NONCE_LEN, TAG_LEN};

#[derive(Error, Debug)]
pub enum EncryptError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key")]
    InvalidKey,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
}

/// Seal `plaintext` under `key` into a nonce-prefixed region:
/// `nonce[12] ‖ ciphertext ‖ tag[16]`, `plaintext.len() + 28` bytes total.
///
/// Each call draws a fresh random nonce, so sealing the same plaintext
/// twice never reuses a (key, nonce) pair.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a nonce-prefixed region produced by [`seal`].
pub fn open(key: &[u8; 32], region: &[u8]) -> Result<Vec<u8>, EncryptError> {
    if region.len() < NONCE_LEN + TAG_LEN {
        return Err(EncryptError::CiphertextTooShort);
    }
    let nonce = Nonce::from_slice(&region[..NONCE_LEN]);
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;
    cipher
        .decrypt(nonce, &region[NONCE_LEN..])
        .map_err(|_| EncryptError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let key = [42u8; 32];
        let plaintext = b"onion slot plaintext";

        let region = seal(&key, plaintext).unwrap();
        assert_eq!(region.len(), plaintext.len() + NONCE_LEN + TAG_LEN);

        let opened = open(&key, &region).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = [42u8; 32];
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let region = seal(&[1u8; 32], b"secret").unwrap();
        assert!(matches!(
            open(&[2u8; 32], &region),
            Err(EncryptError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_region_fails() {
        let key = [9u8; 32];
        let mut region = seal(&key, b"secret").unwrap();
        let last = region.len() - 1;
        region[last] ^= 0xff;
        assert!(open(&key, &region).is_err());
    }

    #[test]
    fn test_short_region_rejected() {
        assert!(matches!(
            open(&[0u8; 32], &[0u8; NONCE_LEN + TAG_LEN - 1]),
            Err(EncryptError::CiphertextTooShort)
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [3u8; 32];
        let region = seal(&key, b"").unwrap();
        assert_eq!(region.len(), NONCE_LEN + TAG_LEN);
        assert!(open(&key, &region).unwrap().is_empty());
    }
}
