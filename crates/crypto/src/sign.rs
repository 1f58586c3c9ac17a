use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};

use crate::keys::NodeIdentity;

/// Sign data with the node's long-term key.
pub fn sign_data(identity: &NodeIdentity, data: &[u8]) -> [u8; 64] {
    let signature: Signature = identity.signing_key().sign(data);
    signature.to_bytes()
}

/// Verify a signature against a 32-byte Ed25519 public key.
pub fn verify_signature(pubkey: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(signature);
    verifying_key.verify(data, &signature).is_ok()
}
