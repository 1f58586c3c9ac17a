//! Per-hop key schedule and Sphinx blinding.
//!
//! Every hop derives its working keys from the ECDH shared secret with the
//! packet's (blinded) ephemeral key. The HKDF output splits into the slot
//! encryption key, the header HMAC key, and the blinding factor carried to
//! the next hop.

use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const HKDF_SALT: &[u8] = b"GhostTalk-v1";
const HKDF_INFO: &[u8] = b"GhostTalk-v1-hop-keys";

/// Working keys for one hop.
pub struct HopKeys {
    /// ChaCha20-Poly1305 key for this hop's routing slot (and, at the final
    /// hop, the payload region)
    pub enc_key: [u8; 32],
    /// Header HMAC key
    pub hmac_key: [u8; 32],
    /// Factor by which the ephemeral key is blinded before forwarding
    pub blinding: [u8; 32],
}

/// Derive the hop keys: 96 bytes of HKDF-SHA256 output split three ways.
pub fn derive_hop_keys(shared_secret: &[u8; 32]) -> HopKeys {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let mut okm = [0u8; 96];
    hk.expand(HKDF_INFO, &mut okm)
        .expect("96 bytes is a valid HKDF-SHA256 output length");

    let mut keys = HopKeys {
        enc_key: [0u8; 32],
        hmac_key: [0u8; 32],
        blinding: [0u8; 32],
    };
    keys.enc_key.copy_from_slice(&okm[..32]);
    keys.hmac_key.copy_from_slice(&okm[32..64]);
    keys.blinding.copy_from_slice(&okm[64..]);
    keys
}

/// HMAC-SHA256 over `ephemeral ‖ routing_blob`, the packet's header HMAC.
pub fn header_hmac(hmac_key: &[u8; 32], ephemeral: &[u8; 32], routing_blob: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(hmac_key)
        .expect("HMAC-SHA256 accepts 32-byte keys");
    mac.update(ephemeral);
    mac.update(routing_blob);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of the packet's header HMAC against the
/// locally computed value.
pub fn verify_header_hmac(
    hmac_key: &[u8; 32],
    ephemeral: &[u8; 32],
    routing_blob: &[u8],
    claimed: &[u8; 32],
) -> bool {
    let expected = header_hmac(hmac_key, ephemeral, routing_blob);
    expected.as_slice().ct_eq(claimed.as_slice()).into()
}

/// Blind a Curve25519 point by a derived factor: `factor · point` on the
/// Montgomery curve. The factor is reduced mod the group order; the scalar
/// is applied unclamped so blinding factors compose across hops.
///
/// Per-hop key agreement only holds because scalar multiplication
/// commutes; XOR or any other non-group operation breaks it.
pub fn blind_point(factor: &[u8; 32], point: &[u8; 32]) -> [u8; 32] {
    let scalar = Scalar::from_bytes_mod_order(*factor);
    (MontgomeryPoint(*point) * scalar).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NodeIdentity;
    use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

    #[test]
    fn test_key_schedule_is_deterministic_and_split() {
        let keys_a = derive_hop_keys(&[5u8; 32]);
        let keys_b = derive_hop_keys(&[5u8; 32]);
        assert_eq!(keys_a.enc_key, keys_b.enc_key);
        assert_eq!(keys_a.hmac_key, keys_b.hmac_key);
        assert_eq!(keys_a.blinding, keys_b.blinding);

        // The three keys are distinct material
        assert_ne!(keys_a.enc_key, keys_a.hmac_key);
        assert_ne!(keys_a.hmac_key, keys_a.blinding);

        // A different secret yields different keys
        let other = derive_hop_keys(&[6u8; 32]);
        assert_ne!(other.enc_key, keys_a.enc_key);
    }

    #[test]
    fn test_header_hmac_verify() {
        let key = [1u8; 32];
        let ephemeral = [2u8; 32];
        let blob = vec![3u8; 615];

        let mac = header_hmac(&key, &ephemeral, &blob);
        assert!(verify_header_hmac(&key, &ephemeral, &blob, &mac));

        let mut wrong = mac;
        wrong[0] ^= 1;
        assert!(!verify_header_hmac(&key, &ephemeral, &blob, &wrong));

        let mut tampered_blob = blob.clone();
        tampered_blob[100] ^= 1;
        assert!(!verify_header_hmac(&key, &ephemeral, &tampered_blob, &mac));
    }

    #[test]
    fn test_blinding_commutes_with_dh() {
        // The forwarding hop blinds the ephemeral key; the next hop runs
        // plain X25519 against the blinded key. The circuit builder must be
        // able to predict that shared secret from the other side:
        //   DH(x2, b1·E0) == b1 · DH(e0, X2)
        let ephemeral_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral_secret).to_bytes();

        let hop2 = NodeIdentity::generate();
        let blinding = derive_hop_keys(&[9u8; 32]).blinding;

        // Node side: hop 2 receives the blinded ephemeral
        let blinded = blind_point(&blinding, &ephemeral_public);
        let node_side = hop2.diffie_hellman(&blinded);

        // Client side: blind the unblinded DH result instead
        let dh = ephemeral_secret
            .diffie_hellman(&X25519Public::from(hop2.encryption_public()));
        let client_side = blind_point(&blinding, dh.as_bytes());

        assert_eq!(node_side, client_side);
    }

    #[test]
    fn test_blinding_changes_the_point() {
        let point = X25519Public::from(&StaticSecret::random_from_rng(rand::rngs::OsRng))
            .to_bytes();
        let blinded = blind_point(&derive_hop_keys(&[1u8; 32]).blinding, &point);
        assert_ne!(blinded, point);
    }

    #[test]
    fn test_hmac_compare_timing_within_noise() {
        // Smoke check on the constant-time property: matching and
        // mismatching comparisons should not differ by an order of
        // magnitude. Not a precise side-channel test, just a tripwire
        // against an accidental early-exit compare.
        let key = [1u8; 32];
        let ephemeral = [2u8; 32];
        let blob = vec![3u8; 615];
        let good = header_hmac(&key, &ephemeral, &blob);
        let mut bad = good;
        bad[0] ^= 0xff;

        let time = |claimed: &[u8; 32]| {
            let start = std::time::Instant::now();
            for _ in 0..2000 {
                std::hint::black_box(verify_header_hmac(&key, &ephemeral, &blob, claimed));
            }
            start.elapsed().as_nanos() as f64
        };
        // Warm up, then measure
        time(&good);
        let t_good = time(&good);
        let t_bad = time(&bad);
        let ratio = t_good.max(t_bad) / t_good.min(t_bad);
        assert!(ratio < 10.0, "suspicious timing ratio {ratio}");
    }
}
