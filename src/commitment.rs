//! Commitment scheme binding an ARK to its frozen inputs
//!
//! The commitment is a SHA256 over the ordered content hashes of the frozen
//! image set, the artifact content hash, and the mesh/run identifiers. Every
//! field is length-prefixed and the image count is hashed up front, so the
//! byte stream decodes to exactly one input set. A verifier holding the
//! disclosed image list and artifact can recompute the value independently.

use sha2::{Digest, Sha256};

/// Domain separator hashed before any field
const DOMAIN_TAG: &[u8] = b"reliquary-commitment-v1";

/// Compute the commitment for a frozen run.
///
/// `image_hashes` must be the snapshot sequence in selection order, each a
/// `sha256-<hex>` content hash. The output uses the same rendering.
pub fn compute_commitment(
    image_hashes: &[String],
    artifact_hash: &str,
    mesh_id: &str,
    run_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    hasher.update((image_hashes.len() as u64).to_le_bytes());
    for image_hash in image_hashes {
        update_field(&mut hasher, image_hash.as_bytes());
    }
    update_field(&mut hasher, artifact_hash.as_bytes());
    update_field(&mut hasher, mesh_id.as_bytes());
    update_field(&mut hasher, run_id.as_bytes());
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

fn update_field(hasher: &mut Sha256, data: &[u8]) {
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(data);
}

/// Recompute a commitment from disclosed inputs and compare it to a stored
/// value. Returns true when they match.
pub fn verify_commitment(
    stored: &str,
    image_hashes: &[String],
    artifact_hash: &str,
    mesh_id: &str,
    run_id: &str,
) -> bool {
    compute_commitment(image_hashes, artifact_hash, mesh_id, run_id) == stored
}

/// Compute the `sha256-<hex>` content hash of raw bytes.
///
/// Used for image and artifact content addressing; the blob bytes
/// themselves live in an external store.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hashes() -> Vec<String> {
        vec![
            content_hash(b"image one"),
            content_hash(b"image two"),
            content_hash(b"image three"),
        ]
    }

    #[test]
    fn commitment_is_reproducible() {
        let images = sample_hashes();
        let a = compute_commitment(&images, "sha256-aa", "mesh-1", "run-1");
        let b = compute_commitment(&images, "sha256-aa", "mesh-1", "run-1");
        assert_eq!(a, b);
        assert!(verify_commitment(&a, &images, "sha256-aa", "mesh-1", "run-1"));
    }

    #[test]
    fn single_flipped_byte_changes_commitment() {
        let images = sample_hashes();
        let original = compute_commitment(&images, "sha256-aa", "mesh-1", "run-1");

        let mut tampered_bytes = b"image two".to_vec();
        tampered_bytes[0] ^= 0x01;
        let mut tampered = images.clone();
        tampered[1] = content_hash(&tampered_bytes);

        let recomputed = compute_commitment(&tampered, "sha256-aa", "mesh-1", "run-1");
        assert_ne!(original, recomputed);
        assert!(!verify_commitment(
            &original, &tampered, "sha256-aa", "mesh-1", "run-1"
        ));
    }

    #[test]
    fn image_order_is_part_of_the_commitment() {
        let images = sample_hashes();
        let mut reversed = images.clone();
        reversed.reverse();
        assert_ne!(
            compute_commitment(&images, "sha256-aa", "mesh-1", "run-1"),
            compute_commitment(&reversed, "sha256-aa", "mesh-1", "run-1"),
        );
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        // Moving bytes between adjacent fields must change the digest.
        let a = compute_commitment(&["sha256-ab".into()], "sha256-cd", "m", "r");
        let b = compute_commitment(&["sha256-abs".into()], "ha256-cd", "m", "r");
        assert_ne!(a, b);
    }
}
