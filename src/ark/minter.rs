//! ARK minting: noid-style name allocation plus the commitment binding
//!
//! Assigned names are drawn from the noid betanumeric alphabet (vowels
//! excluded so names never spell words) and carry a trailing check
//! character computed over `naan/shoulder+name`, which catches single-char
//! typos and transpositions at resolution time. Allocation is a
//! collision-checked random draw, retried a bounded number of times.

use rand::Rng;
use rusqlite::{params, Connection};
use serde_json::json;
use tracing::{info, warn};

use crate::commitment::compute_commitment;
use crate::config::Config;
use crate::db::arks::{self, ArkRow, InsertArkInput};
use crate::db::{meshes, now_rfc3339, runs};
use crate::db::runs::RunStatus;
use crate::error::CoreError;

/// Betanumeric alphabet used by noid identifiers
pub const NOID_ALPHABET: &[u8] = b"0123456789bcdfghjkmnpqrstvwxz";

/// Bounded allocation retries before surfacing a fatal conflict
const MAX_MINT_ATTEMPTS: u32 = 10;

/// Minting parameters scoped by issuer
#[derive(Debug, Clone)]
pub struct MintConfig {
    pub naan: String,
    pub shoulder: String,
    pub name_length: usize,
    pub resolver_base: String,
}

impl From<&Config> for MintConfig {
    fn from(config: &Config) -> Self {
        Self {
            naan: config.naan.clone(),
            shoulder: config.shoulder.clone(),
            name_length: config.name_length,
            resolver_base: config.resolver_base.clone(),
        }
    }
}

/// Compute the noid check character over an identifier body
/// (`naan/shoulder+name`, no `ark:/` prefix). Characters outside the
/// alphabet (the `/` separator) contribute zero, per the noid algorithm.
pub fn check_char(id: &str) -> char {
    let sum: usize = id
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let value = NOID_ALPHABET.iter().position(|&a| a == b).unwrap_or(0);
            value * (i + 1)
        })
        .sum();
    NOID_ALPHABET[sum % NOID_ALPHABET.len()] as char
}

/// Draw a random betanumeric string
fn draw_base(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| NOID_ALPHABET[rng.gen_range(0..NOID_ALPHABET.len())] as char)
        .collect()
}

/// Mint the ARK for a succeeded run. Idempotent: if the run already has an
/// ARK, that ARK is returned unchanged.
///
/// Persists the ARK row and applies the mesh side of the mint
/// (`reconstructed_at`, preview, thumbnail) on the same connection, so a
/// caller running inside a transaction gets both or neither.
pub fn mint(conn: &Connection, run_id: &str, config: &MintConfig) -> Result<ArkRow, CoreError> {
    if let Some(existing) = arks::get_ark_for_run(conn, run_id)? {
        return Ok(existing);
    }

    let run = runs::get_run(conn, run_id)?
        .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;
    if run.status != RunStatus::Succeeded {
        return Err(CoreError::InvalidTransition {
            from: run.status.as_str().to_string(),
            to: "minted".to_string(),
        });
    }

    let image_hashes = runs::frozen_image_hashes(conn, run_id)?;
    let artifact_hash = run.artifact_hash.clone().ok_or_else(|| {
        CoreError::Internal(format!("Succeeded run {} has no artifact hash", run_id))
    })?;
    let commitment = compute_commitment(&image_hashes, &artifact_hash, &run.mesh_id, &run.id);

    let mesh = meshes::get_mesh(conn, &run.mesh_id)?
        .ok_or_else(|| CoreError::NotFound(format!("mesh {}", run.mesh_id)))?;

    // Frozen into the ARK row so resolution never reads the mutable tables
    let metadata = json!({
        "mesh_id": mesh.id,
        "mesh_verbose_id": mesh.verbose_id,
        "mesh_name": mesh.name,
        "run_id": run.id,
        "image_count": image_hashes.len(),
        "artifact_hash": artifact_hash,
        "directory": run.directory,
    })
    .to_string();

    let mut last_err = CoreError::UniquenessConflict {
        naan: config.naan.clone(),
        shoulder: config.shoulder.clone(),
        attempts: 0,
    };

    for attempt in 1..=MAX_MINT_ATTEMPTS {
        let base = draw_base(config.name_length);
        let body = format!("{}/{}{}", config.naan, config.shoulder, base);
        let assigned_name = format!("{}{}", base, check_char(&body));

        if arks::name_exists(conn, &config.naan, &config.shoulder, &assigned_name)? {
            warn!(
                attempt,
                naan = %config.naan,
                shoulder = %config.shoulder,
                "Assigned name collision, redrawing"
            );
            continue;
        }

        let url = format!(
            "{}/ark:/{}/{}{}",
            config.resolver_base, config.naan, config.shoulder, assigned_name
        );

        match arks::insert_ark(
            conn,
            InsertArkInput {
                naan: config.naan.clone(),
                shoulder: config.shoulder.clone(),
                assigned_name,
                run_id: run.id.clone(),
                url,
                metadata: metadata.clone(),
                commitment: commitment.clone(),
            },
        ) {
            Ok(ark) => {
                apply_mesh_mint(conn, &run, &ark)?;
                info!(ark = %ark.ark, run_id = %run.id, mesh_id = %run.mesh_id, "Minted ARK");
                return Ok(ark);
            }
            Err(CoreError::UniquenessConflict { naan, shoulder, .. }) => {
                last_err = CoreError::UniquenessConflict {
                    naan,
                    shoulder,
                    attempts: attempt,
                };
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err)
}

/// The mesh half of a mint: first successful reconstruction timestamp plus
/// the preview/thumbnail renders from the run artifact.
fn apply_mesh_mint(conn: &Connection, run: &runs::RunRow, ark: &ArkRow) -> Result<(), CoreError> {
    let reconstructed_at = run.ended_at.clone().unwrap_or_else(now_rfc3339);
    conn.execute(
        r#"
        UPDATE meshes
        SET reconstructed_at = ?,
            preview = COALESCE(?, preview),
            thumbnail = COALESCE(?, thumbnail),
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            reconstructed_at,
            run.preview,
            run.thumbnail,
            ark.created_at,
            run.mesh_id
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_char_is_deterministic_and_in_alphabet() {
        let a = check_char("99999/t1abcd1234");
        let b = check_char("99999/t1abcd1234");
        assert_eq!(a, b);
        assert!(NOID_ALPHABET.contains(&(a as u8)));
    }

    #[test]
    fn check_char_detects_transposition() {
        let original = check_char("99999/t1bc");
        let transposed = check_char("99999/t1cb");
        assert_ne!(original, transposed);
    }

    #[test]
    fn drawn_bases_use_only_the_noid_alphabet() {
        let base = draw_base(64);
        assert_eq!(base.len(), 64);
        assert!(base.bytes().all(|b| NOID_ALPHABET.contains(&b)));
    }
}
