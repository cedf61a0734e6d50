//! ARK registry: public resolution of minted identifiers
//!
//! Resolution reads only the immutable `arks` row and the frozen run
//! records, never the mutable mesh/contributor/image tables, so a minted
//! identifier keeps resolving even after its mesh is hidden or its
//! contributors are banned.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::commitment::verify_commitment;
use crate::db::arks;
use crate::db::runs;
use crate::error::CoreError;

/// Frozen mesh reference carried in the ARK metadata at mint time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRef {
    pub mesh_id: String,
    pub mesh_verbose_id: String,
    pub mesh_name: String,
}

/// The externally citable resolution document for one ARK
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionDocument {
    pub ark: String,
    pub naan: String,
    pub shoulder: String,
    pub assigned_name: String,
    pub url: String,
    pub commitment: String,
    pub created_at: String,
    pub run_id: String,
    pub mesh: MeshRef,
    pub image_count: usize,
    pub metadata: serde_json::Value,
}

/// Normalize user-supplied ARK spellings to the stored
/// `ark:/<naan>/<name>` form
fn normalize(ark: &str) -> String {
    let body = ark
        .trim()
        .strip_prefix("ark:")
        .unwrap_or(ark.trim())
        .trim_start_matches('/');
    format!("ark:/{}", body)
}

/// Resolve a public ARK string to its document
pub fn resolve(conn: &Connection, ark: &str) -> Result<ResolutionDocument, CoreError> {
    let normalized = normalize(ark);
    let row = arks::get_ark(conn, &normalized)?
        .ok_or_else(|| CoreError::NotFound(normalized.clone()))?;
    document_for(conn, row)
}

/// Look up the ARK minted for a run
pub fn by_run(conn: &Connection, run_id: &str) -> Result<ResolutionDocument, CoreError> {
    let row = arks::get_ark_for_run(conn, run_id)?
        .ok_or_else(|| CoreError::NotFound(format!("ARK for run {}", run_id)))?;
    document_for(conn, row)
}

fn document_for(conn: &Connection, row: arks::ArkRow) -> Result<ResolutionDocument, CoreError> {
    let metadata: serde_json::Value = serde_json::from_str(&row.metadata)?;
    let mesh: MeshRef = serde_json::from_value(metadata.clone())?;
    let image_count = runs::frozen_images(conn, &row.run_id)?.len();

    Ok(ResolutionDocument {
        ark: row.ark,
        naan: row.naan,
        shoulder: row.shoulder,
        assigned_name: row.assigned_name,
        url: row.url,
        commitment: row.commitment,
        created_at: row.created_at,
        run_id: row.run_id,
        mesh,
        image_count,
        metadata,
    })
}

/// Recompute an ARK's commitment from the frozen run records and compare
/// it against the stored value. An honest registry always returns true;
/// false means the frozen rows no longer match what was committed to.
pub fn audit(conn: &Connection, ark: &str) -> Result<bool, CoreError> {
    let normalized = normalize(ark);
    let row = arks::get_ark(conn, &normalized)?
        .ok_or_else(|| CoreError::NotFound(normalized.clone()))?;
    let run = runs::get_run(conn, &row.run_id)?
        .ok_or_else(|| CoreError::NotFound(format!("run {}", row.run_id)))?;
    let image_hashes = runs::frozen_image_hashes(conn, &row.run_id)?;
    let artifact_hash = run
        .artifact_hash
        .ok_or_else(|| CoreError::Internal(format!("Run {} has no artifact hash", run.id)))?;

    Ok(verify_commitment(
        &row.commitment,
        &image_hashes,
        &artifact_hash,
        &run.mesh_id,
        &run.id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_normalize_to_stored_form() {
        assert_eq!(normalize("ark:/99999/t1abc"), "ark:/99999/t1abc");
        assert_eq!(normalize("ark:99999/t1abc"), "ark:/99999/t1abc");
        assert_eq!(normalize("99999/t1abc"), "ark:/99999/t1abc");
        assert_eq!(normalize("  ark:/99999/t1abc"), "ark:/99999/t1abc");
    }
}
