//! Run rows, frozen snapshots, and guarded status updates
//!
//! The functions here are the persistence half of the run state machine.
//! Every status update is guarded by a `WHERE status = ...` clause so a
//! stale caller changes nothing; the orchestrator layers transition
//! semantics (idempotence, InvalidTransition) on top of the row counts
//! these return.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;
use crate::selector::SelectedImage;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::Internal(format!("Unknown run status: {}", other))),
        }
    }

    /// Queued and running runs block new run creation for their mesh
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// Artifact reference reported by the executor for a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Output directory or blob-store prefix holding the mesh artifact
    pub directory: String,
    /// `sha256-` content hash of the artifact
    pub artifact_hash: String,
    /// Preview render, if the executor produced one
    pub preview: Option<String>,
    /// Thumbnail render, if the executor produced one
    pub thumbnail: Option<String>,
}

/// Run row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    pub id: String,
    pub mesh_id: String,
    pub status: RunStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub directory: Option<String>,
    pub artifact_hash: Option<String>,
    pub preview: Option<String>,
    pub thumbnail: Option<String>,
    pub error: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            mesh_id: row.get("mesh_id")?,
            status: RunStatus::parse(&status).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "status".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            directory: row.get("directory")?,
            artifact_hash: row.get("artifact_hash")?,
            preview: row.get("preview")?,
            thumbnail: row.get("thumbnail")?,
            error: row.get("error")?,
        })
    }
}

/// One entry of a run's frozen image snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunImageRow {
    pub run_id: String,
    pub position: i64,
    pub image_id: String,
    pub content_hash: String,
}

/// Persist a new queued run with its frozen image/contributor snapshot.
///
/// The insert contends on the partial unique index over active runs; a
/// second active run for the same mesh fails there atomically and is
/// surfaced as `Conflict`. The snapshot is copied by value so later
/// moderation edits and bans cannot reach it.
pub fn insert_run(
    conn: &mut Connection,
    mesh_id: &str,
    images: &[SelectedImage],
) -> Result<RunRow, CoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        "INSERT INTO runs (id, mesh_id, status, started_at) VALUES (?, ?, 'queued', ?)",
        params![id, mesh_id, now_rfc3339()],
    );
    match inserted {
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(CoreError::Conflict(mesh_id.to_string()));
        }
        other => {
            other?;
        }
    }

    for (position, image) in images.iter().enumerate() {
        tx.execute(
            r#"
            INSERT INTO run_images (run_id, position, image_id, content_hash)
            VALUES (?, ?, ?, ?)
            "#,
            params![id, position as i64, image.image_id, image.content_hash],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO run_contributors (run_id, contributor_id) VALUES (?, ?)",
            params![id, image.contributor_id],
        )?;
    }

    tx.commit()?;

    get_run(conn, &id)?.ok_or_else(|| CoreError::Internal("Run not found after insert".into()))
}

/// Get run by ID
pub fn get_run(conn: &Connection, id: &str) -> Result<Option<RunRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM runs WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(RunRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// List runs for a mesh, newest first
pub fn list_for_mesh(conn: &Connection, mesh_id: &str) -> Result<Vec<RunRow>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT * FROM runs WHERE mesh_id = ? ORDER BY started_at DESC, id DESC")?;

    let rows = stmt.query_map(params![mesh_id], |row| RunRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List runs with a given status, oldest first
pub fn list_by_status(conn: &Connection, status: RunStatus) -> Result<Vec<RunRow>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT * FROM runs WHERE status = ? ORDER BY started_at ASC, id ASC")?;

    let rows = stmt.query_map(params![status.as_str()], |row| RunRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Active runs whose `started_at` predates the cutoff timestamp
pub fn list_stale_active(conn: &Connection, cutoff: &str) -> Result<Vec<RunRow>, CoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM runs
        WHERE status IN ('queued', 'running') AND started_at < ?
        ORDER BY started_at ASC
        "#,
    )?;

    let rows = stmt.query_map(params![cutoff], |row| RunRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Succeeded runs that have no ARK yet (recovery sweep input)
pub fn list_succeeded_without_ark(conn: &Connection) -> Result<Vec<RunRow>, CoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.* FROM runs r
        LEFT JOIN arks a ON a.run_id = r.id
        WHERE r.status = 'succeeded' AND a.ark IS NULL
        ORDER BY r.started_at ASC
        "#,
    )?;

    let rows = stmt.query_map([], |row| RunRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Frozen image snapshot in selection order
pub fn frozen_images(conn: &Connection, run_id: &str) -> Result<Vec<RunImageRow>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT * FROM run_images WHERE run_id = ? ORDER BY position ASC")?;

    let rows = stmt.query_map(params![run_id], |row| {
        Ok(RunImageRow {
            run_id: row.get("run_id")?,
            position: row.get("position")?,
            image_id: row.get("image_id")?,
            content_hash: row.get("content_hash")?,
        })
    })?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Content hashes of the frozen snapshot in selection order
pub fn frozen_image_hashes(conn: &Connection, run_id: &str) -> Result<Vec<String>, CoreError> {
    Ok(frozen_images(conn, run_id)?
        .into_iter()
        .map(|row| row.content_hash)
        .collect())
}

/// Contributors captured in the frozen snapshot
pub fn frozen_contributors(conn: &Connection, run_id: &str) -> Result<Vec<String>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT contributor_id FROM run_contributors WHERE run_id = ? ORDER BY contributor_id ASC",
    )?;

    let rows = stmt.query_map(params![run_id], |row| row.get(0))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// queued -> running. Returns the number of rows changed (0 when the run
/// was not queued).
pub fn mark_running(conn: &Connection, run_id: &str) -> Result<usize, CoreError> {
    Ok(conn.execute(
        "UPDATE runs SET status = 'running' WHERE id = ? AND status = 'queued'",
        params![run_id],
    )?)
}

/// running -> succeeded, recording the artifact reference
pub fn mark_succeeded(
    conn: &Connection,
    run_id: &str,
    artifact: &ArtifactRef,
) -> Result<usize, CoreError> {
    Ok(conn.execute(
        r#"
        UPDATE runs
        SET status = 'succeeded', ended_at = ?, directory = ?, artifact_hash = ?,
            preview = ?, thumbnail = ?
        WHERE id = ? AND status = 'running'
        "#,
        params![
            now_rfc3339(),
            artifact.directory,
            artifact.artifact_hash,
            artifact.preview,
            artifact.thumbnail,
            run_id
        ],
    )?)
}

/// queued/running -> failed, recording the reason
pub fn mark_failed(conn: &Connection, run_id: &str, reason: &str) -> Result<usize, CoreError> {
    Ok(conn.execute(
        r#"
        UPDATE runs SET status = 'failed', ended_at = ?, error = ?
        WHERE id = ? AND status IN ('queued', 'running')
        "#,
        params![now_rfc3339(), reason, run_id],
    )?)
}
