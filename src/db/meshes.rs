//! Mesh rows and typed admin mutations

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;

/// Lifecycle status of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshStatus {
    Live,
    Processing,
    Archived,
}

impl MeshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshStatus::Live => "live",
            MeshStatus::Processing => "processing",
            MeshStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "live" => Ok(MeshStatus::Live),
            "processing" => Ok(MeshStatus::Processing),
            "archived" => Ok(MeshStatus::Archived),
            other => Err(CoreError::Internal(format!(
                "Unknown mesh status: {}",
                other
            ))),
        }
    }
}

/// Mesh row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRow {
    pub id: String,
    pub verbose_id: String,
    pub name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub description: Option<String>,
    pub rota_z: f64,
    pub rota_x: f64,
    pub rota_y: f64,
    pub center_image: Option<String>,
    pub denoise: bool,
    pub min_obs_ang: f64,
    pub orient_mesh: bool,
    pub status: MeshStatus,
    pub completed: bool,
    pub hidden: bool,
    pub preview: Option<String>,
    pub thumbnail: Option<String>,
    pub reconstructed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MeshRow {
    /// The tuning parameters handed to the reconstruction executor
    pub fn reconstruction_options(&self) -> ReconstructionOptions {
        ReconstructionOptions {
            center_image: self.center_image.clone(),
            denoise: self.denoise,
            min_obs_ang: self.min_obs_ang,
            orient_mesh: self.orient_mesh,
        }
    }

    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            verbose_id: row.get("verbose_id")?,
            name: row.get("name")?,
            country: row.get("country")?,
            state: row.get("state")?,
            district: row.get("district")?,
            description: row.get("description")?,
            rota_z: row.get("rota_z")?,
            rota_x: row.get("rota_x")?,
            rota_y: row.get("rota_y")?,
            center_image: row.get("center_image")?,
            denoise: row.get("denoise")?,
            min_obs_ang: row.get("min_obs_ang")?,
            orient_mesh: row.get("orient_mesh")?,
            status: MeshStatus::parse(&status).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "status".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?,
            completed: row.get("completed")?,
            hidden: row.get("hidden")?,
            preview: row.get("preview")?,
            thumbnail: row.get("thumbnail")?,
            reconstructed_at: row.get("reconstructed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Per-mesh pipeline tuning, frozen into the job handed to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionOptions {
    /// Image the reconstruction centers the scene on, by content hash
    pub center_image: Option<String>,
    /// Denoise inputs before feature extraction
    pub denoise: bool,
    /// Minimum observation angle (degrees) for meshing
    pub min_obs_ang: f64,
    /// Reorient the output mesh for the viewer
    pub orient_mesh: bool,
}

/// Input for creating a mesh
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeshInput {
    pub verbose_id: String,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rota_z: f64,
    #[serde(default)]
    pub rota_x: f64,
    #[serde(default)]
    pub rota_y: f64,
}

/// Create a mesh, returning the stored row
pub fn create_mesh(conn: &Connection, input: CreateMeshInput) -> Result<MeshRow, CoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_rfc3339();

    conn.execute(
        r#"
        INSERT INTO meshes (
            id, verbose_id, name, country, state, district, description,
            rota_z, rota_x, rota_y, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'live', ?, ?)
        "#,
        params![
            id,
            input.verbose_id,
            input.name,
            input.country,
            input.state,
            input.district,
            input.description,
            input.rota_z,
            input.rota_x,
            input.rota_y,
            now,
            now,
        ],
    )?;

    get_mesh(conn, &id)?.ok_or_else(|| CoreError::Internal("Mesh not found after insert".into()))
}

/// Get mesh by ID
pub fn get_mesh(conn: &Connection, id: &str) -> Result<Option<MeshRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM meshes WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(MeshRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Get mesh by its human-readable verbose ID
pub fn get_mesh_by_verbose_id(
    conn: &Connection,
    verbose_id: &str,
) -> Result<Option<MeshRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM meshes WHERE verbose_id = ?")?;
    let mut rows = stmt.query(params![verbose_id])?;

    match rows.next()? {
        Some(row) => Ok(Some(MeshRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Set the completed flag
pub fn set_completed(conn: &Connection, id: &str, completed: bool) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE meshes SET completed = ?, updated_at = ? WHERE id = ?",
        params![completed, now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}

/// Set the hidden flag
pub fn set_hidden(conn: &Connection, id: &str, hidden: bool) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE meshes SET hidden = ?, updated_at = ? WHERE id = ?",
        params![hidden, now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}

/// Set the reconstruction tuning parameters
pub fn set_reconstruction_options(
    conn: &Connection,
    id: &str,
    options: &ReconstructionOptions,
) -> Result<bool, CoreError> {
    let changes = conn.execute(
        r#"
        UPDATE meshes
        SET center_image = ?, denoise = ?, min_obs_ang = ?, orient_mesh = ?, updated_at = ?
        WHERE id = ?
        "#,
        params![
            options.center_image,
            options.denoise,
            options.min_obs_ang,
            options.orient_mesh,
            now_rfc3339(),
            id
        ],
    )?;
    Ok(changes > 0)
}

/// Set the lifecycle status
pub fn set_status(conn: &Connection, id: &str, status: MeshStatus) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE meshes SET status = ?, updated_at = ? WHERE id = ?",
        params![status.as_str(), now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn sample_input(verbose_id: &str) -> CreateMeshInput {
        CreateMeshInput {
            verbose_id: verbose_id.to_string(),
            name: "Sun Temple".to_string(),
            country: Some("India".to_string()),
            state: Some("Odisha".to_string()),
            district: None,
            description: None,
            rota_z: 0.0,
            rota_x: 0.0,
            rota_y: 90.0,
        }
    }

    #[test]
    fn create_and_fetch_by_both_ids() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, sample_input("sun-temple"))?;
            assert_eq!(mesh.status, MeshStatus::Live);
            assert!(mesh.reconstructed_at.is_none());
            assert!(!mesh.hidden);

            let by_verbose = get_mesh_by_verbose_id(conn, "sun-temple")?.unwrap();
            assert_eq!(by_verbose.id, mesh.id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn admin_flag_mutations() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, sample_input("flags"))?;

            assert!(set_completed(conn, &mesh.id, true)?);
            assert!(set_hidden(conn, &mesh.id, true)?);
            assert!(set_status(conn, &mesh.id, MeshStatus::Archived)?);

            let mesh = get_mesh(conn, &mesh.id)?.unwrap();
            assert!(mesh.completed);
            assert!(mesh.hidden);
            assert_eq!(mesh.status, MeshStatus::Archived);

            assert!(!set_completed(conn, "missing", true)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn reconstruction_tuning_defaults_and_update() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, sample_input("tuning"))?;

            // Pipeline defaults: denoise and orient on, 10 degree floor
            assert!(mesh.center_image.is_none());
            assert!(mesh.denoise);
            assert!(mesh.orient_mesh);
            assert_eq!(mesh.min_obs_ang, 10.0);

            let options = ReconstructionOptions {
                center_image: Some("sha256-aa".to_string()),
                denoise: false,
                min_obs_ang: 30.0,
                orient_mesh: false,
            };
            assert!(set_reconstruction_options(conn, &mesh.id, &options)?);

            let mesh = get_mesh(conn, &mesh.id)?.unwrap();
            assert_eq!(mesh.reconstruction_options(), options);
            Ok(())
        })
        .unwrap();
    }
}
