//! Contribution rows linking contributors to meshes

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;

/// Contribution row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionRow {
    pub id: String,
    pub mesh_id: String,
    pub contributor_id: String,
    pub contributed_at: String,
    pub processed: bool,
    pub processed_at: Option<String>,
}

impl ContributionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            mesh_id: row.get("mesh_id")?,
            contributor_id: row.get("contributor_id")?,
            contributed_at: row.get("contributed_at")?,
            processed: row.get("processed")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// Record a submission event
pub fn create_contribution(
    conn: &Connection,
    mesh_id: &str,
    contributor_id: &str,
) -> Result<ContributionRow, CoreError> {
    let id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        r#"
        INSERT INTO contributions (id, mesh_id, contributor_id, contributed_at)
        VALUES (?, ?, ?, ?)
        "#,
        params![id, mesh_id, contributor_id, now_rfc3339()],
    )?;

    get_contribution(conn, &id)?
        .ok_or_else(|| CoreError::Internal("Contribution not found after insert".into()))
}

/// Get contribution by ID
pub fn get_contribution(conn: &Connection, id: &str) -> Result<Option<ContributionRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM contributions WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(ContributionRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// List contributions for a mesh in submission order
pub fn list_for_mesh(conn: &Connection, mesh_id: &str) -> Result<Vec<ContributionRow>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM contributions WHERE mesh_id = ? ORDER BY contributed_at ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![mesh_id], |row| ContributionRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Mark a contribution as processed once its images have been through
/// moderation and considered by a selection pass
pub fn mark_processed(conn: &Connection, id: &str) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE contributions SET processed = 1, processed_at = ? WHERE id = ?",
        params![now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contributors::create_contributor;
    use crate::db::meshes::{create_mesh, CreateMeshInput};
    use crate::db::Db;

    #[test]
    fn processed_starts_false_and_flips_once_marked() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(
                conn,
                CreateMeshInput {
                    verbose_id: "stupa".into(),
                    name: "Stupa".into(),
                    country: None,
                    state: None,
                    district: None,
                    description: None,
                    rota_z: 0.0,
                    rota_x: 0.0,
                    rota_y: 0.0,
                },
            )?;
            let person = create_contributor(conn, "Ravi", "ravi@example.org")?;

            let contribution = create_contribution(conn, &mesh.id, &person.id)?;
            assert!(!contribution.processed);
            assert!(contribution.processed_at.is_none());

            assert!(mark_processed(conn, &contribution.id)?);
            let contribution = get_contribution(conn, &contribution.id)?.unwrap();
            assert!(contribution.processed);
            assert!(contribution.processed_at.is_some());

            assert_eq!(list_for_mesh(conn, &mesh.id)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
