//! Contributor rows and ban administration

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;

/// Contributor row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributorRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ContributorRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            banned: row.get("banned")?,
            ban_reason: row.get("ban_reason")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Create a contributor
pub fn create_contributor(
    conn: &Connection,
    name: &str,
    email: &str,
) -> Result<ContributorRow, CoreError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO contributors (id, name, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        params![id, name, email, now, now],
    )?;

    get_contributor(conn, &id)?
        .ok_or_else(|| CoreError::Internal("Contributor not found after insert".into()))
}

/// Get contributor by ID
pub fn get_contributor(conn: &Connection, id: &str) -> Result<Option<ContributorRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM contributors WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(ContributorRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Ban a contributor with a reason.
///
/// Not retroactive: frozen run snapshots and minted ARKs referencing this
/// contributor are unaffected; only future selections exclude them.
pub fn ban(conn: &Connection, id: &str, reason: &str) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE contributors SET banned = 1, ban_reason = ?, updated_at = ? WHERE id = ?",
        params![reason, now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}

/// Lift a ban
pub fn unban(conn: &Connection, id: &str) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE contributors SET banned = 0, ban_reason = NULL, updated_at = ? WHERE id = ?",
        params![now_rfc3339(), id],
    )?;
    Ok(changes > 0)
}
