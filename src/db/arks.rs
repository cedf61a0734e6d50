//! ARK registry rows

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;

/// ARK row from database. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkRow {
    pub ark: String,
    pub naan: String,
    pub shoulder: String,
    pub assigned_name: String,
    pub run_id: String,
    pub url: String,
    pub metadata: String,
    pub commitment: String,
    pub created_at: String,
}

impl ArkRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            ark: row.get("ark")?,
            naan: row.get("naan")?,
            shoulder: row.get("shoulder")?,
            assigned_name: row.get("assigned_name")?,
            run_id: row.get("run_id")?,
            url: row.get("url")?,
            metadata: row.get("metadata")?,
            commitment: row.get("commitment")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Input for persisting a freshly minted ARK
#[derive(Debug, Clone)]
pub struct InsertArkInput {
    pub naan: String,
    pub shoulder: String,
    pub assigned_name: String,
    pub run_id: String,
    pub url: String,
    pub metadata: String,
    pub commitment: String,
}

/// Insert an ARK row. A violated `(naan, shoulder, assigned_name)`
/// uniqueness constraint is surfaced as `UniquenessConflict` so the minter
/// can redraw the name.
pub fn insert_ark(conn: &Connection, input: InsertArkInput) -> Result<ArkRow, CoreError> {
    let ark = format!("ark:/{}/{}{}", input.naan, input.shoulder, input.assigned_name);

    let inserted = conn.execute(
        r#"
        INSERT INTO arks (ark, naan, shoulder, assigned_name, run_id, url, metadata, commitment, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            ark,
            input.naan,
            input.shoulder,
            input.assigned_name,
            input.run_id,
            input.url,
            input.metadata,
            input.commitment,
            now_rfc3339(),
        ],
    );
    match inserted {
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(CoreError::UniquenessConflict {
                naan: input.naan,
                shoulder: input.shoulder,
                attempts: 1,
            });
        }
        other => {
            other?;
        }
    }

    get_ark(conn, &ark)?.ok_or_else(|| CoreError::Internal("ARK not found after insert".into()))
}

/// Get by full ARK string (`ark:/<naan>/<name>`)
pub fn get_ark(conn: &Connection, ark: &str) -> Result<Option<ArkRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM arks WHERE ark = ?")?;
    let mut rows = stmt.query(params![ark])?;

    match rows.next()? {
        Some(row) => Ok(Some(ArkRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Get the ARK minted for a run, if any
pub fn get_ark_for_run(conn: &Connection, run_id: &str) -> Result<Option<ArkRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM arks WHERE run_id = ?")?;
    let mut rows = stmt.query(params![run_id])?;

    match rows.next()? {
        Some(row) => Ok(Some(ArkRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Whether an assigned name is already taken under (naan, shoulder)
pub fn name_exists(
    conn: &Connection,
    naan: &str,
    shoulder: &str,
    assigned_name: &str,
) -> Result<bool, CoreError> {
    match conn.query_row(
        "SELECT 1 FROM arks WHERE naan = ? AND shoulder = ? AND assigned_name = ?",
        params![naan, shoulder, assigned_name],
        |_| Ok(()),
    ) {
        Ok(()) => Ok(true),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn sample_input(assigned_name: &str, run_id: &str) -> InsertArkInput {
        InsertArkInput {
            naan: "99999".to_string(),
            shoulder: "t1".to_string(),
            assigned_name: assigned_name.to_string(),
            run_id: run_id.to_string(),
            url: format!("http://localhost:8097/ark:/99999/t1{}", assigned_name),
            metadata: "{}".to_string(),
            commitment: "sha256-aa".to_string(),
        }
    }

    #[test]
    fn name_exists_reflects_the_registry() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            assert!(!name_exists(conn, "99999", "t1", "abcd1234")?);
            insert_ark(conn, sample_input("abcd1234", "run-1"))?;
            assert!(name_exists(conn, "99999", "t1", "abcd1234")?);

            // Same name under another shoulder is still free
            assert!(!name_exists(conn, "99999", "s2", "abcd1234")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn name_exists_propagates_database_errors() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE arks")?;
            assert!(matches!(
                name_exists(conn, "99999", "t1", "abcd1234"),
                Err(CoreError::Database(_))
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_assigned_name_surfaces_uniqueness_conflict() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_ark(conn, sample_input("abcd1234", "run-1"))?;
            assert!(matches!(
                insert_ark(conn, sample_input("abcd1234", "run-2")),
                Err(CoreError::UniquenessConflict { .. })
            ));
            Ok(())
        })
        .unwrap();
    }
}
