//! Image rows and moderation labels

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::now_rfc3339;
use crate::error::CoreError;

/// Moderation label for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageLabel {
    Unlabeled,
    Good,
    Bad,
    Nsfw,
}

impl ImageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageLabel::Unlabeled => "unlabeled",
            ImageLabel::Good => "good",
            ImageLabel::Bad => "bad",
            ImageLabel::Nsfw => "nsfw",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "unlabeled" => Ok(ImageLabel::Unlabeled),
            "good" => Ok(ImageLabel::Good),
            "bad" => Ok(ImageLabel::Bad),
            "nsfw" => Ok(ImageLabel::Nsfw),
            other => Err(CoreError::Internal(format!(
                "Unknown image label: {}",
                other
            ))),
        }
    }
}

/// Image row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRow {
    pub id: String,
    pub contribution_id: String,
    pub content_hash: String,
    pub label: ImageLabel,
    pub remark: Option<String>,
    pub created_at: String,
}

impl ImageRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let label: String = row.get("label")?;
        Ok(Self {
            id: row.get("id")?,
            contribution_id: row.get("contribution_id")?,
            content_hash: row.get("content_hash")?,
            label: ImageLabel::parse(&label).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "label".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?,
            remark: row.get("remark")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Add an image to a contribution. The bytes are already in the external
/// blob store; only the content hash is recorded here.
pub fn add_image(
    conn: &Connection,
    contribution_id: &str,
    content_hash: &str,
) -> Result<ImageRow, CoreError> {
    let id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        r#"
        INSERT INTO images (id, contribution_id, content_hash, created_at)
        VALUES (?, ?, ?, ?)
        "#,
        params![id, contribution_id, content_hash, now_rfc3339()],
    )?;

    get_image(conn, &id)?.ok_or_else(|| CoreError::Internal("Image not found after insert".into()))
}

/// Get image by ID
pub fn get_image(conn: &Connection, id: &str) -> Result<Option<ImageRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT * FROM images WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(ImageRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// List images for a contribution in upload order
pub fn list_for_contribution(
    conn: &Connection,
    contribution_id: &str,
) -> Result<Vec<ImageRow>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM images WHERE contribution_id = ? ORDER BY created_at ASC, id ASC")?;

    let rows = stmt.query_map(params![contribution_id], |row| ImageRow::from_row(row))?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Apply a moderation label, with an optional remark for manual overrides.
///
/// Labels only affect future selections; images already referenced by a
/// run's frozen snapshot keep their place in that snapshot.
pub fn set_label(
    conn: &Connection,
    id: &str,
    label: ImageLabel,
    remark: Option<&str>,
) -> Result<bool, CoreError> {
    let changes = conn.execute(
        "UPDATE images SET label = ?, remark = COALESCE(?, remark) WHERE id = ?",
        params![label.as_str(), remark, id],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::content_hash;
    use crate::db::contributions::create_contribution;
    use crate::db::contributors::create_contributor;
    use crate::db::meshes::{create_mesh, CreateMeshInput};
    use crate::db::Db;

    #[test]
    fn new_images_are_unlabeled_until_moderated() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(
                conn,
                CreateMeshInput {
                    verbose_id: "gate".into(),
                    name: "Gate".into(),
                    country: None,
                    state: None,
                    district: None,
                    description: None,
                    rota_z: 0.0,
                    rota_x: 0.0,
                    rota_y: 0.0,
                },
            )?;
            let person = create_contributor(conn, "Mira", "mira@example.org")?;
            let contribution = create_contribution(conn, &mesh.id, &person.id)?;

            let image = add_image(conn, &contribution.id, &content_hash(b"front view"))?;
            assert_eq!(image.label, ImageLabel::Unlabeled);

            assert!(set_label(
                conn,
                &image.id,
                ImageLabel::Good,
                Some("manual pass")
            )?);
            let image = get_image(conn, &image.id)?.unwrap();
            assert_eq!(image.label, ImageLabel::Good);
            assert_eq!(image.remark.as_deref(), Some("manual pass"));

            assert_eq!(list_for_contribution(conn, &contribution.id)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
