//! Input selector: the deterministic eligible-image query
//!
//! Eligible image := its contribution is processed, its contributor is not
//! banned, and moderation labeled it `good`. The ordering
//! (`contributed_at`, `created_at`, image id) is part of the commitment
//! input, so it must be total and reproducible for the same ledger
//! snapshot; the trailing id breaks timestamp ties.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One eligible image, as frozen into a run snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedImage {
    pub image_id: String,
    pub content_hash: String,
    pub contributor_id: String,
}

/// Compute the ordered eligible image set for a mesh.
///
/// Returns an empty vector (not an error) when nothing is eligible;
/// callers must refuse to start a run on an empty set.
pub fn select_images(conn: &Connection, mesh_id: &str) -> Result<Vec<SelectedImage>, CoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT i.id, i.content_hash, c.contributor_id
        FROM images i
        JOIN contributions c ON c.id = i.contribution_id
        JOIN contributors p ON p.id = c.contributor_id
        WHERE c.mesh_id = ?
          AND c.processed = 1
          AND p.banned = 0
          AND i.label = 'good'
        ORDER BY c.contributed_at ASC, i.created_at ASC, i.id ASC
        "#,
    )?;

    let rows = stmt.query_map(params![mesh_id], |row| {
        Ok(SelectedImage {
            image_id: row.get(0)?,
            content_hash: row.get(1)?,
            contributor_id: row.get(2)?,
        })
    })?;

    let mut results = vec![];
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::content_hash;
    use crate::db::contributions::{create_contribution, mark_processed};
    use crate::db::contributors::{ban, create_contributor};
    use crate::db::images::{add_image, set_label, ImageLabel};
    use crate::db::meshes::{create_mesh, CreateMeshInput};
    use crate::db::Db;

    fn set_contributed_at(conn: &Connection, id: &str, ts: &str) -> Result<(), CoreError> {
        conn.execute(
            "UPDATE contributions SET contributed_at = ? WHERE id = ?",
            params![ts, id],
        )?;
        Ok(())
    }

    fn set_image_created_at(conn: &Connection, id: &str, ts: &str) -> Result<(), CoreError> {
        conn.execute(
            "UPDATE images SET created_at = ? WHERE id = ?",
            params![ts, id],
        )?;
        Ok(())
    }

    fn mesh_input(verbose_id: &str) -> CreateMeshInput {
        CreateMeshInput {
            verbose_id: verbose_id.into(),
            name: verbose_id.into(),
            country: None,
            state: None,
            district: None,
            description: None,
            rota_z: 0.0,
            rota_x: 0.0,
            rota_y: 0.0,
        }
    }

    #[test]
    fn only_processed_good_unbanned_images_are_selected() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, mesh_input("temple"))?;
            let good_person = create_contributor(conn, "A", "a@example.org")?;
            let banned_person = create_contributor(conn, "B", "b@example.org")?;

            // Processed contribution with a mix of labels
            let processed = create_contribution(conn, &mesh.id, &good_person.id)?;
            let keep = add_image(conn, &processed.id, &content_hash(b"keep"))?;
            set_label(conn, &keep.id, ImageLabel::Good, None)?;
            let blurry = add_image(conn, &processed.id, &content_hash(b"blurry"))?;
            set_label(conn, &blurry.id, ImageLabel::Bad, None)?;
            let unlabeled = add_image(conn, &processed.id, &content_hash(b"pending"))?;
            mark_processed(conn, &processed.id)?;

            // Good image in an unprocessed contribution
            let unprocessed = create_contribution(conn, &mesh.id, &good_person.id)?;
            let early = add_image(conn, &unprocessed.id, &content_hash(b"early"))?;
            set_label(conn, &early.id, ImageLabel::Good, None)?;

            // Good image from a banned contributor
            let tainted = create_contribution(conn, &mesh.id, &banned_person.id)?;
            let spam = add_image(conn, &tainted.id, &content_hash(b"spam"))?;
            set_label(conn, &spam.id, ImageLabel::Good, None)?;
            mark_processed(conn, &tainted.id)?;
            ban(conn, &banned_person.id, "spam")?;

            let selected = select_images(conn, &mesh.id)?;
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].image_id, keep.id);
            assert_ne!(selected[0].image_id, unlabeled.id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn selection_is_deterministic_and_ordered() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, mesh_input("fort"))?;
            let person = create_contributor(conn, "C", "c@example.org")?;

            // Back-to-back inserts can land on the same microsecond, so
            // pin the timestamps the ordering is asserted against
            let first = create_contribution(conn, &mesh.id, &person.id)?;
            let second = create_contribution(conn, &mesh.id, &person.id)?;
            set_contributed_at(conn, &first.id, "2026-08-29T10:00:00.000000Z")?;
            set_contributed_at(conn, &second.id, "2026-08-29T10:05:00.000000Z")?;

            for (contribution, bytes, ts) in [
                (&second, b"late one".as_slice(), "2026-08-29T10:05:01.000000Z"),
                (&first, b"early one".as_slice(), "2026-08-29T10:00:01.000000Z"),
                (&first, b"early two".as_slice(), "2026-08-29T10:00:02.000000Z"),
            ] {
                let image = add_image(conn, &contribution.id, &content_hash(bytes))?;
                set_label(conn, &image.id, ImageLabel::Good, None)?;
                set_image_created_at(conn, &image.id, ts)?;
            }
            mark_processed(conn, &first.id)?;
            mark_processed(conn, &second.id)?;

            let once = select_images(conn, &mesh.id)?;
            let twice = select_images(conn, &mesh.id)?;
            assert_eq!(once, twice);
            assert_eq!(once.len(), 3);

            // Earlier contribution's images come first regardless of
            // image insertion order
            assert_eq!(once[0].content_hash, content_hash(b"early one"));
            assert_eq!(once[1].content_hash, content_hash(b"early two"));
            assert_eq!(once[2].content_hash, content_hash(b"late one"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_selection_is_ok_not_an_error() {
        let db = Db::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mesh = create_mesh(conn, mesh_input("empty"))?;
            assert!(select_images(conn, &mesh.id)?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
