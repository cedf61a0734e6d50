//! SQLite database module for the moderation ledger, runs, and ARK registry
//!
//! ## Architecture
//!
//! - Image and artifact bytes live in an external blob store, referenced
//!   here only by `sha256-` content hash
//! - Meshes, contributors, contributions, and images form the moderation
//!   ledger that the input selector reads
//! - Runs carry a frozen image/contributor snapshot copied at creation
//! - ARKs are immutable and resolvable without touching the mutable tables
//!
//! ## Tables
//!
//! - `meshes`, `contributors`, `contributions`, `images` - moderation ledger
//! - `runs`, `run_images`, `run_contributors` - run lifecycle and snapshots
//! - `arks` - minted identifier registry

pub mod arks;
pub mod contributions;
pub mod contributors;
pub mod images;
pub mod meshes;
pub mod runs;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CoreError;

/// Current time rendered the way every timestamp column stores it.
///
/// One fixed rendering keeps lexicographic and chronological order in
/// agreement for SQL `ORDER BY` on timestamp columns.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite database handle
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open or create the database
    pub fn open(db_path: &Path) -> Result<Self, CoreError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), CoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read-only operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Connection) -> Result<T, CoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, CoreError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, CoreError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                mesh_count: count("SELECT COUNT(*) FROM meshes")?,
                contributor_count: count("SELECT COUNT(*) FROM contributors")?,
                image_count: count("SELECT COUNT(*) FROM images")?,
                run_count: count("SELECT COUNT(*) FROM runs")?,
                ark_count: count("SELECT COUNT(*) FROM arks")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub mesh_count: u64,
    pub contributor_count: u64,
    pub image_count: u64,
    pub run_count: u64,
    pub ark_count: u64,
}

// Re-exports
pub use arks::ArkRow;
pub use contributions::ContributionRow;
pub use contributors::ContributorRow;
pub use images::{ImageLabel, ImageRow};
pub use meshes::{CreateMeshInput, MeshRow, MeshStatus, ReconstructionOptions};
pub use runs::{ArtifactRef, RunRow, RunStatus};
