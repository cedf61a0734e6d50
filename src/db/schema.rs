//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::CoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, CoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CoreError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(LEDGER_SCHEMA)?;
    conn.execute_batch(RUNS_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), CoreError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Moderation ledger: meshes, contributors, contributions, images
const LEDGER_SCHEMA: &str = r#"
-- The physical sites being reconstructed
CREATE TABLE IF NOT EXISTS meshes (
    id TEXT PRIMARY KEY NOT NULL,
    verbose_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    country TEXT,
    state TEXT,
    district TEXT,
    description TEXT,

    -- Viewer orientation parameters (ZXY order)
    rota_z REAL NOT NULL DEFAULT 0,
    rota_x REAL NOT NULL DEFAULT 0,
    rota_y REAL NOT NULL DEFAULT 0,

    -- Per-mesh reconstruction tuning handed to the executor
    center_image TEXT,
    denoise INTEGER NOT NULL DEFAULT 1,
    min_obs_ang REAL NOT NULL DEFAULT 10,
    orient_mesh INTEGER NOT NULL DEFAULT 1,

    status TEXT NOT NULL DEFAULT 'live',
    completed INTEGER NOT NULL DEFAULT 0,
    hidden INTEGER NOT NULL DEFAULT 0,

    -- Set only after a successful mint, never before
    preview TEXT,
    thumbnail TEXT,
    reconstructed_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contributors (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    banned INTEGER NOT NULL DEFAULT 0,
    ban_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One contributor's submission event for one mesh
CREATE TABLE IF NOT EXISTS contributions (
    id TEXT PRIMARY KEY NOT NULL,
    mesh_id TEXT NOT NULL,
    contributor_id TEXT NOT NULL,
    contributed_at TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT,

    FOREIGN KEY (mesh_id) REFERENCES meshes(id),
    FOREIGN KEY (contributor_id) REFERENCES contributors(id)
);

-- Image bytes live in an external blob store; only the content hash is kept
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY NOT NULL,
    contribution_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    label TEXT NOT NULL DEFAULT 'unlabeled',
    remark TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (contribution_id) REFERENCES contributions(id)
);
"#;

/// Runs, frozen snapshots, and the ARK registry
const RUNS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY NOT NULL,
    mesh_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    started_at TEXT NOT NULL,
    ended_at TEXT,

    -- Artifact reference reported by the executor on success
    directory TEXT,
    artifact_hash TEXT,
    preview TEXT,
    thumbnail TEXT,

    error TEXT,

    FOREIGN KEY (mesh_id) REFERENCES meshes(id)
);

-- Frozen image snapshot, copied at run creation so later moderation
-- cannot alter a minted ARK's claimed input set
CREATE TABLE IF NOT EXISTS run_images (
    run_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    image_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    PRIMARY KEY (run_id, position),
    FOREIGN KEY (run_id) REFERENCES runs(id)
);

CREATE TABLE IF NOT EXISTS run_contributors (
    run_id TEXT NOT NULL,
    contributor_id TEXT NOT NULL,
    PRIMARY KEY (run_id, contributor_id),
    FOREIGN KEY (run_id) REFERENCES runs(id)
);

-- Immutable once created
CREATE TABLE IF NOT EXISTS arks (
    ark TEXT PRIMARY KEY NOT NULL,
    naan TEXT NOT NULL,
    shoulder TEXT NOT NULL,
    assigned_name TEXT NOT NULL,
    run_id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    metadata TEXT NOT NULL,
    commitment TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (naan, shoulder, assigned_name),
    FOREIGN KEY (run_id) REFERENCES runs(id)
);
"#;

/// Index definitions
const INDEXES_SCHEMA: &str = r#"
-- At most one queued/running run per mesh; the insert hitting this index
-- is the atomic check-and-set guarding run creation
CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_active
    ON runs(mesh_id) WHERE status IN ('queued', 'running');

CREATE INDEX IF NOT EXISTS idx_runs_mesh ON runs(mesh_id);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);

CREATE INDEX IF NOT EXISTS idx_contributions_mesh ON contributions(mesh_id);
CREATE INDEX IF NOT EXISTS idx_contributions_contributor ON contributions(contributor_id);
CREATE INDEX IF NOT EXISTS idx_images_contribution ON images(contribution_id);
CREATE INDEX IF NOT EXISTS idx_images_label ON images(label);

CREATE INDEX IF NOT EXISTS idx_run_images_run ON run_images(run_id);
CREATE INDEX IF NOT EXISTS idx_arks_run ON arks(run_id);
"#;
