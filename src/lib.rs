//! Reliquary - run orchestration and ARK minting for crowdsourced
//! photogrammetry archives
//!
//! Contributors photograph physical sites ("meshes"); moderation labels
//! each image; batches of approved images feed exclusive 3D reconstruction
//! jobs ("runs"); every successful run is issued a permanent Archival
//! Resource Key (ARK) bound to its exact inputs by a commitment hash.
//!
//! ## Pipeline
//!
//! ```text
//! moderation ledger -> input selector -> run state machine
//!     -> reconstruction executor (external) -> ARK minter -> registry
//! ```
//!
//! ## Guarantees
//!
//! - At most one queued/running run per mesh, enforced atomically in the
//!   database, with unrelated meshes fully parallel
//! - Run snapshots are frozen copies: later moderation edits and bans
//!   never alter a minted ARK's claimed input set
//! - The commitment is recomputable by any third party from the disclosed
//!   image set and artifact
//! - Minting is idempotent and transactional with the succeeded
//!   transition; a recovery sweep repairs interrupted databases

pub mod ark;
pub mod commitment;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod selector;

pub use ark::{MintConfig, ResolutionDocument};
pub use commitment::{compute_commitment, content_hash, verify_commitment};
pub use config::Config;
pub use db::Db;
pub use error::CoreError;
pub use http::HttpServer;
pub use orchestrator::{
    recovery_sweep, Orchestrator, OrchestratorConfig, ReconstructionJob, Reconstructor, SweepReport,
};
pub use selector::{select_images, SelectedImage};
