//! Commitment-bound ARK minting and resolution
//!
//! An ARK (Archival Resource Key) is minted exactly once per succeeded run
//! and binds the identifier to the run's frozen input set through the
//! commitment hash. The registry serves resolution from the immutable
//! ARK/run records only, so minted identifiers stay resolvable no matter
//! what happens to the mesh or its contributors afterwards.

pub mod minter;
pub mod registry;

pub use minter::{mint, MintConfig, NOID_ALPHABET};
pub use registry::{audit, by_run, resolve, MeshRef, ResolutionDocument};
