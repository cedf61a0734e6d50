//! Reconstruction executor seam
//!
//! The photogrammetry pipeline is an external collaborator: the core hands
//! it a frozen image set and expects exactly one terminal outcome back.
//! `Reconstructor` is the trait the orchestrator drives; the daemon ships
//! a command-line adapter for out-of-process pipelines.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::db::meshes::ReconstructionOptions;
use crate::db::runs::{ArtifactRef, RunImageRow};
use crate::error::CoreError;

/// Everything an executor needs to reconstruct one run
#[derive(Debug, Clone)]
pub struct ReconstructionJob {
    pub run_id: String,
    pub mesh_id: String,
    pub mesh_verbose_id: String,
    /// Frozen snapshot in selection order
    pub images: Vec<RunImageRow>,
    /// Per-mesh pipeline tuning
    pub options: ReconstructionOptions,
}

/// External reconstruction pipeline.
///
/// Implementations must report exactly one terminal outcome per job; the
/// orchestrator treats silence past the configured timeout as failure.
#[async_trait]
pub trait Reconstructor: Send + Sync {
    async fn execute(&self, job: &ReconstructionJob) -> Result<ArtifactRef, CoreError>;
}

/// Runs an external command per job: `<command> <run_id> <workdir>`.
///
/// The frozen image hashes are written to `<workdir>/images.txt` (one per
/// line, selection order) and the mesh tuning to `<workdir>/options.json`;
/// the command is expected to leave an `ArtifactRef` JSON document at
/// `<workdir>/artifact.json` on success.
pub struct CommandReconstructor {
    command: PathBuf,
    runs_dir: PathBuf,
}

impl CommandReconstructor {
    pub fn new(command: PathBuf, runs_dir: PathBuf) -> Self {
        Self { command, runs_dir }
    }
}

#[async_trait]
impl Reconstructor for CommandReconstructor {
    async fn execute(&self, job: &ReconstructionJob) -> Result<ArtifactRef, CoreError> {
        let workdir = self.runs_dir.join(&job.run_id);
        tokio::fs::create_dir_all(&workdir).await?;

        let manifest: String = job
            .images
            .iter()
            .map(|image| image.content_hash.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tokio::fs::write(workdir.join("images.txt"), manifest).await?;

        let options_json = serde_json::to_string_pretty(&job.options)?;
        tokio::fs::write(workdir.join("options.json"), options_json).await?;

        info!(
            run_id = %job.run_id,
            mesh = %job.mesh_verbose_id,
            images = job.images.len(),
            command = %self.command.display(),
            "Launching reconstruction command"
        );

        let output = Command::new(&self.command)
            .arg(&job.run_id)
            .arg(&workdir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Internal(format!(
                "Reconstruction command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        debug!(run_id = %job.run_id, "Reconstruction command finished, reading artifact");
        let artifact_json = tokio::fs::read_to_string(workdir.join("artifact.json")).await?;
        let artifact: ArtifactRef = serde_json::from_str(&artifact_json)?;
        Ok(artifact)
    }
}
