//! Run orchestration: exclusive reconstruction jobs per mesh
//!
//! ## Lifecycle
//!
//! ```text
//! queued -> running -> succeeded (ARK minted in the same transaction)
//!                  \-> failed    (re-queueable via a fresh create_run)
//! ```
//!
//! At most one queued/running run exists per mesh; the guard is the
//! partial unique index on `runs`, so run creation for unrelated meshes
//! never contends. Callback handlers tolerate restarts: reapplying a
//! transition to an already terminal run reports success without changing
//! anything.

pub mod executor;
pub mod recovery;

pub use executor::{CommandReconstructor, ReconstructionJob, Reconstructor};
pub use recovery::{recovery_sweep, SweepReport};

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::ark::minter::{self, MintConfig};
use crate::config::Config;
use crate::db::arks::ArkRow;
use crate::db::runs::{self, ArtifactRef, RunRow, RunStatus};
use crate::db::{meshes, Db};
use crate::error::CoreError;
use crate::selector;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Seconds of executor silence before a run is failed with a timeout
    pub executor_timeout_secs: u64,
    /// Minting parameters applied on successful completion
    pub mint: MintConfig,
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            executor_timeout_secs: config.executor_timeout_secs,
            mint: MintConfig::from(config),
        }
    }
}

/// Drives runs from creation through reconstruction to minting
pub struct Orchestrator {
    db: Arc<Db>,
    executor: Arc<dyn Reconstructor>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(db: Arc<Db>, executor: Arc<dyn Reconstructor>, config: OrchestratorConfig) -> Self {
        Self {
            db,
            executor,
            config,
        }
    }

    pub fn db(&self) -> Arc<Db> {
        Arc::clone(&self.db)
    }

    /// Create a queued run for a mesh, freezing the selector's output.
    ///
    /// Fails with `Conflict` if an active run exists for the mesh and with
    /// `EmptyInput` if no images are eligible; neither persists anything.
    pub fn create_run(&self, mesh_id: &str) -> Result<RunRow, CoreError> {
        self.db.with_conn_mut(|conn| {
            let mesh = meshes::get_mesh(conn, mesh_id)?
                .ok_or_else(|| CoreError::NotFound(format!("mesh {}", mesh_id)))?;

            let images = selector::select_images(conn, mesh_id)?;
            if images.is_empty() {
                return Err(CoreError::EmptyInput(mesh.verbose_id));
            }

            let run = runs::insert_run(conn, mesh_id, &images)?;
            info!(
                run_id = %run.id,
                mesh = %mesh.verbose_id,
                images = images.len(),
                "Run queued with frozen snapshot"
            );
            Ok(run)
        })
    }

    /// queued -> running. Idempotent when already running, so an executor
    /// may retry its start callback after a restart.
    pub fn transition_to_running(&self, run_id: &str) -> Result<(), CoreError> {
        self.db.with_conn(|conn| {
            let run = runs::get_run(conn, run_id)?
                .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;

            match run.status {
                RunStatus::Queued => {
                    runs::mark_running(conn, run_id)?;
                    info!(run_id = %run_id, "Run started");
                    Ok(())
                }
                RunStatus::Running => Ok(()),
                other => Err(CoreError::InvalidTransition {
                    from: other.as_str().to_string(),
                    to: RunStatus::Running.as_str().to_string(),
                }),
            }
        })
    }

    /// running -> succeeded, minting the ARK inside the same transaction.
    ///
    /// Other readers never observe a succeeded run without its ARK: if
    /// minting fails the transaction rolls back and the run stays running.
    /// A late callback against an already terminal run is a no-op
    /// (`Some(existing)` for succeeded, `None` for failed).
    pub fn complete(&self, run_id: &str, artifact: &ArtifactRef) -> Result<Option<ArkRow>, CoreError> {
        self.db.with_conn_mut(|conn| {
            let run = runs::get_run(conn, run_id)?
                .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;

            match run.status {
                RunStatus::Running => {
                    let tx = conn.transaction()?;
                    runs::mark_succeeded(&tx, run_id, artifact)?;
                    let ark = minter::mint(&tx, run_id, &self.config.mint)?;
                    tx.commit()?;
                    Ok(Some(ark))
                }
                RunStatus::Succeeded => {
                    // Restart-tolerant: mint is idempotent
                    let ark = minter::mint(conn, run_id, &self.config.mint)?;
                    Ok(Some(ark))
                }
                RunStatus::Failed => {
                    warn!(
                        run_id = %run_id,
                        "Success callback for a failed run ignored (timed out earlier?)"
                    );
                    Ok(None)
                }
                RunStatus::Queued => Err(CoreError::InvalidTransition {
                    from: RunStatus::Queued.as_str().to_string(),
                    to: RunStatus::Succeeded.as_str().to_string(),
                }),
            }
        })
    }

    /// queued/running -> failed with a reason. Idempotent against terminal
    /// runs; a succeeded run is never demoted.
    pub fn fail(&self, run_id: &str, reason: &str) -> Result<(), CoreError> {
        self.db.with_conn(|conn| {
            let run = runs::get_run(conn, run_id)?
                .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;

            match run.status {
                RunStatus::Queued | RunStatus::Running => {
                    runs::mark_failed(conn, run_id, reason)?;
                    warn!(run_id = %run_id, reason = %reason, "Run failed");
                    Ok(())
                }
                RunStatus::Failed => Ok(()),
                RunStatus::Succeeded => {
                    warn!(run_id = %run_id, "Failure callback for a succeeded run ignored");
                    Ok(())
                }
            }
        })
    }

    /// Load the frozen job for a run
    fn load_job(&self, run_id: &str) -> Result<ReconstructionJob, CoreError> {
        self.db.with_conn(|conn| {
            let run = runs::get_run(conn, run_id)?
                .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;
            let mesh = meshes::get_mesh(conn, &run.mesh_id)?
                .ok_or_else(|| CoreError::NotFound(format!("mesh {}", run.mesh_id)))?;
            let images = runs::frozen_images(conn, run_id)?;

            Ok(ReconstructionJob {
                run_id: run.id,
                mesh_id: run.mesh_id,
                options: mesh.reconstruction_options(),
                mesh_verbose_id: mesh.verbose_id,
                images,
            })
        })
    }

    /// Drive one run through the executor to a terminal state.
    ///
    /// Silence past the configured timeout fails the run with a timeout
    /// reason; executor errors fail it with their message. Both leave the
    /// mesh eligible for a fresh `create_run`.
    pub async fn execute_run(&self, run_id: &str) -> Result<Option<ArkRow>, CoreError> {
        let job = self.load_job(run_id)?;
        self.transition_to_running(run_id)?;

        let timeout = Duration::from_secs(self.config.executor_timeout_secs);
        match tokio::time::timeout(timeout, self.executor.execute(&job)).await {
            Ok(Ok(artifact)) => self.complete(run_id, &artifact),
            Ok(Err(e)) => {
                self.fail(run_id, &e.to_string())?;
                Ok(None)
            }
            Err(_) => {
                let reason = CoreError::Timeout(self.config.executor_timeout_secs).to_string();
                self.fail(run_id, &reason)?;
                Ok(None)
            }
        }
    }

    /// Create and immediately execute a run for a mesh
    pub async fn run_mesh(&self, mesh_id: &str) -> Result<Option<ArkRow>, CoreError> {
        let run = self.create_run(mesh_id)?;
        self.execute_run(&run.id).await
    }

    /// Dispatch every queued run, one task per run so unrelated meshes
    /// proceed in parallel. Returns the number of runs dispatched.
    pub async fn dispatch_pending(self: &Arc<Self>) -> Result<usize, CoreError> {
        let queued = self
            .db
            .with_conn(|conn| runs::list_by_status(conn, RunStatus::Queued))?;

        let mut handles = Vec::with_capacity(queued.len());
        for run in &queued {
            let orchestrator = Arc::clone(self);
            let run_id = run.id.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = orchestrator.execute_run(&run_id).await {
                    error!(run_id = %run_id, error = %e, "Run execution failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        Ok(queued.len())
    }
}
