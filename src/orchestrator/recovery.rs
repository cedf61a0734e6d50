//! Recovery sweep for interrupted runs
//!
//! Two findings matter after a crash or restart:
//!
//! 1. Succeeded runs without an ARK: minting is idempotent, so the sweep
//!    simply re-invokes it. Repair re-applies the missing half; an ARK is
//!    never deleted.
//! 2. Queued/running runs older than the executor timeout: the callback is
//!    never coming, so they are failed with a timeout reason, freeing their
//!    mesh for a fresh run.

use chrono::{Duration, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::ark::minter;
use crate::db::{runs, Db};
use crate::error::CoreError;
use crate::orchestrator::OrchestratorConfig;

/// What a sweep found and did, for operator visibility
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    /// ARKs minted for succeeded runs that lacked one
    pub minted: Vec<String>,
    /// Runs failed for exceeding the executor timeout
    pub timed_out: Vec<String>,
    /// (run_id, error) pairs the sweep could not repair; these stay
    /// visible as succeeded-without-ARK until an operator intervenes
    pub unresolved: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.minted.is_empty() && self.timed_out.is_empty() && self.unresolved.is_empty()
    }
}

/// Run one recovery sweep over the database
pub fn recovery_sweep(db: &Db, config: &OrchestratorConfig) -> Result<SweepReport, CoreError> {
    let mut report = SweepReport::default();

    let cutoff = (Utc::now() - Duration::seconds(config.executor_timeout_secs as i64))
        .to_rfc3339_opts(SecondsFormat::Micros, true);
    let timeout_reason = CoreError::Timeout(config.executor_timeout_secs).to_string();

    let stale = db.with_conn(|conn| runs::list_stale_active(conn, &cutoff))?;
    for run in stale {
        db.with_conn(|conn| runs::mark_failed(conn, &run.id, &timeout_reason))?;
        warn!(
            run_id = %run.id,
            mesh_id = %run.mesh_id,
            started_at = %run.started_at,
            "Stale active run failed by recovery sweep"
        );
        report.timed_out.push(run.id);
    }

    let orphaned = db.with_conn(|conn| runs::list_succeeded_without_ark(conn))?;
    for run in orphaned {
        let minted = db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ark = minter::mint(&tx, &run.id, &config.mint)?;
            tx.commit()?;
            Ok(ark)
        });
        match minted {
            Ok(ark) => {
                info!(run_id = %run.id, ark = %ark.ark, "Recovery sweep minted missing ARK");
                report.minted.push(ark.ark);
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Recovery sweep could not mint");
                report.unresolved.push((run.id, e.to_string()));
            }
        }
    }

    if report.is_clean() {
        info!("Recovery sweep found nothing to repair");
    }

    Ok(report)
}
