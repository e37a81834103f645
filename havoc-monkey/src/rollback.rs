//! Rollback: undo every recorded change, newest first.
//!
//! Runs once, at shutdown. Each record gets its own session; a record that
//! cannot be reverted is logged and counted, and the pass moves on. The
//! ledger is read, never written.

use crate::engine::{execute, guard, Engine, EngineMetrics};
use crate::error::RollbackError;
use havoc_core::{ActionKind, ChangeRecord, RunEvent, Target};
use serde::Serialize;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertOutcome {
    /// The inverse was committed.
    Reverted,
    /// The device was already in the pre-change state.
    AlreadyReverted,
    /// The inverse could not be applied.
    Failed(String),
}

/// Per-record rollback report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertReport {
    /// Sequence number of the record.
    pub seq: u64,
    /// Owning device.
    pub device: String,
    /// Target of the record.
    pub target: Target,
    /// Kind that was recorded.
    pub kind: ActionKind,
    /// Kind applied to undo it.
    pub inverse: ActionKind,
    /// Result.
    pub outcome: RevertOutcome,
}

/// Totals from a rollback pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackSummary {
    /// Inverses committed.
    pub reverted: usize,
    /// Records whose inverse failed.
    pub failed: usize,
    /// Records already in the pre-change state.
    pub skipped: usize,
    /// One report per record, in the order processed.
    pub reports: Vec<RevertReport>,
}

impl RollbackSummary {
    /// Sequence numbers in the order they were processed.
    pub fn order(&self) -> Vec<u64> {
        self.reports.iter().map(|r| r.seq).collect()
    }
}

impl Engine {
    /// Cancel, wait for any in-flight apply, then revert the ledger newest
    /// first.
    ///
    /// Clears every conflict marker and moves the engine to `Stopped`.
    pub async fn rollback(&self) -> RollbackSummary {
        self.cancel();
        let _cycle = self.cycle.lock().await;

        if self.state().is_stopped() {
            tracing::warn!("Rollback already completed, ignoring");
            return RollbackSummary::default();
        }

        let records: Vec<ChangeRecord> = guard(&self.ledger).iter_rev().cloned().collect();
        tracing::info!(records = records.len(), "Rollback started");

        let mut summary = RollbackSummary::default();
        for record in &records {
            let Some(inverse) = record.inverse() else {
                continue;
            };

            let outcome = match self.revert(record, inverse).await {
                Ok(true) => {
                    summary.reverted += 1;
                    EngineMetrics::inc(&self.metrics.reverts_total);
                    tracing::info!(
                        seq = record.seq,
                        device = %record.device,
                        target = %record.target,
                        kind = %inverse,
                        "Reverted"
                    );
                    self.telemetry.log_event(format!(
                        "rollback {} {} on {}",
                        inverse, record.target, record.device
                    ));
                    RevertOutcome::Reverted
                }
                Ok(false) => {
                    summary.skipped += 1;
                    tracing::info!(
                        seq = record.seq,
                        device = %record.device,
                        target = %record.target,
                        "Already reverted"
                    );
                    RevertOutcome::AlreadyReverted
                }
                Err(e) => {
                    summary.failed += 1;
                    EngineMetrics::inc(&self.metrics.revert_failures_total);
                    tracing::error!(
                        seq = record.seq,
                        device = %record.device,
                        target = %record.target,
                        kind = %inverse,
                        error = %e,
                        "Revert failed, continuing"
                    );
                    RevertOutcome::Failed(e.to_string())
                }
            };

            summary.reports.push(RevertReport {
                seq: record.seq,
                device: record.device.clone(),
                target: record.target.clone(),
                kind: record.kind,
                inverse,
                outcome,
            });
        }

        guard(&self.conflicts).clear();
        let state = self.transition(RunEvent::RollbackCompleted);

        tracing::info!(
            reverted = summary.reverted,
            failed = summary.failed,
            skipped = summary.skipped,
            state = state.as_str(),
            "Rollback complete"
        );
        self.telemetry.log_event(format!(
            "Rollback complete: {} reverted, {} failed",
            summary.reverted, summary.failed
        ));

        summary
    }

    /// Revert one record. `Ok(false)` when there was nothing to undo.
    async fn revert(
        &self,
        record: &ChangeRecord,
        inverse: ActionKind,
    ) -> Result<bool, RollbackError> {
        let device = self
            .fleet
            .get(&record.device)
            .ok_or_else(|| RollbackError::DeviceUnknown(record.device.clone()))?;

        let mut session = self.open_session(device).await?;
        let result = execute::<RollbackError>(
            session.as_mut(),
            inverse,
            &record.target,
            &record.params,
        )
        .await;
        self.close_session(session).await;

        Ok(result?.is_some())
    }
}
