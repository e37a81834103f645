//! The chaos loop.
//!
//! ```text
//! loop while Running:
//!     step (select, open, apply, close, record)
//!     wait a random interval (interruptible)
//!     if transient and not cancelled: apply the inverse
//! ```
//!
//! Errors never leave a cycle; they are logged and the loop carries on.

use crate::engine::{ApplyOutcome, Engine, EngineMetrics};
use crate::error::CycleError;
use havoc_core::{ActionKind, ChangeRecord, Selection};
use std::sync::Arc;
use std::time::Duration;

/// What one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    /// Result of the forward apply.
    pub step: Result<ApplyOutcome, CycleError>,
    /// Result of the in-cycle inverse, for transient actions.
    pub inverse: Option<Result<ApplyOutcome, CycleError>>,
    /// How long the cycle waited.
    pub waited: Duration,
    /// Whether cancellation cut the wait short.
    pub interrupted: bool,
}

impl CycleReport {
    /// Records appended by this cycle, in order.
    pub fn records(&self) -> Vec<&ChangeRecord> {
        let forward = self.step.as_ref().ok().and_then(ApplyOutcome::record);
        let inverse = self
            .inverse
            .as_ref()
            .and_then(|r| r.as_ref().ok())
            .and_then(ApplyOutcome::record);
        forward.into_iter().chain(inverse).collect()
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Run one chaos cycle. `kind` forces the action kind (manual trigger);
/// `None` lets the engine pick.
pub async fn run_cycle(engine: &Engine, kind: Option<ActionKind>) -> CycleReport {
    EngineMetrics::inc(&engine.metrics().cycles_total);

    let step = engine.step(kind).await;
    match &step {
        Ok(_) => {}
        Err(CycleError::NotRunning) => {
            return CycleReport {
                step,
                inverse: None,
                waited: Duration::ZERO,
                interrupted: true,
            };
        }
        Err(e @ CycleError::NoEligibleTarget { .. }) => {
            tracing::debug!(error = %e, "Cycle abandoned");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cycle abandoned");
            engine.telemetry().log_event(format!("cycle abandoned: {}", e));
        }
    }

    let waited = engine.draw_wait().await;
    tracing::debug!(wait_ms = millis(waited), "Waiting");
    let interrupted = engine.sleep_or_cancel(waited).await;

    let inverse = match step.as_ref().ok().and_then(ApplyOutcome::record) {
        Some(record) if record.kind.is_transient() => {
            if interrupted || !engine.is_running() {
                tracing::info!(
                    seq = record.seq,
                    device = %record.device,
                    target = %record.target,
                    "Cancelled during wait, leaving inverse to rollback"
                );
                None
            } else {
                Some(apply_inverse(engine, record).await)
            }
        }
        _ => None,
    };

    CycleReport {
        step,
        inverse,
        waited,
        interrupted,
    }
}

async fn apply_inverse(
    engine: &Engine,
    record: &ChangeRecord,
) -> Result<ApplyOutcome, CycleError> {
    let Some(kind) = record.inverse() else {
        return Ok(ApplyOutcome::NoOp);
    };
    let selection = Selection {
        kind,
        target: record.target.clone(),
        params: record.params.clone(),
    };
    let result = engine.apply(&record.device, &selection).await;
    if let Err(e) = &result {
        tracing::warn!(
            seq = record.seq,
            device = %record.device,
            target = %record.target,
            kind = %kind,
            error = %e,
            "Transient inverse failed, leaving it to rollback"
        );
    }
    result
}

/// Run cycles until cancelled. Returns the number of cycles run.
pub async fn run(engine: Arc<Engine>) -> u64 {
    tracing::info!(devices = engine.fleet().len(), "Chaos loop started");
    let mut cycles = 0;
    while engine.is_running() {
        run_cycle(&engine, None).await;
        cycles += 1;
        tokio::task::yield_now().await;
    }
    tracing::info!(cycles, "Chaos loop stopped");
    cycles
}

/// Spawn the chaos loop.
pub fn spawn_scheduler(engine: Arc<Engine>) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(run(engine))
}

/// Spawn one manual cycle with a caller-chosen kind.
///
/// # Errors
///
/// Returns [`CycleError::NotRunning`] once cancellation has started.
pub fn spawn_trigger(
    engine: Arc<Engine>,
    kind: ActionKind,
) -> Result<tokio::task::JoinHandle<CycleReport>, CycleError> {
    if !engine.is_running() {
        return Err(CycleError::NotRunning);
    }
    tracing::info!(kind = %kind, "Manual trigger");
    engine.telemetry().log_event(format!("manual trigger: {}", kind));
    Ok(tokio::spawn(async move { run_cycle(&engine, Some(kind)).await }))
}
