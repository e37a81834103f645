//! The engine context.
//!
//! One [`Engine`] owns everything a run mutates: the ledger, the conflict
//! table, the run state, the open-session set and the telemetry buffers.
//! The scheduler, the rollback pass and the HTTP surface all borrow it.
//!
//! Applies are serialized through the cycle lock, which also guards the
//! RNG. Rollback takes the same lock after cancelling, so it never overlaps
//! an in-flight commit and the ledger has one writer at a time.

use crate::error::CycleError;
use crate::telemetry::Telemetry;
use dashmap::DashSet;
use havoc_core::{
    plan, render, select_action, select_device, ActionKind, ActionParams, ActiveObject,
    CatalogError, ChangeRecord, ConflictError, ConflictTable, Device, Effect, Fleet, Ledger, NamedObject,
    ParamRanges, RunEvent, RunState, Selection, Target,
};
use havoc_device::{DeviceConnector, DeviceSession, SessionError, StateQuery};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Tunables for one engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Shortest wait after a cycle.
    pub sleep_min: Duration,
    /// Longest wait after a cycle.
    pub sleep_max: Duration,
    /// Kinds the autonomous loop picks from.
    pub actions: Vec<ActionKind>,
    /// Parameter ranges.
    pub ranges: ParamRanges,
    /// RNG seed. Random when `None`.
    pub seed: Option<u64>,
    /// Chaos events kept for display.
    pub event_log_capacity: usize,
    /// Samples kept per telemetry series.
    pub series_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sleep_min: Duration::from_secs(5),
            sleep_max: Duration::from_secs(15),
            actions: ActionKind::PERTURBING.to_vec(),
            ranges: ParamRanges::default(),
            seed: None,
            event_log_capacity: 20,
            series_capacity: 100,
        }
    }
}

/// Operational metrics (monotonic since startup).
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Cycles started (autonomous and triggered).
    pub cycles_total: AtomicU64,
    /// Changes committed and recorded.
    pub applies_total: AtomicU64,
    /// Applies that found nothing to change.
    pub noops_total: AtomicU64,
    /// Applies refused by the named-object conflict rule.
    pub conflicts_total: AtomicU64,
    /// Device connection failures.
    pub connection_errors_total: AtomicU64,
    /// Commit or query failures.
    pub apply_errors_total: AtomicU64,
    /// Records reverted by rollback.
    pub reverts_total: AtomicU64,
    /// Records rollback failed to revert.
    pub revert_failures_total: AtomicU64,
    /// Latency injections committed.
    pub latency_injections_total: AtomicU64,
    /// Filter/policer pairs installed.
    pub policers_installed_total: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Result of an apply that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Committed and recorded.
    Applied(ChangeRecord),
    /// The device was already in the requested state; nothing recorded.
    NoOp,
}

impl ApplyOutcome {
    /// The recorded change, if any.
    pub fn record(&self) -> Option<&ChangeRecord> {
        match self {
            ApplyOutcome::Applied(record) => Some(record),
            ApplyOutcome::NoOp => None,
        }
    }
}

/// Shared engine context.
pub struct Engine {
    pub(crate) fleet: Arc<Fleet>,
    pub(crate) connector: Arc<dyn DeviceConnector>,
    pub(crate) options: EngineOptions,
    pub(crate) state: Mutex<RunState>,
    pub(crate) cancel_tx: watch::Sender<bool>,
    pub(crate) ledger: Mutex<Ledger>,
    pub(crate) conflicts: Mutex<ConflictTable>,
    pub(crate) open_sessions: DashSet<String>,
    pub(crate) cycle: tokio::sync::Mutex<StdRng>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) metrics: EngineMetrics,
    started: Instant,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("devices", &self.fleet.len())
            .field("options", &self.options)
            .field("state", &self.state())
            .field("ledger_len", &self.ledger_len())
            .field("open_sessions", &self.open_sessions.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

pub(crate) fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    /// Create an engine over a fleet.
    pub fn new(fleet: Fleet, connector: Arc<dyn DeviceConnector>, options: EngineOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (cancel_tx, _) = watch::channel(false);
        let telemetry = Arc::new(Telemetry::new(
            options.event_log_capacity,
            options.series_capacity,
        ));

        Self {
            fleet: Arc::new(fleet),
            connector,
            options,
            state: Mutex::new(RunState::Running),
            cancel_tx,
            ledger: Mutex::new(Ledger::new()),
            conflicts: Mutex::new(ConflictTable::new()),
            open_sessions: DashSet::new(),
            cycle: tokio::sync::Mutex::new(rng),
            telemetry,
            metrics: EngineMetrics::default(),
            started: Instant::now(),
        }
    }

    /// Time since the engine was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// The fleet.
    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Operational metrics.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Telemetry buffers.
    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *guard(&self.state)
    }

    /// Whether new applies are accepted.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub(crate) fn transition(&self, event: RunEvent) -> RunState {
        let mut state = guard(&self.state);
        *state = state.on_event(event);
        *state
    }

    /// Request cancellation. Idempotent.
    ///
    /// In-flight commits finish; waits are interrupted; no new apply starts.
    pub fn cancel(&self) {
        let before = self.state();
        let after = self.transition(RunEvent::CancelRequested);
        self.cancel_tx.send_replace(true);
        if before != after {
            tracing::info!(state = after.as_str(), "Cancellation requested");
            self.telemetry.log_event("Cancellation requested");
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `wait` unless cancelled first. Returns `true` if cancelled.
    pub async fn sleep_or_cancel(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => false,
            _ = self.cancelled() => true,
        }
    }

    /// Draw the post-cycle wait.
    pub async fn draw_wait(&self) -> Duration {
        let mut rng = self.cycle.lock().await;
        havoc_core::draw_wait(&mut *rng, self.options.sleep_min, self.options.sleep_max)
    }

    /// Number of ledger records.
    pub fn ledger_len(&self) -> usize {
        guard(&self.ledger).len()
    }

    /// The newest `n` ledger records, oldest first.
    pub fn ledger_tail(&self, n: usize) -> Vec<ChangeRecord> {
        guard(&self.ledger).tail(n)
    }

    /// Copy of the whole ledger, oldest first.
    pub fn ledger_snapshot(&self) -> Vec<ChangeRecord> {
        guard(&self.ledger).records().to_vec()
    }

    /// The active named object on a device.
    pub fn active_object(&self, device: &str) -> Option<ActiveObject> {
        guard(&self.conflicts).active(device).cloned()
    }

    /// Devices currently holding a conflict marker.
    pub fn conflict_markers(&self) -> usize {
        guard(&self.conflicts).len()
    }

    /// Devices with an open session right now.
    pub fn open_session_count(&self) -> usize {
        self.open_sessions.len()
    }

    /// One apply step: pick a device and action (or plan `kind`) and apply it.
    pub async fn step(&self, kind: Option<ActionKind>) -> Result<ApplyOutcome, CycleError> {
        let mut rng = self.cycle.lock().await;
        if !self.is_running() {
            return Err(CycleError::NotRunning);
        }

        let (device, selection) = {
            let conflicts = guard(&self.conflicts);
            match kind {
                None => {
                    let device = select_device(&mut *rng, &self.fleet)
                        .ok_or_else(|| CycleError::no_target("*", None))?;
                    let selection = select_action(
                        &mut *rng,
                        device,
                        &conflicts,
                        &self.options.actions,
                        &self.options.ranges,
                    )
                    .ok_or_else(|| CycleError::no_target(&device.name, None))?;
                    (device, selection)
                }
                Some(kind) => {
                    let device = self
                        .pick_device_for(&mut *rng, kind, &conflicts)
                        .ok_or_else(|| CycleError::no_target("*", Some(kind)))?;
                    let selection =
                        plan(&mut *rng, kind, device, &conflicts, &self.options.ranges)
                            .ok_or_else(|| CycleError::no_target(&device.name, Some(kind)))?;
                    (device, selection)
                }
            }
        };

        self.apply_locked(device, &selection).await
    }

    /// Apply a caller-built selection on a named device.
    pub async fn apply(
        &self,
        device: &str,
        selection: &Selection,
    ) -> Result<ApplyOutcome, CycleError> {
        let _cycle = self.cycle.lock().await;
        let device = self
            .fleet
            .get(device)
            .ok_or_else(|| CycleError::UnknownDevice(device.to_string()))?;
        self.apply_locked(device, selection).await
    }

    /// Devices with something to target; removals prefer devices holding
    /// their object.
    fn pick_device_for<'a>(
        &'a self,
        rng: &mut StdRng,
        kind: ActionKind,
        conflicts: &ConflictTable,
    ) -> Option<&'a Device> {
        let eligible: Vec<&Device> = self
            .fleet
            .devices()
            .iter()
            .filter(|d| !d.eligible_interfaces().is_empty())
            .collect();

        if let Effect::Remove(object) = kind.descriptor().effect {
            let holding: Vec<&Device> = eligible
                .iter()
                .copied()
                .filter(|d| conflicts.active(&d.name).map(|a| a.object) == Some(object))
                .collect();
            if let Some(device) = holding.choose(rng) {
                return Some(*device);
            }
        }

        eligible.choose(rng).copied()
    }

    /// Apply with the cycle lock already held.
    async fn apply_locked(
        &self,
        device: &Device,
        selection: &Selection,
    ) -> Result<ApplyOutcome, CycleError> {
        if !self.is_running() {
            return Err(CycleError::NotRunning);
        }
        let kind = selection.kind;

        if let Some(iface) = selection.target.interface() {
            if device.is_excluded(iface) || !device.interfaces.iter().any(|i| i == iface) {
                return Err(CycleError::no_target(&device.name, Some(kind)));
            }
        }

        let marker_present = {
            let conflicts = guard(&self.conflicts);
            if let Err(conflict) = conflicts.check(&device.name, kind) {
                return Err(self.refuse(conflict));
            }
            match kind.named_object() {
                Some(object) => conflicts.active(&device.name).map(|a| a.object) == Some(object),
                None => false,
            }
        };

        // Only remove what this run installed; the live object's parameters
        // are unknown, so the record could not be reverted.
        if matches!(kind.descriptor().effect, Effect::Remove(_)) && !marker_present {
            EngineMetrics::inc(&self.metrics.noops_total);
            tracing::info!(
                device = %device.name,
                kind = %kind,
                "Object not installed by this run, nothing to remove"
            );
            return Ok(ApplyOutcome::NoOp);
        }

        tracing::info!(
            device = %device.name,
            target = %selection.target,
            kind = %kind,
            "Applying"
        );

        let mut session = match self.open_session(device).await {
            Ok(session) => session,
            Err(e) => {
                EngineMetrics::inc(&self.metrics.connection_errors_total);
                tracing::warn!(device = %device.name, kind = %kind, error = %e, "Connection failed");
                return Err(e.into());
            }
        };
        let result = match live_object(session.as_mut(), kind).await {
            Ok(Some(object)) => Err(self.refuse(ConflictError {
                device: device.name.clone(),
                attempted: kind,
                active: object,
                active_kind: object.installer(),
                active_target: Target::Device,
            })),
            Ok(None) => {
                execute::<CycleError>(
                    session.as_mut(),
                    kind,
                    &selection.target,
                    &selection.params,
                )
                .await
            }
            Err(e) => Err(e.into()),
        };
        self.close_session(session).await;

        match result {
            Ok(Some(params)) => {
                let record = self.record(device, selection, params);
                Ok(ApplyOutcome::Applied(record))
            }
            Ok(None) => {
                EngineMetrics::inc(&self.metrics.noops_total);
                tracing::info!(
                    device = %device.name,
                    target = %selection.target,
                    kind = %kind,
                    "Already in requested state, nothing recorded"
                );
                Ok(ApplyOutcome::NoOp)
            }
            Err(e @ CycleError::Conflict(_)) => Err(e),
            Err(e) => {
                match &e {
                    CycleError::Connection(_) => {
                        EngineMetrics::inc(&self.metrics.connection_errors_total)
                    }
                    _ => EngineMetrics::inc(&self.metrics.apply_errors_total),
                }
                tracing::warn!(
                    device = %device.name,
                    target = %selection.target,
                    kind = %kind,
                    error = %e,
                    "Apply failed, nothing recorded"
                );
                Err(e)
            }
        }
    }

    fn refuse(&self, conflict: ConflictError) -> CycleError {
        EngineMetrics::inc(&self.metrics.conflicts_total);
        tracing::warn!(
            device = %conflict.device,
            kind = %conflict.attempted,
            active = %conflict.active_kind,
            "Conflicting named object active, skipping"
        );
        conflict.into()
    }

    /// Append a confirmed change and update the conflict marker.
    fn record(&self, device: &Device, selection: &Selection, params: ActionParams) -> ChangeRecord {
        let kind = selection.kind;
        let record = guard(&self.ledger)
            .append(&device.name, selection.target.clone(), kind, params.clone())
            .clone();

        match kind.descriptor().effect {
            Effect::Install(object) => {
                guard(&self.conflicts).activate(
                    &device.name,
                    ActiveObject {
                        object,
                        kind,
                        target: selection.target.clone(),
                        params: params.clone(),
                    },
                );
                EngineMetrics::inc(&self.metrics.policers_installed_total);
                if object == NamedObject::Latency {
                    EngineMetrics::inc(&self.metrics.latency_injections_total);
                    if let Some(ms) = params.latency_ms {
                        self.telemetry.record_latency(f64::from(ms));
                    }
                }
            }
            Effect::Remove(object) => {
                guard(&self.conflicts).release(&device.name, object);
            }
            Effect::SetInterface { .. } | Effect::SetAllInterfaces { .. } => {}
        }

        EngineMetrics::inc(&self.metrics.applies_total);
        self.telemetry
            .log_event(format!("{} {} on {}", kind, selection.target, device.name));
        tracing::info!(
            seq = record.seq,
            device = %device.name,
            target = %record.target,
            kind = %kind,
            "Applied"
        );
        record
    }

    pub(crate) async fn open_session(
        &self,
        device: &Device,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        let session = self.connector.open(device).await?;
        self.open_sessions.insert(device.name.clone());
        Ok(session)
    }

    pub(crate) async fn close_session(&self, mut session: Box<dyn DeviceSession>) {
        if let Err(e) = session.close().await {
            tracing::warn!(device = session.device(), error = %e, "Session close failed");
        }
        self.open_sessions.remove(session.device());
    }
}

/// For an installer, the named object already live on the device, if any.
///
/// Catches objects left behind by an earlier run or configured by hand,
/// which the conflict table knows nothing about.
async fn live_object(
    session: &mut dyn DeviceSession,
    kind: ActionKind,
) -> Result<Option<NamedObject>, SessionError> {
    if !kind.installs_named_object() {
        return Ok(None);
    }
    for object in NamedObject::ALL {
        if session
            .query_state(&StateQuery::NamedObjectPresent(object))
            .await?
        {
            return Ok(Some(object));
        }
    }
    Ok(None)
}

/// Run one kind against an open session.
///
/// Interface kinds query live state and only commit what changes. Named
/// objects are committed as given; callers decide whether they apply.
/// Returns the parameters actually applied, or `None` when there was
/// nothing to do.
pub(crate) async fn execute<E>(
    session: &mut dyn DeviceSession,
    kind: ActionKind,
    target: &Target,
    params: &ActionParams,
) -> Result<Option<ActionParams>, E>
where
    E: From<SessionError> + From<CatalogError>,
{
    let applied = match kind.descriptor().effect {
        Effect::SetInterface { disable } => {
            let iface = target.interface().ok_or(CatalogError::ScopeMismatch {
                kind,
                target: target.clone(),
            })?;
            let down = session
                .query_state(&StateQuery::InterfaceDisabled(iface.to_string()))
                .await?;
            if down == disable {
                return Ok(None);
            }
            params.clone()
        }
        Effect::SetAllInterfaces { disable } => {
            let mut changing = Vec::new();
            for iface in &params.interfaces {
                let down = session
                    .query_state(&StateQuery::InterfaceDisabled(iface.clone()))
                    .await?;
                if down != disable {
                    changing.push(iface.clone());
                }
            }
            if changing.is_empty() {
                return Ok(None);
            }
            ActionParams::interfaces(changing)
        }
        Effect::Install(_) | Effect::Remove(_) => params.clone(),
    };

    let delta = render(kind, target, &applied)?;
    session.commit(&delta).await?;
    Ok(Some(applied))
}
