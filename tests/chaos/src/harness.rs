//! Chaos test harness: an engine wired to an in-memory fleet.
//!
//! Waits are zero and the RNG is seeded, so scenarios are deterministic and
//! run in milliseconds. The harness keeps a handle on the mock fleet to
//! inject failures and read device configuration back.

use crate::assertions::FleetConfig;
use havoc_core::{ActionKind, ActionParams, Credentials, Device, Fleet, Selection, Target};
use havoc_device::MockFleet;
use havoc_monkey::{run_cycle, ApplyOutcome, CycleError, CycleReport, Engine, EngineOptions};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The engine refused or failed the apply.
    #[error("apply failed: {0}")]
    Apply(#[from] CycleError),

    /// The apply succeeded but changed nothing.
    #[error("apply on {device} was a no-op")]
    NoOp {
        /// Device the apply targeted.
        device: String,
    },
}

/// Build a lab device with key-based credentials.
pub fn lab_device(name: &str, interfaces: &[&str]) -> Device {
    Device::new(name, "192.0.2.1", Credentials::key_based("lab"), interfaces)
}

/// Engine options with zero waits and a fixed seed.
pub fn fast_options(actions: &[ActionKind], seed: u64) -> EngineOptions {
    EngineOptions {
        sleep_min: Duration::ZERO,
        sleep_max: Duration::ZERO,
        actions: actions.to_vec(),
        seed: Some(seed),
        ..EngineOptions::default()
    }
}

/// Engine plus mock fleet, with a recorded configuration baseline.
pub struct ChaosHarness {
    /// Shared handle on the devices the engine talks to.
    pub mock: MockFleet,
    /// The engine under test.
    pub engine: Arc<Engine>,
    baseline: FleetConfig,
}

impl ChaosHarness {
    /// Build a harness over `devices`.
    pub fn new(devices: Vec<Device>, options: EngineOptions) -> Self {
        let mock = MockFleet::new();
        let engine = Arc::new(Engine::new(
            Fleet::new(devices),
            Arc::new(mock.clone()),
            options,
        ));
        let mut harness = Self {
            mock,
            engine,
            baseline: FleetConfig::new(),
        };
        harness.mark_baseline();
        harness
    }

    /// Seed a device's starting configuration and re-record the baseline.
    pub fn seed<I, S>(&mut self, device: &str, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mock.seed(device, paths);
        self.mark_baseline();
    }

    fn mark_baseline(&mut self) {
        self.baseline = self.snapshot();
    }

    /// Configuration at the time the harness was built (or last seeded).
    pub fn baseline(&self) -> &FleetConfig {
        &self.baseline
    }

    /// Current configuration of every fleet device.
    pub fn snapshot(&self) -> FleetConfig {
        self.engine
            .fleet()
            .devices()
            .iter()
            .map(|d| (d.name.clone(), self.mock.config(&d.name)))
            .collect()
    }

    /// Run `n` cycles of the autonomous loop, one after another.
    pub async fn run_cycles(&self, n: usize) -> Vec<CycleReport> {
        let mut reports = Vec::with_capacity(n);
        for _ in 0..n {
            reports.push(run_cycle(&self.engine, None).await);
        }
        reports
    }

    /// Apply `kind` on one interface and expect a recorded change.
    pub async fn apply_on(
        &self,
        device: &str,
        kind: ActionKind,
        interface: &str,
        params: ActionParams,
    ) -> Result<u64, HarnessError> {
        let selection = Selection {
            kind,
            target: Target::Interface(interface.to_string()),
            params,
        };
        match self.engine.apply(device, &selection).await? {
            ApplyOutcome::Applied(record) => Ok(record.seq),
            ApplyOutcome::NoOp => Err(HarnessError::NoOp {
                device: device.to_string(),
            }),
        }
    }
}

/// Total records appended across cycle reports.
pub fn successful_applies(reports: &[CycleReport]) -> usize {
    reports.iter().map(|r| r.records().len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn baseline_tracks_seeded_config() {
        let mut harness = ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2"])],
            fast_options(&ActionKind::PERTURBING, 1),
        );
        assert!(harness.baseline()["A"].is_empty());

        harness.seed("A", ["interfaces i2 disable"]);
        assert!(harness.baseline()["A"].contains("interfaces i2 disable"));
        assert_eq!(harness.snapshot(), *harness.baseline());
    }

    #[tokio::test]
    async fn apply_on_reports_noop() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"])],
            fast_options(&ActionKind::PERTURBING, 1),
        );
        let err = harness
            .apply_on("A", ActionKind::EnableInterface, "i1", ActionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::NoOp { .. }));
    }
}
