//! Assertion helpers for chaos testing.
//!
//! These are pure functions that verify engine state after a chaos scenario
//! completes. They take state as input and return pass/fail.

use havoc_core::{ChangeRecord, Fleet};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration of every device, as statement paths.
pub type FleetConfig = BTreeMap<String, BTreeSet<String>>;

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }

    /// Panic with the failure details if the assertion failed.
    pub fn unwrap(self) {
        if !self.passed {
            panic!(
                "{}: {}",
                self.description,
                self.failure_details.unwrap_or_default()
            );
        }
    }
}

/// Assert that the ledger holds exactly one record per successful apply.
pub fn assert_ledger_matches_applies(
    ledger: &[ChangeRecord],
    successful_applies: usize,
) -> AssertionResult {
    if ledger.len() == successful_applies {
        AssertionResult::pass(&format!(
            "Ledger holds {} records for {} successful applies",
            ledger.len(),
            successful_applies
        ))
    } else {
        AssertionResult::fail(
            "Ledger length equals successful applies",
            &format!(
                "ledger has {} records, {} applies succeeded",
                ledger.len(),
                successful_applies
            ),
        )
    }
}

/// Assert that sequence numbers run 1, 2, 3, ... without gaps.
pub fn assert_sequence_contiguous(ledger: &[ChangeRecord]) -> AssertionResult {
    for (i, record) in ledger.iter().enumerate() {
        let expected = i as u64 + 1;
        if record.seq != expected {
            return AssertionResult::fail(
                "Ledger sequence is contiguous",
                &format!("position {} has seq {}, expected {}", i, record.seq, expected),
            );
        }
    }
    AssertionResult::pass("Ledger sequence is contiguous")
}

/// Assert that rollback processed records in strictly decreasing sequence
/// order.
pub fn assert_strictly_decreasing(order: &[u64]) -> AssertionResult {
    match order.windows(2).find(|w| w[0] <= w[1]) {
        Some(w) => AssertionResult::fail(
            "Rollback order is strictly decreasing",
            &format!("seq {} processed before seq {}", w[0], w[1]),
        ),
        None => AssertionResult::pass("Rollback order is strictly decreasing"),
    }
}

/// Assert that no record targets an excluded interface.
pub fn assert_no_excluded_targets(ledger: &[ChangeRecord], fleet: &Fleet) -> AssertionResult {
    for record in ledger {
        let Some(device) = fleet.get(&record.device) else {
            return AssertionResult::fail(
                "No excluded targets",
                &format!("seq {} names unknown device {}", record.seq, record.device),
            );
        };

        let touched = record
            .target
            .interface()
            .into_iter()
            .chain(record.params.interfaces.iter().map(String::as_str));

        for iface in touched {
            if device.is_excluded(iface) {
                return AssertionResult::fail(
                    "No excluded targets",
                    &format!(
                        "seq {} ({}) touches excluded {} on {}",
                        record.seq, record.kind, iface, record.device
                    ),
                );
            }
        }
    }
    AssertionResult::pass("No excluded targets")
}

/// Assert that every device's configuration is back to its baseline.
pub fn assert_net_effect_identity(before: &FleetConfig, after: &FleetConfig) -> AssertionResult {
    for (device, baseline) in before {
        let empty = BTreeSet::new();
        let now = after.get(device).unwrap_or(&empty);
        if now != baseline {
            let added: Vec<&String> = now.difference(baseline).collect();
            let lost: Vec<&String> = baseline.difference(now).collect();
            return AssertionResult::fail(
                "Net-effect identity after rollback",
                &format!("{} differs: added {:?}, lost {:?}", device, added, lost),
            );
        }
    }
    AssertionResult::pass("Net-effect identity after rollback")
}

/// Assert that no device holds more than one named policer.
pub fn assert_single_named_object(config: &FleetConfig) -> AssertionResult {
    for (device, paths) in config {
        let policers: BTreeSet<&str> = paths
            .iter()
            .filter_map(|p| p.strip_prefix("firewall policer "))
            .filter_map(|rest| rest.split_whitespace().next())
            .collect();
        if policers.len() > 1 {
            return AssertionResult::fail(
                "At most one named object per device",
                &format!("{} holds {:?}", device, policers),
            );
        }
    }
    AssertionResult::pass("At most one named object per device")
}

#[cfg(test)]
mod tests {
    use super::*;
    use havoc_core::{ActionKind, ActionParams, Credentials, Device, Ledger, Target};

    fn ledger(entries: &[(&str, &str, ActionKind)]) -> Vec<ChangeRecord> {
        let mut ledger = Ledger::new();
        for (device, iface, kind) in entries {
            ledger.append(
                device,
                Target::Interface(iface.to_string()),
                *kind,
                ActionParams::default(),
            );
        }
        ledger.records().to_vec()
    }

    fn config(entries: &[(&str, &[&str])]) -> FleetConfig {
        entries
            .iter()
            .map(|(d, paths)| {
                (
                    d.to_string(),
                    paths.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_ledger_matches_applies() {
        let records = ledger(&[("A", "i1", ActionKind::DisableInterface)]);
        assert!(assert_ledger_matches_applies(&records, 1).passed);
        assert!(!assert_ledger_matches_applies(&records, 2).passed);
    }

    #[test]
    fn test_sequence_contiguous() {
        let records = ledger(&[
            ("A", "i1", ActionKind::DisableInterface),
            ("A", "i1", ActionKind::EnableInterface),
        ]);
        assert!(assert_sequence_contiguous(&records).passed);
        assert!(!assert_sequence_contiguous(&records[1..]).passed);
    }

    #[test]
    fn test_strictly_decreasing() {
        assert!(assert_strictly_decreasing(&[3, 2, 1]).passed);
        assert!(assert_strictly_decreasing(&[]).passed);
        assert!(!assert_strictly_decreasing(&[3, 3, 1]).passed);
        assert!(!assert_strictly_decreasing(&[1, 2]).passed);
    }

    #[test]
    fn test_no_excluded_targets() {
        let fleet = Fleet::new(vec![Device::new(
            "A",
            "10.0.0.1",
            Credentials::key_based("lab"),
            &["i1", "i2"],
        )
        .exclude(["i2"])]);

        let ok = ledger(&[("A", "i1", ActionKind::DisableInterface)]);
        assert!(assert_no_excluded_targets(&ok, &fleet).passed);

        let bad = ledger(&[("A", "i2", ActionKind::DisableInterface)]);
        let result = assert_no_excluded_targets(&bad, &fleet);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("i2"));
    }

    #[test]
    fn test_no_excluded_targets_checks_interface_lists() {
        let fleet = Fleet::new(vec![Device::new(
            "A",
            "10.0.0.1",
            Credentials::key_based("lab"),
            &["i1", "i2"],
        )
        .exclude(["i2"])]);
        let mut l = Ledger::new();
        l.append(
            "A",
            Target::Device,
            ActionKind::DisableAllInterfaces,
            ActionParams::interfaces(["i1", "i2"]),
        );
        assert!(!assert_no_excluded_targets(l.records(), &fleet).passed);
    }

    #[test]
    fn test_net_effect_identity() {
        let before = config(&[("A", &["interfaces i3 disable"])]);
        assert!(assert_net_effect_identity(&before, &before.clone()).passed);

        let after = config(&[("A", &["interfaces i3 disable", "interfaces i1 disable"])]);
        let result = assert_net_effect_identity(&before, &after);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("interfaces i1 disable"));
    }

    #[test]
    fn test_single_named_object() {
        let one = config(&[(
            "A",
            &[
                "firewall policer SURGE_POLICER then discard",
                "firewall policer SURGE_POLICER if-exceeding bandwidth-limit 1000m burst-size-limit 500k",
            ],
        )]);
        assert!(assert_single_named_object(&one).passed);

        let two = config(&[(
            "A",
            &[
                "firewall policer SURGE_POLICER then discard",
                "firewall policer LATENCY_POLICER then loss-priority low",
            ],
        )]);
        assert!(!assert_single_named_object(&two).passed);
    }
}
