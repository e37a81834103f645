//! Device fault scenarios.
//!
//! Connection failures and rejected commits are per-cycle events: nothing
//! is recorded, the device is untouched and the loop keeps going.

#[cfg(test)]
mod tests {
    use crate::assertions::{assert_ledger_matches_applies, assert_net_effect_identity};
    use crate::harness::{fast_options, lab_device, successful_applies, ChaosHarness};
    use havoc_core::{ActionKind, ActionParams};
    use havoc_monkey::{ApplyOutcome, CycleError};
    use std::sync::atomic::Ordering;

    // ========================================================================
    // Connection failures
    // ========================================================================

    /// An unreachable device costs cycles, not the run.
    #[tokio::test]
    async fn unreachable_device_skips_cycle() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"]), lab_device("B", &["i1"])],
            fast_options(&[ActionKind::DisableInterface], 21),
        );
        harness.mock.set_unreachable("A", true);

        let reports = harness.run_cycles(20).await;

        let refused = reports
            .iter()
            .filter(|r| matches!(r.step, Err(CycleError::Connection(_))))
            .count();
        assert!(refused > 0, "seed never picked A");
        assert!(harness.engine.is_running());
        assert!(harness
            .engine
            .ledger_snapshot()
            .iter()
            .all(|r| r.device == "B"));
        assert_ledger_matches_applies(
            &harness.engine.ledger_snapshot(),
            successful_applies(&reports),
        )
        .unwrap();
        assert_eq!(
            harness
                .engine
                .metrics()
                .connection_errors_total
                .load(Ordering::Relaxed),
            refused as u64
        );
    }

    /// A one-off connect failure affects exactly one apply.
    #[tokio::test]
    async fn transient_connect_failure_recovers() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"])],
            fast_options(&[ActionKind::DisableInterface], 22),
        );
        harness.mock.fail_next_connect("A", "connection reset");

        let err = harness
            .apply_on("A", ActionKind::DisableInterface, "i1", ActionParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(harness.engine.ledger_len(), 0);

        let seq = harness
            .apply_on("A", ActionKind::DisableInterface, "i1", ActionParams::default())
            .await
            .unwrap();
        assert_eq!(seq, 1);
    }

    // ========================================================================
    // Rejected commits
    // ========================================================================

    /// A rejected commit records nothing and leaves the config alone.
    #[tokio::test]
    async fn rejected_commit_records_nothing() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"])],
            fast_options(&[ActionKind::CreateSurge], 23),
        );
        harness.mock.fail_next_commit("A", "error: database locked");

        let err = harness
            .engine
            .step(Some(ActionKind::CreateSurge))
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::ConfigApply(_)));
        assert_eq!(harness.engine.ledger_len(), 0);
        assert!(harness.engine.active_object("A").is_none());
        assert_eq!(harness.snapshot(), *harness.baseline());
        assert_eq!(
            harness.engine.metrics().apply_errors_total.load(Ordering::Relaxed),
            1
        );

        harness
            .engine
            .step(Some(ActionKind::CreateSurge))
            .await
            .unwrap();
        assert_eq!(harness.engine.ledger_len(), 1);
    }

    /// One bad interface sinks the whole all-interfaces commit.
    #[tokio::test]
    async fn partial_all_interfaces_rejection_changes_nothing() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2", "i3"])],
            fast_options(&[ActionKind::DisableAllInterfaces], 24),
        );
        harness.mock.reject_statement("A", "set interfaces i2 disable");

        let err = harness
            .engine
            .step(Some(ActionKind::DisableAllInterfaces))
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::ConfigApply(_)));
        assert_eq!(harness.engine.ledger_len(), 0);
        for iface in ["i1", "i2", "i3"] {
            assert!(!harness.mock.is_disabled("A", iface));
        }
    }

    // ========================================================================
    // Idempotence
    // ========================================================================

    /// Re-applying a state the device already has is a no-op, not an error.
    #[tokio::test]
    async fn reapplying_current_state_is_noop() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"])],
            fast_options(&[ActionKind::DisableInterface], 25),
        );

        let enable = harness.engine.step(Some(ActionKind::EnableInterface)).await;
        assert_eq!(enable.unwrap(), ApplyOutcome::NoOp);

        let remove = harness.engine.step(Some(ActionKind::RemoveLatency)).await;
        assert_eq!(remove.unwrap(), ApplyOutcome::NoOp);

        assert_eq!(harness.engine.ledger_len(), 0);
        assert!(harness.mock.commit_log().is_empty());
        assert_eq!(
            harness.engine.metrics().noops_total.load(Ordering::Relaxed),
            2
        );
    }

    // ========================================================================
    // Session hygiene
    // ========================================================================

    /// Every session is closed whatever the outcome, and none overlap.
    #[tokio::test]
    async fn sessions_closed_after_every_outcome() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2"]), lab_device("B", &["i1"])],
            fast_options(&ActionKind::ALL, 26),
        );
        harness.mock.fail_next_commit("A", "commit failed");
        harness.mock.reject_statement("B", "set interfaces i1 disable");

        harness.run_cycles(30).await;
        harness.engine.rollback().await;

        assert_eq!(harness.mock.open_sessions(), 0);
        assert_eq!(harness.mock.opens(), harness.mock.closes());
        assert_eq!(harness.mock.max_concurrent_sessions(), 1);
        assert_eq!(harness.engine.open_session_count(), 0);
        assert_net_effect_identity(harness.baseline(), &harness.snapshot()).unwrap();
    }
}
