//! Named-object conflict scenarios.
//!
//! A device holds at most one filter/policer pair at a time. A second
//! installer is refused before any session is opened. An object already
//! live on the device, which this run did not install, blocks installers
//! and is never removed.

#[cfg(test)]
mod tests {
    use crate::assertions::{assert_net_effect_identity, assert_single_named_object};
    use crate::harness::{fast_options, lab_device, ChaosHarness, HarnessError};
    use havoc_core::{ActionKind, ActionParams, NamedObject, Target};
    use havoc_monkey::CycleError;
    use std::sync::atomic::Ordering;

    const OBJECT_KINDS: [ActionKind; 8] = [
        ActionKind::InjectLatency,
        ActionKind::RemoveLatency,
        ActionKind::CreateSurge,
        ActionKind::RemoveSurge,
        ActionKind::SimulateCongestion,
        ActionKind::RemoveCongestion,
        ActionKind::CreateShaper,
        ActionKind::RemoveShaper,
    ];

    fn single_device() -> ChaosHarness {
        ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2"]).exclude(["i2"])],
            fast_options(&OBJECT_KINDS, 11),
        )
    }

    // ========================================================================
    // Refusal
    // ========================================================================

    /// Two surges in a row: the second is refused and only one is recorded.
    #[tokio::test]
    async fn second_surge_is_refused() {
        let harness = single_device();

        let first = harness
            .engine
            .step(Some(ActionKind::CreateSurge))
            .await
            .unwrap();
        assert_eq!(
            first.record().unwrap().target,
            Target::Interface("i1".into())
        );

        let opens = harness.mock.opens();
        let err = harness
            .engine
            .step(Some(ActionKind::CreateSurge))
            .await
            .unwrap_err();

        match err {
            CycleError::Conflict(conflict) => {
                assert_eq!(conflict.device, "A");
                assert_eq!(conflict.active, NamedObject::Surge);
                assert_eq!(conflict.attempted, ActionKind::CreateSurge);
            }
            other => panic!("expected conflict, got {other}"),
        }

        let surges = harness
            .engine
            .ledger_snapshot()
            .iter()
            .filter(|r| r.kind == ActionKind::CreateSurge)
            .count();
        assert_eq!(surges, 1);
        assert_eq!(harness.mock.opens(), opens);
        assert_eq!(
            harness.engine.metrics().conflicts_total.load(Ordering::Relaxed),
            1
        );
    }

    /// A different installer is refused just the same.
    #[tokio::test]
    async fn latency_blocked_by_active_shaper() {
        let harness = single_device();
        harness
            .apply_on("A", ActionKind::CreateShaper, "i1", ActionParams::policer(50, 500))
            .await
            .unwrap();

        let err = harness
            .apply_on("A", ActionKind::InjectLatency, "i1", ActionParams::latency(80))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("conflicts"));
        assert!(!harness
            .mock
            .has_policer("A", NamedObject::Latency.policer_name()));
    }

    /// Surge left on i2 by an earlier run, at 200m/50k.
    const LIVE_SURGE: [&str; 5] = [
        "firewall policer SURGE_POLICER if-exceeding bandwidth-limit 200m burst-size-limit 50k",
        "firewall policer SURGE_POLICER then discard",
        "firewall family inet filter SURGE term 1 from interface i2",
        "firewall family inet filter SURGE term 1 then policer SURGE_POLICER",
        "interfaces i2 unit 0 family inet filter input SURGE",
    ];

    fn with_live_surge(actions: &[ActionKind]) -> ChaosHarness {
        let mut harness = ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2"])],
            fast_options(actions, 14),
        );
        harness.seed("A", LIVE_SURGE);
        harness
    }

    fn live_surge_intact(harness: &ChaosHarness) -> bool {
        let config = harness.mock.config("A");
        LIVE_SURGE.iter().all(|p| config.contains(*p))
    }

    /// A surge already on the device refuses a new one without touching it.
    #[tokio::test]
    async fn live_surge_blocks_install() {
        let harness = with_live_surge(&OBJECT_KINDS);

        let err = harness
            .apply_on("A", ActionKind::CreateSurge, "i1", ActionParams::policer(1000, 500))
            .await
            .unwrap_err();
        match err {
            HarnessError::Apply(CycleError::Conflict(conflict)) => {
                assert_eq!(conflict.active, NamedObject::Surge);
                assert_eq!(conflict.attempted, ActionKind::CreateSurge);
            }
            other => panic!("expected conflict, got {other}"),
        }

        let latency = harness
            .apply_on("A", ActionKind::InjectLatency, "i1", ActionParams::latency(80))
            .await;
        assert!(matches!(
            latency,
            Err(HarnessError::Apply(CycleError::Conflict(_)))
        ));

        assert!(harness.mock.commit_log().is_empty());
        assert!(live_surge_intact(&harness));
        assert!(harness.engine.active_object("A").is_none());
        assert_eq!(harness.engine.ledger_len(), 0);
        assert_eq!(
            harness.engine.metrics().conflicts_total.load(Ordering::Relaxed),
            2
        );
    }

    /// A removal never deletes an object this run did not install.
    #[tokio::test]
    async fn live_surge_is_not_removed() {
        let harness = with_live_surge(&OBJECT_KINDS);

        let err = harness
            .apply_on("A", ActionKind::RemoveSurge, "i2", ActionParams::policer(1000, 500))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::NoOp { .. }));

        assert!(harness.mock.commit_log().is_empty());
        assert!(live_surge_intact(&harness));
        assert_eq!(harness.engine.ledger_len(), 0);
    }

    /// Churn over a device with a live surge leaves it in place, and rollback
    /// returns exactly to the seeded configuration.
    #[tokio::test]
    async fn churn_and_rollback_preserve_live_surge() {
        let harness = with_live_surge(&ActionKind::ALL);

        for _ in 0..30 {
            harness.run_cycles(1).await;
            assert_single_named_object(&harness.snapshot()).unwrap();
            assert!(live_surge_intact(&harness));
        }
        let _ = harness.engine.step(Some(ActionKind::RemoveSurge)).await;

        harness.engine.rollback().await;
        assert!(live_surge_intact(&harness));
        assert_net_effect_identity(harness.baseline(), &harness.snapshot()).unwrap();
    }

    // ========================================================================
    // Slot lifecycle
    // ========================================================================

    /// Removing the active object frees the slot for another kind.
    #[tokio::test]
    async fn removal_frees_slot() {
        let harness = single_device();

        harness
            .engine
            .step(Some(ActionKind::CreateSurge))
            .await
            .unwrap();
        let removal = harness
            .engine
            .step(Some(ActionKind::RemoveSurge))
            .await
            .unwrap();
        let record = removal.record().unwrap();
        assert_eq!(record.target, Target::Interface("i1".into()));
        assert!(record.params.bandwidth_mbps.is_some());
        assert!(harness.engine.active_object("A").is_none());

        harness
            .engine
            .step(Some(ActionKind::InjectLatency))
            .await
            .unwrap();
        assert_eq!(
            harness.engine.active_object("A").map(|a| a.object),
            Some(NamedObject::Latency)
        );
    }

    /// Slots are per device.
    #[tokio::test]
    async fn slots_are_per_device() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1"]), lab_device("B", &["i1"])],
            fast_options(&OBJECT_KINDS, 12),
        );

        for device in ["A", "B"] {
            harness
                .apply_on(device, ActionKind::CreateSurge, "i1", ActionParams::policer(1000, 500))
                .await
                .unwrap();
        }

        assert_eq!(harness.engine.conflict_markers(), 2);
        assert!(harness.mock.has_policer("A", NamedObject::Surge.policer_name()));
        assert!(harness.mock.has_policer("B", NamedObject::Surge.policer_name()));
    }

    // ========================================================================
    // Churn
    // ========================================================================

    /// The autonomous loop never stacks objects, and everything unwinds.
    #[tokio::test]
    async fn installer_churn_keeps_one_object_per_device() {
        let harness = ChaosHarness::new(
            vec![lab_device("A", &["i1", "i2"]), lab_device("B", &["i1"])],
            fast_options(&OBJECT_KINDS, 13),
        );

        for _ in 0..60 {
            harness.run_cycles(1).await;
            assert_single_named_object(&harness.snapshot()).unwrap();

            for device in ["A", "B"] {
                let marker = harness.engine.active_object(device).map(|a| a.object);
                for object in [
                    NamedObject::Latency,
                    NamedObject::Surge,
                    NamedObject::Congestion,
                    NamedObject::Shaper,
                ] {
                    assert_eq!(
                        harness.mock.has_policer(device, object.policer_name()),
                        marker == Some(object),
                        "{device} marker {marker:?} disagrees on {object:?}"
                    );
                }
            }
        }

        assert_eq!(
            harness.engine.metrics().conflicts_total.load(Ordering::Relaxed),
            0
        );
        harness.engine.rollback().await;
        assert_net_effect_identity(harness.baseline(), &harness.snapshot()).unwrap();
    }
}
