//! Prometheus metrics endpoint.

use crate::engine::Engine;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges reflect current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(engine): Extension<Arc<Engine>>) -> impl IntoResponse {
    let m = engine.metrics();

    // Gauges
    let running = u8::from(engine.is_running());
    let ledger = engine.ledger_len();
    let markers = engine.conflict_markers();
    let sessions = engine.open_session_count();
    let devices = engine.fleet().len();

    // Counters
    let cycles = m.cycles_total.load(Ordering::Relaxed);
    let applies = m.applies_total.load(Ordering::Relaxed);
    let noops = m.noops_total.load(Ordering::Relaxed);
    let conflicts = m.conflicts_total.load(Ordering::Relaxed);
    let conn_errors = m.connection_errors_total.load(Ordering::Relaxed);
    let apply_errors = m.apply_errors_total.load(Ordering::Relaxed);
    let reverts = m.reverts_total.load(Ordering::Relaxed);
    let revert_failures = m.revert_failures_total.load(Ordering::Relaxed);
    let latency_injections = m.latency_injections_total.load(Ordering::Relaxed);
    let policers = m.policers_installed_total.load(Ordering::Relaxed);

    // Telemetry
    let packets = engine.telemetry().packets();
    let last_latency = engine
        .telemetry()
        .latency_series()
        .last()
        .copied()
        .unwrap_or(0.0);
    let last_loss = engine
        .telemetry()
        .packet_loss_series()
        .last()
        .copied()
        .unwrap_or(0.0);

    let body = format!(
        r#"# HELP havoc_info Engine information
# TYPE havoc_info gauge
havoc_info{{version="{version}"}} 1

# HELP havoc_running Whether the chaos loop accepts new cycles
# TYPE havoc_running gauge
havoc_running {running}

# HELP havoc_devices Devices in the fleet
# TYPE havoc_devices gauge
havoc_devices {devices}

# HELP havoc_ledger_records Change records in the ledger
# TYPE havoc_ledger_records gauge
havoc_ledger_records {ledger}

# HELP havoc_conflict_markers Devices holding an active named filter/policer
# TYPE havoc_conflict_markers gauge
havoc_conflict_markers {markers}

# HELP havoc_open_sessions Devices with an open session
# TYPE havoc_open_sessions gauge
havoc_open_sessions {sessions}

# HELP havoc_cycles_total Chaos cycles started
# TYPE havoc_cycles_total counter
havoc_cycles_total {cycles}

# HELP havoc_applies_total Changes committed and recorded
# TYPE havoc_applies_total counter
havoc_applies_total {applies}

# HELP havoc_noops_total Applies that found nothing to change
# TYPE havoc_noops_total counter
havoc_noops_total {noops}

# HELP havoc_conflicts_total Applies refused by the named-object rule
# TYPE havoc_conflicts_total counter
havoc_conflicts_total {conflicts}

# HELP havoc_connection_errors_total Device connection failures
# TYPE havoc_connection_errors_total counter
havoc_connection_errors_total {conn_errors}

# HELP havoc_apply_errors_total Commit or query failures
# TYPE havoc_apply_errors_total counter
havoc_apply_errors_total {apply_errors}

# HELP havoc_reverts_total Records reverted by rollback
# TYPE havoc_reverts_total counter
havoc_reverts_total {reverts}

# HELP havoc_revert_failures_total Records rollback failed to revert
# TYPE havoc_revert_failures_total counter
havoc_revert_failures_total {revert_failures}

# HELP havoc_latency_injections_total Latency injections committed
# TYPE havoc_latency_injections_total counter
havoc_latency_injections_total {latency_injections}

# HELP havoc_policers_installed_total Filter/policer pairs installed
# TYPE havoc_policers_installed_total counter
havoc_policers_installed_total {policers}

# HELP havoc_packets_total Observed packets by class
# TYPE havoc_packets_total counter
havoc_packets_total{{class="tcp"}} {tcp}
havoc_packets_total{{class="udp"}} {udp}
havoc_packets_total{{class="other"}} {other}

# HELP havoc_latency_ms Most recent latency sample
# TYPE havoc_latency_ms gauge
havoc_latency_ms {last_latency}

# HELP havoc_packet_loss_pct Most recent packet-loss sample
# TYPE havoc_packet_loss_pct gauge
havoc_packet_loss_pct {last_loss}
"#,
        version = env!("CARGO_PKG_VERSION"),
        tcp = packets.tcp,
        udp = packets.udp,
        other = packets.other,
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
