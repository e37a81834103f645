//! Telemetry buffers shared between the engine, the ingest task and the
//! HTTP surface.
//!
//! Each buffer sits behind its own mutex. Producers append under the lock,
//! readers copy under the same lock, and nothing is held across an await.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Transport class of an observed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketClass {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// Anything else.
    Other,
}

/// One observation from an external producer (packet capture, samplers).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    /// A packet was seen.
    Packet {
        /// Its transport class.
        class: PacketClass,
    },
    /// A measured latency sample.
    LatencyMs {
        /// Milliseconds.
        value: f64,
    },
    /// A measured packet-loss sample.
    PacketLossPct {
        /// Percent.
        value: f64,
    },
}

/// Packet counts by class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketCounters {
    /// TCP packets.
    pub tcp: u64,
    /// UDP packets.
    pub udp: u64,
    /// Other packets.
    pub other: u64,
}

impl PacketCounters {
    /// Total packets.
    pub fn total(&self) -> u64 {
        self.tcp + self.udp + self.other
    }
}

/// A human-readable chaos event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChaosEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// What happened.
    pub message: String,
}

/// Consistent copy of every buffer.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    /// Newest events last.
    pub events: Vec<ChaosEvent>,
    /// Packet counts.
    pub packets: PacketCounters,
    /// Latency series, oldest first.
    pub latency_ms: Vec<f64>,
    /// Packet-loss series, oldest first.
    pub packet_loss_pct: Vec<f64>,
}

/// Bounded telemetry buffers.
#[derive(Debug)]
pub struct Telemetry {
    events: Mutex<VecDeque<ChaosEvent>>,
    packets: Mutex<PacketCounters>,
    latency: Mutex<VecDeque<f64>>,
    loss: Mutex<VecDeque<f64>>,
    event_capacity: usize,
    series_capacity: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push_bounded<T>(buf: &mut VecDeque<T>, capacity: usize, item: T) {
    if capacity == 0 {
        return;
    }
    while buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(item);
}

impl Telemetry {
    /// Create buffers with the given capacities.
    pub fn new(event_capacity: usize, series_capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(event_capacity)),
            packets: Mutex::new(PacketCounters::default()),
            latency: Mutex::new(VecDeque::with_capacity(series_capacity)),
            loss: Mutex::new(VecDeque::with_capacity(series_capacity)),
            event_capacity,
            series_capacity,
        }
    }

    /// Append an event, evicting the oldest once full.
    pub fn log_event(&self, message: impl Into<String>) {
        let event = ChaosEvent {
            timestamp_ms: now_ms(),
            message: message.into(),
        };
        push_bounded(&mut lock(&self.events), self.event_capacity, event);
    }

    /// Count one packet.
    pub fn record_packet(&self, class: PacketClass) {
        let mut packets = lock(&self.packets);
        match class {
            PacketClass::Tcp => packets.tcp += 1,
            PacketClass::Udp => packets.udp += 1,
            PacketClass::Other => packets.other += 1,
        }
    }

    /// Append a latency sample.
    pub fn record_latency(&self, ms: f64) {
        push_bounded(&mut lock(&self.latency), self.series_capacity, ms);
    }

    /// Append a packet-loss sample.
    pub fn record_packet_loss(&self, pct: f64) {
        push_bounded(&mut lock(&self.loss), self.series_capacity, pct);
    }

    /// Route an observation to its buffer.
    pub fn ingest(&self, observation: Observation) {
        match observation {
            Observation::Packet { class } => self.record_packet(class),
            Observation::LatencyMs { value } => self.record_latency(value),
            Observation::PacketLossPct { value } => self.record_packet_loss(value),
        }
    }

    /// Events, oldest first.
    pub fn events(&self) -> Vec<ChaosEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    /// Current packet counts.
    pub fn packets(&self) -> PacketCounters {
        *lock(&self.packets)
    }

    /// Latency series, oldest first.
    pub fn latency_series(&self) -> Vec<f64> {
        lock(&self.latency).iter().copied().collect()
    }

    /// Packet-loss series, oldest first.
    pub fn packet_loss_series(&self) -> Vec<f64> {
        lock(&self.loss).iter().copied().collect()
    }

    /// Copy every buffer. Each buffer is copied under its own lock.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events: self.events(),
            packets: self.packets(),
            latency_ms: self.latency_series(),
            packet_loss_pct: self.packet_loss_series(),
        }
    }
}

/// Spawn the ingest task.
///
/// Drains observations into `telemetry` until every sender is dropped.
pub fn spawn_ingest_task(
    telemetry: Arc<Telemetry>,
    mut rx: mpsc::Receiver<Observation>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Telemetry ingest started");
        let mut ingested: u64 = 0;
        while let Some(observation) = rx.recv().await {
            telemetry.ingest(observation);
            ingested += 1;
        }
        tracing::info!(ingested, "Telemetry ingest stopped");
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
