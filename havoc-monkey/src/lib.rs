//! # havoc-monkey
//!
//! Randomized, reversible network fault injection for a fleet of Junos
//! devices.
//!
//! The engine repeatedly picks a device, an interface and a perturbation,
//! commits it, records it in the ledger and waits. Transient perturbations
//! are undone after the wait. On shutdown every recorded change is reverted,
//! newest first.
//!
//! ## Architecture
//!
//! ```text
//!   scheduler ──► engine ──► DeviceConnector ──► device
//!       │           │
//!       │           ├── ledger ─────► rollback (at shutdown)
//!       │           └── conflict table
//!       ▼
//!   telemetry ◄── ingest task ◄── packet capture
//!       │
//!   HTTP: /health /metrics /ledger /events /telemetry /trigger/:kind
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod rollback;
pub mod scheduler;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use engine::{ApplyOutcome, Engine, EngineMetrics, EngineOptions};
pub use error::{CycleError, RollbackError};
pub use rollback::{RevertOutcome, RevertReport, RollbackSummary};
pub use scheduler::{run_cycle, spawn_scheduler, spawn_trigger, CycleReport};
pub use telemetry::{Observation, PacketClass, Telemetry};
