//! Error types for havoc-monkey.
//!
//! Per-cycle and per-record errors are contained where they happen and
//! logged; only [`ConfigError`](crate::config::ConfigError) stops the
//! process, and only before any chaos has run.

use havoc_core::{ActionKind, CatalogError, ConflictError};
use havoc_device::SessionError;

/// Why one chaos cycle was abandoned.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Device unreachable or login failed.
    #[error("connection error: {0}")]
    Connection(SessionError),

    /// Commit or state query failed.
    #[error("config apply error: {0}")]
    ConfigApply(SessionError),

    /// Would clobber an active named filter/policer.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// The action could not be rendered for its target.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Nothing eligible to perturb.
    #[error("no eligible target for {kind} on {device}")]
    NoEligibleTarget {
        /// Device the cycle picked, or `*` when the fleet offered none.
        device: String,
        /// Kind requested, or `any` for autonomous cycles.
        kind: String,
    },

    /// The device is not in the fleet.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// The engine is no longer accepting new cycles.
    #[error("engine is not running")]
    NotRunning,
}

impl CycleError {
    pub(crate) fn no_target(device: &str, kind: Option<ActionKind>) -> Self {
        CycleError::NoEligibleTarget {
            device: device.to_string(),
            kind: kind.map(|k| k.to_string()).unwrap_or_else(|| "any".into()),
        }
    }
}

impl From<SessionError> for CycleError {
    fn from(err: SessionError) -> Self {
        if err.is_connection() {
            CycleError::Connection(err)
        } else {
            CycleError::ConfigApply(err)
        }
    }
}

/// Why one ledger record could not be reverted.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// The record names a device no longer in the fleet.
    #[error("device {0} is not in the fleet")]
    DeviceUnknown(String),

    /// Device unreachable during rollback.
    #[error("connection error: {0}")]
    Connection(SessionError),

    /// The inverse commit failed.
    #[error("config apply error: {0}")]
    ConfigApply(SessionError),

    /// The inverse could not be rendered.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<SessionError> for RollbackError {
    fn from(err: SessionError) -> Self {
        if err.is_connection() {
            RollbackError::Connection(err)
        } else {
            RollbackError::ConfigApply(err)
        }
    }
}
