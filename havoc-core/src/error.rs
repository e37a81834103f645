//! Error types for havoc-core.

use crate::action::{ActionKind, NamedObject, Target};
use thiserror::Error;

/// Catalog misuse: an action rendered against the wrong scope or without the
/// parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Target does not match the kind's scope.
    #[error("{kind} cannot target {target}")]
    ScopeMismatch {
        /// Kind being rendered.
        kind: ActionKind,
        /// Offending target.
        target: Target,
    },

    /// A required parameter is absent.
    #[error("{kind} requires parameter `{param}`")]
    MissingParam {
        /// Kind being rendered.
        kind: ActionKind,
        /// Missing parameter name.
        param: &'static str,
    },
}

/// A named-object action was attempted while another is still active on the
/// same device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{attempted} on {device} conflicts with active {active:?} ({active_kind} on {active_target})")]
pub struct ConflictError {
    /// Device name.
    pub device: String,
    /// Kind that was attempted.
    pub attempted: ActionKind,
    /// Object currently active.
    pub active: NamedObject,
    /// Kind that installed the active object.
    pub active_kind: ActionKind,
    /// Target of the active object. [`Target::Device`] when the object was
    /// found live on the device rather than installed by this run.
    pub active_target: Target,
}
