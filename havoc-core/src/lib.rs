//! # havoc-core
//!
//! Pure logic for havoc-monkey (no I/O, instant tests).
//!
//! This crate holds everything about network chaos that can be decided
//! without talking to a device:
//!
//! - [`action`]: the closed catalog of perturbation kinds and their inverses
//! - [`delta`]: rendering an action into Junos configuration statements
//! - [`ledger`]: the append-only record that drives rollback
//! - [`conflict`]: per-device mutual exclusion of named filter/policer pairs
//! - [`select`]: seeded random choice of device, target, action and wait
//! - [`state`]: the engine run-state machine
//!
//! The device I/O lives in `havoc-device`; the engine that ties the two
//! together lives in `havoc-monkey`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod conflict;
pub mod delta;
pub mod device;
pub mod error;
pub mod ledger;
pub mod select;
pub mod state;

pub use action::{
    ActionDescriptor, ActionKind, ActionParams, Effect, NamedObject, Persistence, Scope, Target,
    UnknownActionKind,
};
pub use conflict::{ActiveObject, ConflictTable};
pub use delta::{render, ConfigDelta};
pub use device::{Credentials, Device, Fleet};
pub use error::{CatalogError, ConflictError};
pub use ledger::{ChangeRecord, Ledger};
pub use select::{draw_wait, object_params, plan, select_action, select_device, ParamRanges, Selection};
pub use state::{RunEvent, RunState};
