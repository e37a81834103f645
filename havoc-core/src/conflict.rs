//! Named-object conflict tracking.
//!
//! Latency, surge, congestion and shaper actions each install a filter and
//! policer under a fixed name. Installing a second one on a device before the
//! first is reverted would clobber it, so each device holds at most one
//! active named object at a time.

use crate::action::{ActionKind, ActionParams, Effect, NamedObject, Target};
use crate::error::ConflictError;
use std::collections::HashMap;

/// The named object currently installed on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveObject {
    /// Which object.
    pub object: NamedObject,
    /// Kind that installed it.
    pub kind: ActionKind,
    /// Where it was installed.
    pub target: Target,
    /// Parameters it was installed with.
    pub params: ActionParams,
}

/// Per-device active-object markers.
#[derive(Debug, Clone, Default)]
pub struct ConflictTable {
    active: HashMap<String, ActiveObject>,
}

impl ConflictTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `kind` may be applied on `device` now.
    ///
    /// Only installers can conflict; removals and interface actions always
    /// pass.
    pub fn check(&self, device: &str, kind: ActionKind) -> Result<(), ConflictError> {
        if !kind.installs_named_object() {
            return Ok(());
        }

        match self.active.get(device) {
            Some(active) => Err(ConflictError {
                device: device.to_string(),
                attempted: kind,
                active: active.object,
                active_kind: active.kind,
                active_target: active.target.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Whether selecting `kind` for `device` would do anything useful.
    ///
    /// Installers are offered only when the device's slot is free; removals
    /// only when their own object is the one installed.
    pub fn offers(&self, device: &str, kind: ActionKind) -> bool {
        match kind.descriptor().effect {
            Effect::Install(_) => !self.active.contains_key(device),
            Effect::Remove(object) => self
                .active
                .get(device)
                .map(|a| a.object == object)
                .unwrap_or(false),
            Effect::SetInterface { .. } | Effect::SetAllInterfaces { .. } => true,
        }
    }

    /// Mark an object active on a device.
    pub fn activate(&mut self, device: &str, active: ActiveObject) {
        self.active.insert(device.to_string(), active);
    }

    /// Release the marker if it holds `object`. Returns the released marker.
    pub fn release(&mut self, device: &str, object: NamedObject) -> Option<ActiveObject> {
        match self.active.get(device) {
            Some(active) if active.object == object => self.active.remove(device),
            _ => None,
        }
    }

    /// The active marker for a device.
    pub fn active(&self, device: &str) -> Option<&ActiveObject> {
        self.active.get(device)
    }

    /// Number of devices with an active marker.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no device has an active marker.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Drop every marker.
    pub fn clear(&mut self) {
        self.active.clear();
    }
}
