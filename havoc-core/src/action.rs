//! The action catalog.
//!
//! Every perturbation the engine can apply is one [`ActionKind`]. Its
//! [`ActionDescriptor`] describes, as data, what the action touches, how it is
//! undone and whether the scheduler undoes it on its own after the wait.
//!
//! Adding a new kind means adding a variant here and a rendering arm in
//! [`crate::delta`]; the scheduler and rollback engine need no changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of perturbation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Mark an interface administratively down.
    DisableInterface,
    /// Mark an interface administratively up.
    EnableInterface,
    /// Install the latency filter and policer on an interface.
    InjectLatency,
    /// Delete the latency filter and policer.
    RemoveLatency,
    /// Install the surge discard policer on an interface.
    CreateSurge,
    /// Delete the surge filter and policer.
    RemoveSurge,
    /// Install the device-wide congestion discard policer.
    SimulateCongestion,
    /// Delete the congestion filter and policer.
    RemoveCongestion,
    /// Install a bandwidth-limiting shaper on an interface.
    CreateShaper,
    /// Delete the shaper filter and policer.
    RemoveShaper,
    /// Disable every eligible interface in one commit.
    DisableAllInterfaces,
    /// Enable every eligible interface in one commit.
    EnableAllInterfaces,
}

impl ActionKind {
    /// Every kind, in catalog order.
    pub const ALL: [ActionKind; 12] = [
        ActionKind::DisableInterface,
        ActionKind::EnableInterface,
        ActionKind::InjectLatency,
        ActionKind::RemoveLatency,
        ActionKind::CreateSurge,
        ActionKind::RemoveSurge,
        ActionKind::SimulateCongestion,
        ActionKind::RemoveCongestion,
        ActionKind::CreateShaper,
        ActionKind::RemoveShaper,
        ActionKind::DisableAllInterfaces,
        ActionKind::EnableAllInterfaces,
    ];

    /// Kinds that introduce a fault (as opposed to clearing one).
    pub const PERTURBING: [ActionKind; 6] = [
        ActionKind::DisableInterface,
        ActionKind::InjectLatency,
        ActionKind::CreateSurge,
        ActionKind::SimulateCongestion,
        ActionKind::CreateShaper,
        ActionKind::DisableAllInterfaces,
    ];

    /// Kebab-case name, as used in config files, logs and the HTTP surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DisableInterface => "disable-interface",
            ActionKind::EnableInterface => "enable-interface",
            ActionKind::InjectLatency => "inject-latency",
            ActionKind::RemoveLatency => "remove-latency",
            ActionKind::CreateSurge => "create-surge",
            ActionKind::RemoveSurge => "remove-surge",
            ActionKind::SimulateCongestion => "simulate-congestion",
            ActionKind::RemoveCongestion => "remove-congestion",
            ActionKind::CreateShaper => "create-shaper",
            ActionKind::RemoveShaper => "remove-shaper",
            ActionKind::DisableAllInterfaces => "disable-all-interfaces",
            ActionKind::EnableAllInterfaces => "enable-all-interfaces",
        }
    }

    /// The static descriptor for this kind.
    pub fn descriptor(self) -> ActionDescriptor {
        use ActionKind::*;
        use NamedObject::*;

        let (scope, effect, inverse, persistence) = match self {
            DisableInterface => (
                Scope::Interface,
                Effect::SetInterface { disable: true },
                EnableInterface,
                Persistence::Transient,
            ),
            EnableInterface => (
                Scope::Interface,
                Effect::SetInterface { disable: false },
                DisableInterface,
                Persistence::Persistent,
            ),
            InjectLatency => (
                Scope::Interface,
                Effect::Install(Latency),
                RemoveLatency,
                Persistence::Transient,
            ),
            RemoveLatency => (
                Scope::Interface,
                Effect::Remove(Latency),
                InjectLatency,
                Persistence::Persistent,
            ),
            CreateSurge => (
                Scope::Interface,
                Effect::Install(Surge),
                RemoveSurge,
                Persistence::Persistent,
            ),
            RemoveSurge => (
                Scope::Interface,
                Effect::Remove(Surge),
                CreateSurge,
                Persistence::Persistent,
            ),
            SimulateCongestion => (
                Scope::Device,
                Effect::Install(Congestion),
                RemoveCongestion,
                Persistence::Persistent,
            ),
            RemoveCongestion => (
                Scope::Device,
                Effect::Remove(Congestion),
                SimulateCongestion,
                Persistence::Persistent,
            ),
            CreateShaper => (
                Scope::Interface,
                Effect::Install(Shaper),
                RemoveShaper,
                Persistence::Persistent,
            ),
            RemoveShaper => (
                Scope::Interface,
                Effect::Remove(Shaper),
                CreateShaper,
                Persistence::Persistent,
            ),
            DisableAllInterfaces => (
                Scope::Device,
                Effect::SetAllInterfaces { disable: true },
                EnableAllInterfaces,
                Persistence::Persistent,
            ),
            EnableAllInterfaces => (
                Scope::Device,
                Effect::SetAllInterfaces { disable: false },
                DisableAllInterfaces,
                Persistence::Persistent,
            ),
        };

        ActionDescriptor {
            kind: self,
            scope,
            effect,
            inverse: Some(inverse),
            persistence,
        }
    }

    /// The semantic inverse of this kind.
    pub fn inverse(self) -> Option<ActionKind> {
        self.descriptor().inverse
    }

    /// Whether the scheduler reverts this kind itself after the wait.
    pub fn is_transient(self) -> bool {
        self.descriptor().persistence == Persistence::Transient
    }

    /// The named object this kind installs or removes, if any.
    pub fn named_object(self) -> Option<NamedObject> {
        match self.descriptor().effect {
            Effect::Install(object) | Effect::Remove(object) => Some(object),
            _ => None,
        }
    }

    /// Whether this kind installs a singly-named filter/policer pair.
    pub fn installs_named_object(self) -> bool {
        matches!(self.descriptor().effect, Effect::Install(_))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownActionKind(s.to_string()))
    }
}

/// Returned when parsing an unknown action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action kind: {0}")]
pub struct UnknownActionKind(pub String);

/// What an action is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A single interface.
    Interface,
    /// The whole device.
    Device,
}

/// Whether the scheduler undoes the action within the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Inverse applied automatically after the wait.
    Transient,
    /// Stays active until rollback.
    Persistent,
}

/// The configuration effect of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Change one interface's administrative state.
    SetInterface {
        /// `true` to disable, `false` to enable.
        disable: bool,
    },
    /// Change the administrative state of a list of interfaces.
    SetAllInterfaces {
        /// `true` to disable, `false` to enable.
        disable: bool,
    },
    /// Install a named filter/policer pair.
    Install(NamedObject),
    /// Delete a named filter/policer pair.
    Remove(NamedObject),
}

/// Singly-named firewall objects. Only one can be active per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedObject {
    /// `LATENCY` filter + `LATENCY_POLICER`.
    Latency,
    /// `SURGE` filter + `SURGE_POLICER`.
    Surge,
    /// `CONGESTION` filter + `CONGESTION_POLICER`.
    Congestion,
    /// `SHAPER` filter + `SHAPER_POLICER`.
    Shaper,
}

impl NamedObject {
    /// Every named object.
    pub const ALL: [NamedObject; 4] = [
        NamedObject::Latency,
        NamedObject::Surge,
        NamedObject::Congestion,
        NamedObject::Shaper,
    ];

    /// Kind that installs this object.
    pub fn installer(self) -> ActionKind {
        match self {
            NamedObject::Latency => ActionKind::InjectLatency,
            NamedObject::Surge => ActionKind::CreateSurge,
            NamedObject::Congestion => ActionKind::SimulateCongestion,
            NamedObject::Shaper => ActionKind::CreateShaper,
        }
    }

    /// Firewall filter name.
    pub fn filter_name(&self) -> &'static str {
        match self {
            NamedObject::Latency => "LATENCY",
            NamedObject::Surge => "SURGE",
            NamedObject::Congestion => "CONGESTION",
            NamedObject::Shaper => "SHAPER",
        }
    }

    /// Policer name.
    pub fn policer_name(&self) -> &'static str {
        match self {
            NamedObject::Latency => "LATENCY_POLICER",
            NamedObject::Surge => "SURGE_POLICER",
            NamedObject::Congestion => "CONGESTION_POLICER",
            NamedObject::Shaper => "SHAPER_POLICER",
        }
    }
}

/// Static description of one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// The kind described.
    pub kind: ActionKind,
    /// Interface or device scope.
    pub scope: Scope,
    /// What the action does to configuration.
    pub effect: Effect,
    /// Semantic inverse.
    pub inverse: Option<ActionKind>,
    /// Transient or persistent.
    pub persistence: Persistence,
}

/// What an action is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "lowercase")]
pub enum Target {
    /// A single interface.
    Interface(String),
    /// The whole device.
    Device,
}

impl Target {
    /// Interface name, if interface-scoped.
    pub fn interface(&self) -> Option<&str> {
        match self {
            Target::Interface(name) => Some(name),
            Target::Device => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Interface(name) => f.write_str(name),
            Target::Device => f.write_str("*"),
        }
    }
}

/// Parameters an action was (or will be) applied with.
///
/// Captured verbatim in the ledger so the inverse can undo exactly what was
/// done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Latency figure for `inject-latency`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u32>,
    /// Policer bandwidth ceiling in Mbit/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_mbps: Option<u32>,
    /// Policer burst size in KB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_kb: Option<u32>,
    /// Interfaces touched by a device-wide interface action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
}

impl ActionParams {
    /// Parameters for a latency injection.
    pub fn latency(ms: u32) -> Self {
        Self {
            latency_ms: Some(ms),
            ..Default::default()
        }
    }

    /// Parameters for a discard/shaping policer.
    pub fn policer(bandwidth_mbps: u32, burst_kb: u32) -> Self {
        Self {
            bandwidth_mbps: Some(bandwidth_mbps),
            burst_kb: Some(burst_kb),
            ..Default::default()
        }
    }

    /// Parameters for an all-interfaces action.
    pub fn interfaces<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}
