//! Junos configuration deltas.
//!
//! Renders an action into the `set`/`delete` statements loaded in one
//! exclusive-mode commit. A delta is either committed whole or not at all.

use crate::action::{ActionKind, ActionParams, Effect, NamedObject, Scope, Target};
use crate::error::CatalogError;

/// Burst size used by the latency policer.
pub const LATENCY_BURST: &str = "10k";

/// An ordered list of configuration statements committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    statements: Vec<String>,
}

impl ConfigDelta {
    /// Create an empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `set` statement.
    pub fn set(mut self, path: impl AsRef<str>) -> Self {
        self.statements.push(format!("set {}", path.as_ref()));
        self
    }

    /// Append a `delete` statement.
    pub fn delete(mut self, path: impl AsRef<str>) -> Self {
        self.statements.push(format!("delete {}", path.as_ref()));
        self
    }

    /// The statements in load order.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Whether the delta has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }
}

/// Render the delta for `kind` applied to `target` with `params`.
///
/// # Errors
///
/// Returns [`CatalogError`] if the target does not match the kind's scope or
/// a parameter the kind needs is missing.
pub fn render(
    kind: ActionKind,
    target: &Target,
    params: &ActionParams,
) -> Result<ConfigDelta, CatalogError> {
    let descriptor = kind.descriptor();

    let interface = match (descriptor.scope, target) {
        (Scope::Interface, Target::Interface(name)) => Some(name.as_str()),
        (Scope::Device, Target::Device) => None,
        _ => {
            return Err(CatalogError::ScopeMismatch {
                kind,
                target: target.clone(),
            })
        }
    };

    let delta = match descriptor.effect {
        Effect::SetInterface { disable } => {
            let iface = require_interface(kind, interface)?;
            interface_state(ConfigDelta::new(), iface, disable)
        }
        Effect::SetAllInterfaces { disable } => {
            if params.interfaces.is_empty() {
                return Err(CatalogError::MissingParam {
                    kind,
                    param: "interfaces",
                });
            }
            params
                .interfaces
                .iter()
                .fold(ConfigDelta::new(), |d, iface| interface_state(d, iface, disable))
        }
        Effect::Install(object) => install(kind, object, interface, params)?,
        Effect::Remove(object) => remove(object, interface),
    };

    Ok(delta)
}

fn require_interface(kind: ActionKind, interface: Option<&str>) -> Result<&str, CatalogError> {
    interface.ok_or(CatalogError::MissingParam {
        kind,
        param: "interface",
    })
}

fn interface_state(delta: ConfigDelta, iface: &str, disable: bool) -> ConfigDelta {
    let path = format!("interfaces {} disable", iface);
    if disable {
        delta.set(path)
    } else {
        delta.delete(path)
    }
}

fn install(
    kind: ActionKind,
    object: NamedObject,
    interface: Option<&str>,
    params: &ActionParams,
) -> Result<ConfigDelta, CatalogError> {
    let filter = format!("firewall family inet filter {} term 1", object.filter_name());
    let policer = format!("firewall policer {}", object.policer_name());

    let mut delta = ConfigDelta::new();

    if object == NamedObject::Latency {
        let ms = params.latency_ms.ok_or(CatalogError::MissingParam {
            kind,
            param: "latency_ms",
        })?;
        delta = delta
            .set(format!(
                "{} if-exceeding bandwidth-limit {}m burst-size-limit {}",
                policer, ms, LATENCY_BURST
            ))
            .set(format!("{} then loss-priority low", policer));
    } else {
        let bandwidth = params.bandwidth_mbps.ok_or(CatalogError::MissingParam {
            kind,
            param: "bandwidth_mbps",
        })?;
        let burst = params.burst_kb.ok_or(CatalogError::MissingParam {
            kind,
            param: "burst_kb",
        })?;
        delta = delta
            .set(format!(
                "{} if-exceeding bandwidth-limit {}m burst-size-limit {}k",
                policer, bandwidth, burst
            ))
            .set(format!("{} then discard", policer));
    }

    if let Some(iface) = interface {
        delta = delta.set(format!("{} from interface {}", filter, iface));
    }
    delta = delta.set(format!("{} then policer {}", filter, object.policer_name()));

    Ok(bind(delta, object, interface))
}

fn remove(object: NamedObject, interface: Option<&str>) -> ConfigDelta {
    let delta = match interface {
        Some(iface) => ConfigDelta::new().delete(format!(
            "interfaces {} unit 0 family inet filter input {}",
            iface,
            object.filter_name()
        )),
        None => ConfigDelta::new().delete(format!(
            "forwarding-options family inet filter input {}",
            object.filter_name()
        )),
    };

    delta
        .delete(format!("firewall family inet filter {}", object.filter_name()))
        .delete(format!("firewall policer {}", object.policer_name()))
}

/// Attach the filter to the interface's input, or to the forwarding table
/// for device-wide objects.
fn bind(delta: ConfigDelta, object: NamedObject, interface: Option<&str>) -> ConfigDelta {
    match interface {
        Some(iface) => delta.set(format!(
            "interfaces {} unit 0 family inet filter input {}",
            iface,
            object.filter_name()
        )),
        None => delta.set(format!(
            "forwarding-options family inet filter input {}",
            object.filter_name()
        )),
    }
}
