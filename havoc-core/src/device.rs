//! Fleet and device model.
//!
//! Devices are built once from the fleet configuration at startup and never
//! change during a run. The engine only ever borrows them.

use serde::Deserialize;
use std::collections::BTreeSet;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Login credentials for a device.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// SSH username.
    pub username: String,
    /// SSH password. `None` means key-based authentication.
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    /// Create credentials with a password.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// Create credentials that rely on SSH keys.
    pub fn key_based(username: &str) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A managed network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Device name from the fleet inventory.
    pub name: String,
    /// Management address (IP or hostname).
    pub address: String,
    /// Credentials used to open sessions.
    pub credentials: Credentials,
    /// Interfaces in inventory order.
    pub interfaces: Vec<String>,
    /// Interfaces that must never be targeted.
    pub excluded: BTreeSet<String>,
}

impl Device {
    /// Create a device with no excluded interfaces.
    pub fn new(name: &str, address: &str, credentials: Credentials, interfaces: &[&str]) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            credentials,
            interfaces: interfaces.iter().map(|i| i.to_string()).collect(),
            excluded: BTreeSet::new(),
        }
    }

    /// Add interfaces to the excluded set.
    pub fn exclude<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(interfaces.into_iter().map(Into::into));
        self
    }

    /// Interfaces that may be targeted, in inventory order.
    pub fn eligible_interfaces(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .filter(|i| !self.excluded.contains(*i))
            .cloned()
            .collect()
    }

    /// Whether the interface is in the excluded set.
    pub fn is_excluded(&self, interface: &str) -> bool {
        self.excluded.contains(interface)
    }
}

/// The immutable set of devices for a run.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    devices: Vec<Device>,
}

impl Fleet {
    /// Build a fleet from devices. Order is preserved.
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// Look up a device by name.
    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// All devices.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the fleet has no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
