//! In-memory mock fleet for testing.
//!
//! Each device's configuration is a set of statement paths, the way Junos
//! shows it under `display set`. `set <path>` inserts the path; `delete
//! <path>` removes the path and everything below it. Commits are validated
//! before anything is applied, so a rejected delta leaves the configuration
//! untouched.
//!
//! Failures can be injected per device (unreachable, next connect, next
//! commit, or any commit containing a given statement).

use crate::error::SessionError;
use crate::session::{Ack, DeviceConnector, DeviceSession, StateQuery};
use async_trait::async_trait;
use havoc_core::{ConfigDelta, Device};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock fleet that is also a [`DeviceConnector`].
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Debug, Default, Clone)]
pub struct MockFleet {
    inner: Arc<Mutex<MockFleetInner>>,
}

#[derive(Debug, Default)]
struct MockFleetInner {
    configs: HashMap<String, BTreeSet<String>>,
    unreachable: HashSet<String>,
    fail_next_connect: HashMap<String, String>,
    fail_next_commit: HashMap<String, String>,
    rejected_statements: HashMap<String, Vec<String>>,
    commit_log: Vec<(String, Vec<String>)>,
    opens: usize,
    closes: usize,
    open_now: usize,
    max_open: usize,
}

impl MockFleet {
    /// Create an empty mock fleet.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockFleetInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a device's configuration with `set` paths (without the `set `).
    pub fn seed<I, S>(&self, device: &str, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.lock();
        inner
            .configs
            .entry(device.to_string())
            .or_default()
            .extend(paths.into_iter().map(Into::into));
    }

    /// Snapshot of a device's configuration.
    pub fn config(&self, device: &str) -> BTreeSet<String> {
        self.lock().configs.get(device).cloned().unwrap_or_default()
    }

    /// Whether the interface is disabled on the device.
    pub fn is_disabled(&self, device: &str, interface: &str) -> bool {
        self.config(device)
            .contains(&format!("interfaces {} disable", interface))
    }

    /// Whether the policer is present on the device.
    pub fn has_policer(&self, device: &str, policer: &str) -> bool {
        let prefix = format!("firewall policer {} ", policer);
        self.config(device).iter().any(|p| p.starts_with(&prefix))
    }

    /// Make a device unreachable (or reachable again).
    pub fn set_unreachable(&self, device: &str, unreachable: bool) {
        let mut inner = self.lock();
        if unreachable {
            inner.unreachable.insert(device.to_string());
        } else {
            inner.unreachable.remove(device);
        }
    }

    /// Cause the next open() on the device to fail.
    pub fn fail_next_connect(&self, device: &str, error: &str) {
        let mut inner = self.lock();
        inner
            .fail_next_connect
            .insert(device.to_string(), error.to_string());
    }

    /// Cause the next commit() on the device to fail.
    pub fn fail_next_commit(&self, device: &str, error: &str) {
        let mut inner = self.lock();
        inner
            .fail_next_commit
            .insert(device.to_string(), error.to_string());
    }

    /// Reject any commit on the device that contains this exact statement.
    pub fn reject_statement(&self, device: &str, statement: &str) {
        let mut inner = self.lock();
        inner
            .rejected_statements
            .entry(device.to_string())
            .or_default()
            .push(statement.to_string());
    }

    /// Successful commits in order, as (device, statements).
    pub fn commit_log(&self) -> Vec<(String, Vec<String>)> {
        self.lock().commit_log.clone()
    }

    /// Successful commits for one device.
    pub fn commits(&self, device: &str) -> Vec<Vec<String>> {
        self.lock()
            .commit_log
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Number of sessions opened so far.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of sessions closed so far.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.lock().open_now
    }

    /// Highest number of sessions ever open at once.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.lock().max_open
    }

    fn commit_on(&self, device: &str, delta: &ConfigDelta) -> Result<Ack, SessionError> {
        let mut inner = self.lock();

        if let Some(reason) = inner.fail_next_commit.remove(device) {
            return Err(SessionError::ConfigApply {
                device: device.to_string(),
                reason,
            });
        }

        if let Some(rejected) = inner.rejected_statements.get(device) {
            if let Some(hit) = delta.statements().iter().find(|s| rejected.contains(s)) {
                return Err(SessionError::ConfigApply {
                    device: device.to_string(),
                    reason: format!("statement rejected: {}", hit),
                });
            }
        }

        let mut next = inner.configs.get(device).cloned().unwrap_or_default();
        for statement in delta.statements() {
            if let Some(path) = statement.strip_prefix("set ") {
                next.insert(path.to_string());
            } else if let Some(path) = statement.strip_prefix("delete ") {
                let below = format!("{} ", path);
                next.retain(|p| p != path && !p.starts_with(&below));
            } else {
                return Err(SessionError::ConfigApply {
                    device: device.to_string(),
                    reason: format!("syntax error: {}", statement),
                });
            }
        }

        inner.configs.insert(device.to_string(), next);
        inner
            .commit_log
            .push((device.to_string(), delta.statements().to_vec()));

        Ok(Ack {
            statements: delta.len(),
        })
    }

    fn query_on(&self, device: &str, query: &StateQuery) -> bool {
        match query {
            StateQuery::InterfaceDisabled(iface) => self.is_disabled(device, iface),
            StateQuery::NamedObjectPresent(object) => {
                self.has_policer(device, object.policer_name())
            }
        }
    }
}

#[async_trait]
impl DeviceConnector for MockFleet {
    async fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        let mut inner = self.lock();

        if let Some(reason) = inner.fail_next_connect.remove(&device.name) {
            return Err(SessionError::Connection {
                device: device.name.clone(),
                reason,
            });
        }

        if inner.unreachable.contains(&device.name) {
            return Err(SessionError::Connection {
                device: device.name.clone(),
                reason: "no route to host".into(),
            });
        }

        inner.configs.entry(device.name.clone()).or_default();
        inner.opens += 1;
        inner.open_now += 1;
        inner.max_open = inner.max_open.max(inner.open_now);

        Ok(Box::new(MockSession {
            fleet: self.clone(),
            device: device.name.clone(),
            open: true,
        }))
    }
}

/// Session handed out by [`MockFleet`].
#[derive(Debug)]
pub struct MockSession {
    fleet: MockFleet,
    device: String,
    open: bool,
}

impl MockSession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.open {
            Ok(())
        } else {
            Err(SessionError::Closed {
                device: self.device.clone(),
            })
        }
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn device(&self) -> &str {
        &self.device
    }

    async fn commit(&mut self, delta: &ConfigDelta) -> Result<Ack, SessionError> {
        self.ensure_open()?;
        self.fleet.commit_on(&self.device, delta)
    }

    async fn query_state(&mut self, query: &StateQuery) -> Result<bool, SessionError> {
        self.ensure_open()?;
        Ok(self.fleet.query_on(&self.device, query))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.open {
            self.open = false;
            let mut inner = self.fleet.lock();
            inner.closes += 1;
            inner.open_now = inner.open_now.saturating_sub(1);
        }
        Ok(())
    }
}
