//! Device session traits.
//!
//! A session is opened against one device, used for any number of state
//! queries and commits, and closed. Callers must close on every exit path,
//! whether the commit succeeded or not.
//!
//! # Example
//!
//! ```ignore
//! let mut session = connector.open(&device).await?;
//! let result = session.commit(&delta).await;
//! session.close().await?;
//! result?;
//! ```

use crate::error::SessionError;
use async_trait::async_trait;
use havoc_core::{ConfigDelta, Device, NamedObject};

/// Live state that can be queried before deciding whether to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateQuery {
    /// Is the interface administratively disabled?
    InterfaceDisabled(String),
    /// Is the named policer present in the configuration?
    NamedObjectPresent(NamedObject),
}

/// Commit acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Number of statements committed.
    pub statements: usize,
}

/// Opens sessions to devices.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Connect, authenticate and refresh device facts.
    ///
    /// Fails with [`SessionError::Connection`] if the device is unreachable
    /// or rejects the credentials.
    async fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError>;
}

/// An open session to one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Name of the device this session belongs to.
    fn device(&self) -> &str;

    /// Apply a delta as a single all-or-nothing commit.
    ///
    /// Deleting a statement that does not exist is not an error.
    async fn commit(&mut self, delta: &ConfigDelta) -> Result<Ack, SessionError>;

    /// Query live configuration state.
    async fn query_state(&mut self, query: &StateQuery) -> Result<bool, SessionError>;

    /// Close the session. Safe to call more than once.
    async fn close(&mut self) -> Result<(), SessionError>;
}
