//! # havoc-device
//!
//! Device session abstraction for havoc-monkey.
//!
//! The engine talks to devices only through [`DeviceConnector`] and
//! [`DeviceSession`]. Two implementations ship here:
//!
//! - [`SshConnector`]: Junos over the system `ssh` client (CLI queries,
//!   NETCONF commits)
//! - [`MockFleet`]: in-memory devices with failure injection, for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mock;
pub mod netconf;
pub mod session;
pub mod ssh;

pub use error::SessionError;
pub use mock::{MockFleet, MockSession};
pub use session::{Ack, DeviceConnector, DeviceSession, StateQuery};
pub use ssh::{SshConnector, SshSession};
