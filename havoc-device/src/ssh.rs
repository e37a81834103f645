//! Junos sessions over the system `ssh` client.
//!
//! Uses `tokio::process::Command` to shell out to `ssh`. Facts and state
//! queries are one CLI command per ssh invocation; the session holds the
//! target and credentials between them. Password logins go through
//! `sshpass -e` so the password never appears on the command line.
//!
//! Commits go over the `netconf` ssh subsystem (see [`crate::netconf`]):
//! the delta is loaded into the locked candidate and committed only if
//! every statement loaded, otherwise the candidate is discarded.

use crate::error::SessionError;
use crate::netconf::{Exchange, ExchangeError};
use crate::session::{Ack, DeviceConnector, DeviceSession, StateQuery};
use async_trait::async_trait;
use havoc_core::{ConfigDelta, Device};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use zeroize::Zeroizing;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Opens [`SshSession`]s.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// Create a connector with the given ssh connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl DeviceConnector for SshConnector {
    async fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        let mut session = SshSession {
            device: device.name.clone(),
            destination: format!("{}@{}", device.credentials.username, device.address),
            password: device.credentials.password.clone().map(Zeroizing::new),
            connect_timeout: self.connect_timeout,
            open: true,
        };

        // Refresh facts; also proves we can log in.
        let facts = session.run("show version").await.map_err(|e| match e {
            SessionError::Spawn(io) => SessionError::Connection {
                device: device.name.clone(),
                reason: io.to_string(),
            },
            other => other,
        })?;

        if !facts.success() {
            return Err(SessionError::Connection {
                device: device.name.clone(),
                reason: facts.stderr.trim().to_string(),
            });
        }

        tracing::debug!(
            device = %device.name,
            model = parse_model(&facts.stdout).unwrap_or("unknown"),
            "Session opened"
        );

        Ok(Box::new(session))
    }
}

/// Result of one ssh invocation.
#[derive(Debug, Clone)]
struct SshOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl SshOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Open session to one Junos device.
pub struct SshSession {
    device: String,
    destination: String,
    password: Option<Zeroizing<String>>,
    connect_timeout: Duration,
    open: bool,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("device", &self.device)
            .field("destination", &self.destination)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("open", &self.open)
            .finish()
    }
}

impl SshSession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.open {
            Ok(())
        } else {
            Err(SessionError::Closed {
                device: self.device.clone(),
            })
        }
    }

    fn command(&self, subsystem: Option<&str>) -> Command {
        let args = ssh_args(
            &self.destination,
            self.connect_timeout.as_secs(),
            self.password.is_none(),
            subsystem,
        );
        match &self.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").args(args);
                cmd.env("SSHPASS", password.as_str());
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.args(args);
                cmd
            }
        }
    }

    /// Run one CLI command.
    async fn run(&self, cli: &str) -> Result<SshOutput, SessionError> {
        let mut cmd = self.command(None);
        cmd.arg(cli)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        let output = child.wait_with_output().await?;

        let result = SshOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if result.exit_code == SSH_CONNECTION_FAILURE {
            return Err(SessionError::Connection {
                device: self.device.clone(),
                reason: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    fn device(&self) -> &str {
        &self.device
    }

    async fn commit(&mut self, delta: &ConfigDelta) -> Result<Ack, SessionError> {
        self.ensure_open()?;
        if delta.is_empty() {
            return Ok(Ack { statements: 0 });
        }

        let mut child = self
            .command(Some("netconf"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SessionError::ConfigApply {
                device: self.device.clone(),
                reason: "netconf pipes unavailable".into(),
            });
        };

        let result = Exchange::new(stdout, stdin).commit(delta).await;
        let output = child.wait_with_output().await?;

        match result {
            Ok(()) => {}
            Err(ExchangeError::Rejected(reason)) => {
                return Err(SessionError::ConfigApply {
                    device: self.device.clone(),
                    reason,
                })
            }
            Err(ExchangeError::Io(e)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let reason = if stderr.is_empty() { e.to_string() } else { stderr };
                return Err(if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
                    SessionError::Connection {
                        device: self.device.clone(),
                        reason,
                    }
                } else {
                    SessionError::ConfigApply {
                        device: self.device.clone(),
                        reason,
                    }
                });
            }
        }

        Ok(Ack {
            statements: delta.len(),
        })
    }

    async fn query_state(&mut self, query: &StateQuery) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let output = self.run(&query_command(query)).await?;
        if !output.success() {
            return Err(SessionError::Query {
                device: self.device.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(parse_query_output(&output.stdout))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.open = false;
        Ok(())
    }
}

/// ssh arguments for a destination.
///
/// `BatchMode` is only set for key-based logins; it would stop sshpass from
/// answering the password prompt. `subsystem` requests an ssh subsystem
/// (e.g. `netconf`) instead of a shell.
pub fn ssh_args(
    destination: &str,
    connect_timeout_secs: u64,
    batch: bool,
    subsystem: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "-T".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout_secs),
    ];
    if batch {
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    }
    if subsystem.is_some() {
        args.push("-s".to_string());
    }
    args.push(destination.to_string());
    args.extend(subsystem.map(str::to_string));
    args
}

/// CLI command answering a state query.
pub fn query_command(query: &StateQuery) -> String {
    match query {
        StateQuery::InterfaceDisabled(iface) => {
            format!("show configuration interfaces {} disable | display set", iface)
        }
        StateQuery::NamedObjectPresent(object) => format!(
            "show configuration firewall policer {} | display set",
            object.policer_name()
        ),
    }
}

/// A query matched if the CLI printed at least one `set` line.
pub fn parse_query_output(stdout: &str) -> bool {
    stdout.lines().any(|l| l.trim_start().starts_with("set "))
}

fn parse_model(show_version: &str) -> Option<&str> {
    show_version
        .lines()
        .find_map(|l| l.trim().strip_prefix("Model:"))
        .map(str::trim)
}
