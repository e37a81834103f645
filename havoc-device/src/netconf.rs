//! NETCONF commit exchange (RFC 6241 base:1.0 framing).
//!
//! A delta is loaded with `load-configuration action="set"` into the locked
//! candidate and committed only if the load reported no errors. Any error
//! before the commit discards the candidate, so the running configuration
//! is either fully changed or untouched.
//!
//! ```text
//! hello ─► lock ─► load-configuration ─► commit ─► unlock ─► close-session
//!                         │ rpc-error       │ rpc-error
//!                         └──► discard-changes, unlock, close-session
//! ```

use havoc_core::ConfigDelta;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// End-of-message marker for base:1.0 framing.
pub const DELIMITER: &str = "]]>]]>";

const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Why a NETCONF exchange failed.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The transport broke mid-exchange.
    #[error("netconf transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered with an `rpc-error` of severity `error`.
    #[error("{0}")]
    Rejected(String),
}

/// Client `<hello>`.
pub fn hello() -> String {
    format!(
        "<hello xmlns=\"{}\"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>",
        BASE_NS
    )
}

/// Wrap an operation in an `<rpc>` envelope.
pub fn rpc(message_id: u32, body: &str) -> String {
    format!(
        "<rpc message-id=\"{}\" xmlns=\"{}\">{}</rpc>",
        message_id, BASE_NS, body
    )
}

/// `load-configuration` carrying the delta's `set`/`delete` lines.
pub fn load_set(delta: &ConfigDelta) -> String {
    let mut lines = String::new();
    for statement in delta.statements() {
        lines.push_str(&escape(statement));
        lines.push('\n');
    }
    format!(
        "<load-configuration action=\"set\" format=\"text\"><configuration-set>\n{}</configuration-set></load-configuration>",
        lines
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// First `rpc-error` of severity `error` in a reply, by its message.
///
/// Warnings (e.g. deleting a statement that is not there) are ignored.
pub fn rpc_error(reply: &str) -> Option<String> {
    reply
        .split("<rpc-error>")
        .skip(1)
        .map(|block| block.split("</rpc-error>").next().unwrap_or(block))
        .find(|block| block.contains("<error-severity>error</error-severity>"))
        .map(|block| {
            element(block, "error-message")
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or("rpc-error")
                .to_string()
        })
}

fn element<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)?;
    let body_start = start + xml[start..].find('>')? + 1;
    let end = body_start + xml[body_start..].find(&close)?;
    Some(&xml[body_start..end])
}

/// One framed NETCONF conversation over a byte stream.
pub struct Exchange<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
    next_id: u32,
}

impl<R, W> Exchange<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a reader (device output) and writer (device input).
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
            next_id: 1,
        }
    }

    async fn send(&mut self, message: &str) -> std::io::Result<()> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(DELIMITER.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn recv(&mut self) -> std::io::Result<String> {
        let delimiter = DELIMITER.as_bytes();
        loop {
            if let Some(pos) = self
                .buf
                .windows(delimiter.len())
                .position(|w| w == delimiter)
            {
                let message: Vec<u8> = self.buf.drain(..pos + delimiter.len()).collect();
                return Ok(String::from_utf8_lossy(&message[..pos]).into_owned());
            }
            let mut chunk = [0u8; 4096];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn call(&mut self, body: &str) -> Result<(), ExchangeError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&rpc(id, body)).await?;
        let reply = self.recv().await?;
        match rpc_error(&reply) {
            Some(reason) => Err(ExchangeError::Rejected(reason)),
            None => Ok(()),
        }
    }

    /// Lock, load, commit. On any rejection after the lock the candidate is
    /// discarded before the session closes.
    pub async fn commit(mut self, delta: &ConfigDelta) -> Result<(), ExchangeError> {
        self.send(&hello()).await?;
        self.recv().await?;

        self.call("<lock><target><candidate/></target></lock>").await?;

        let result = match self.call(&load_set(delta)).await {
            Ok(()) => self.call("<commit/>").await,
            Err(e) => Err(e),
        };

        if let Err(ExchangeError::Rejected(reason)) = &result {
            tracing::debug!(reason = %reason, "Discarding candidate");
            if let Err(e) = self.call("<discard-changes/>").await {
                tracing::warn!(error = ?e, "discard-changes failed");
            }
        }

        // Best effort; the device drops the lock with the session anyway.
        let _ = self.call("<unlock><target><candidate/></target></unlock>").await;
        let _ = self.call("<close-session/>").await;
        result
    }
}
