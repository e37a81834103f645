//! Change ledger.
//!
//! Append-only, time-ordered record of perturbations whose commit was
//! confirmed. Rollback walks it newest-first.
//!
//! Callers append only after a successful commit; a failed or skipped apply
//! never reaches the ledger.

use crate::action::{ActionKind, ActionParams, Target};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// One confirmed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Sequence number, starting at 1 and strictly increasing.
    pub seq: u64,
    /// Owning device name.
    pub device: String,
    /// Interface or device target.
    pub target: Target,
    /// Kind that was applied.
    pub kind: ActionKind,
    /// Parameters the kind was applied with.
    pub params: ActionParams,
    /// Wall-clock time of the append, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl ChangeRecord {
    /// The kind that undoes this record.
    pub fn inverse(&self) -> Option<ActionKind> {
        self.kind.inverse()
    }
}

/// Append-only sequence of [`ChangeRecord`]s.
#[derive(Debug, Clone)]
pub struct Ledger {
    records: Vec<ChangeRecord>,
    next_seq: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_seq: 1,
        }
    }

    /// Append a confirmed change and return it.
    pub fn append(
        &mut self,
        device: &str,
        target: Target,
        kind: ActionKind,
        params: ActionParams,
    ) -> &ChangeRecord {
        let record = ChangeRecord {
            seq: self.next_seq,
            device: device.to_string(),
            target,
            kind,
            params,
            timestamp_ms: now_ms(),
        };
        self.next_seq += 1;
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Records newest first (rollback order).
    pub fn iter_rev(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().rev()
    }

    /// The last `n` records, oldest first.
    pub fn tail(&self, n: usize) -> Vec<ChangeRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records[start..].to_vec()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<&ChangeRecord> {
        self.records.last()
    }

    /// Records belonging to one device, oldest first.
    pub fn for_device<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a ChangeRecord> {
        self.records.iter().filter(move |r| r.device == device)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
