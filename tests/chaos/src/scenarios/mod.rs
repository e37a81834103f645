//! Chaos scenarios for havoc-monkey.
//!
//! Organized by category:
//!
//! - `rollback` - Ledger ordering, cancellation and net-effect identity
//! - `conflict` - One named object per device
//! - `faults` - Unreachable devices, rejected commits, session hygiene
//! - `randomized` - Long seeded runs checked against every ledger property
//!
//! | Module | Devices | Driver |
//! |--------|---------|--------|
//! | rollback | 1-2 | direct applies and single cycles |
//! | conflict | 1-2 | forced kinds and installer churn |
//! | faults | 1-2 | injected connect/commit failures |
//! | randomized | 2 | autonomous loop, many seeds |

pub mod conflict;
pub mod faults;
