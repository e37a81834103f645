//! # havoc-chaos-tests
//!
//! End-to-end chaos scenarios for havoc-monkey.
//!
//! Every scenario drives a real [`havoc_monkey::Engine`] against an
//! in-memory [`havoc_device::MockFleet`], so the whole apply, record and
//! rollback path runs without a lab:
//! - Rollback ordering and net-effect identity
//! - Named-object conflicts
//! - Device faults (unreachable devices, rejected commits)
//! - Long randomized runs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
