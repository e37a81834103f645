//! Randomized selection of devices, targets, actions and waits.
//!
//! Pure functions over an injected RNG so selection can be tested with a
//! seeded generator, independent of timing and I/O.

use crate::action::{ActionKind, ActionParams, Effect, NamedObject, Scope, Target};
use crate::conflict::ConflictTable;
use crate::device::{Device, Fleet};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Ranges and fixed values used to pick action parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRanges {
    /// Lowest latency figure in ms.
    pub latency_ms_min: u32,
    /// Highest latency figure in ms.
    pub latency_ms_max: u32,
    /// Lowest shaper ceiling in Mbit/s.
    pub shaper_mbps_min: u32,
    /// Highest shaper ceiling in Mbit/s.
    pub shaper_mbps_max: u32,
    /// Shaper burst size in KB.
    pub shaper_burst_kb: u32,
    /// Surge policer ceiling in Mbit/s.
    pub surge_bandwidth_mbps: u32,
    /// Surge policer burst size in KB.
    pub surge_burst_kb: u32,
    /// Congestion policer ceiling in Mbit/s.
    pub congestion_bandwidth_mbps: u32,
    /// Congestion policer burst size in KB.
    pub congestion_burst_kb: u32,
}

impl Default for ParamRanges {
    fn default() -> Self {
        Self {
            latency_ms_min: 50,
            latency_ms_max: 500,
            shaper_mbps_min: 1,
            shaper_mbps_max: 100,
            shaper_burst_kb: 100,
            surge_bandwidth_mbps: 1000,
            surge_burst_kb: 500,
            congestion_bandwidth_mbps: 10,
            congestion_burst_kb: 100,
        }
    }
}

/// A chosen action, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Kind to apply.
    pub kind: ActionKind,
    /// Where to apply it.
    pub target: Target,
    /// Parameters to apply it with.
    pub params: ActionParams,
}

/// Pick a device uniformly at random.
pub fn select_device<'a, R: Rng + ?Sized>(rng: &mut R, fleet: &'a Fleet) -> Option<&'a Device> {
    fleet.devices().choose(rng)
}

/// Pick an action uniformly from `pool`, restricted to kinds the device's
/// conflict state allows.
///
/// Returns `None` when the device has no eligible interfaces or no kind in
/// the pool is currently allowed.
pub fn select_action<R: Rng + ?Sized>(
    rng: &mut R,
    device: &Device,
    conflicts: &ConflictTable,
    pool: &[ActionKind],
    ranges: &ParamRanges,
) -> Option<Selection> {
    let eligible = device.eligible_interfaces();
    if eligible.is_empty() {
        return None;
    }

    let candidates: Vec<ActionKind> = pool
        .iter()
        .copied()
        .filter(|k| conflicts.offers(&device.name, *k))
        .collect();

    let kind = *candidates.choose(rng)?;
    plan(rng, kind, device, conflicts, ranges)
}

/// Choose a target and parameters for a caller-chosen kind.
///
/// Removals target wherever their object was installed and reuse the
/// installed parameters, so their inverse restores the same object. Without
/// a marker a removal gets a random plan, which the engine applies as a
/// no-op. Returns `None` when the device has no eligible interfaces.
pub fn plan<R: Rng + ?Sized>(
    rng: &mut R,
    kind: ActionKind,
    device: &Device,
    conflicts: &ConflictTable,
    ranges: &ParamRanges,
) -> Option<Selection> {
    let eligible = device.eligible_interfaces();
    if eligible.is_empty() {
        return None;
    }

    let descriptor = kind.descriptor();

    if let Effect::Remove(object) = descriptor.effect {
        if let Some(active) = conflicts.active(&device.name).filter(|a| a.object == object) {
            return Some(Selection {
                kind,
                target: active.target.clone(),
                params: active.params.clone(),
            });
        }
    }

    let target = match descriptor.scope {
        Scope::Interface => Target::Interface(eligible.choose(rng)?.clone()),
        Scope::Device => Target::Device,
    };

    let params = match descriptor.effect {
        Effect::SetInterface { .. } => ActionParams::default(),
        Effect::SetAllInterfaces { .. } => ActionParams::interfaces(eligible),
        Effect::Install(object) | Effect::Remove(object) => object_params(rng, object, ranges),
    };

    Some(Selection {
        kind,
        target,
        params,
    })
}

/// Parameters for installing `object`.
pub fn object_params<R: Rng + ?Sized>(
    rng: &mut R,
    object: NamedObject,
    ranges: &ParamRanges,
) -> ActionParams {
    match object {
        NamedObject::Latency => {
            ActionParams::latency(rng.gen_range(ranges.latency_ms_min..=ranges.latency_ms_max))
        }
        NamedObject::Surge => {
            ActionParams::policer(ranges.surge_bandwidth_mbps, ranges.surge_burst_kb)
        }
        NamedObject::Congestion => {
            ActionParams::policer(ranges.congestion_bandwidth_mbps, ranges.congestion_burst_kb)
        }
        NamedObject::Shaper => ActionParams::policer(
            rng.gen_range(ranges.shaper_mbps_min..=ranges.shaper_mbps_max),
            ranges.shaper_burst_kb,
        ),
    }
}

/// Draw a wait uniformly from `[min, max]`.
pub fn draw_wait<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    Duration::from_secs_f64(rng.gen_range(min.as_secs_f64()..=max.as_secs_f64()))
}
