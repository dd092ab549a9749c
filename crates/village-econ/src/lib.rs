#![deny(warnings)]

//! Pure projection and affordability math for the village client.
//!
//! Everything here is a side-effect-free function of its inputs: the live
//! resource projection between authoritative snapshots, fill percentages,
//! displayed rates, affordability checks, and time-to-affordable estimates.
//! State lives elsewhere (the runtime crate); these functions are safe to
//! call on every display tick because they always re-derive from the
//! original snapshot and absolute elapsed time, never by accumulating
//! tick-over-tick deltas.

use chrono::{DateTime, Utc};
use village_core::{ResourceKind, ResourceSnapshot, ResourceVector};

/// Rates are expressed in units per hour.
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Extrapolate the snapshot to `now` under `rate`, capacity-clamped.
///
/// For each kind: `quantity + rate/3600 * elapsed`, clamped into
/// `[0, storage_cap]`. A snapshot that was never taken (`taken_at == None`)
/// projects to its stored quantities unmodified, signalling "no live data
/// yet". Negative elapsed time (clock skew) counts as zero.
pub fn project(snapshot: &ResourceSnapshot, rate: &ResourceVector, now: DateTime<Utc>) -> ResourceVector {
    let elapsed = snapshot.elapsed_seconds(now);
    let cap = snapshot.storage_cap.max(0.0);
    snapshot.quantities.map(|kind, q| {
        let accrued = rate.get(kind) / SECONDS_PER_HOUR * elapsed;
        (q + accrued).max(0.0).min(cap)
    })
}

/// Projected quantity over capacity for one kind, in `[0, 100]`.
///
/// A non-positive capacity reads as 0% rather than dividing by zero.
pub fn fill_percentage(live: &ResourceVector, storage_cap: f64, kind: ResourceKind) -> f64 {
    if storage_cap <= 0.0 {
        return 0.0;
    }
    (live.get(kind) / storage_cap * 100.0).clamp(0.0, 100.0)
}

/// Fill percentage of the fullest resource.
pub fn fullest_percentage(live: &ResourceVector, storage_cap: f64) -> f64 {
    ResourceKind::ALL
        .into_iter()
        .map(|k| fill_percentage(live, storage_cap, k))
        .fold(0.0, f64::max)
}

/// The rate actually accruing right now, for display.
///
/// A resource already at capacity reports 0 even when its configured rate is
/// positive: nothing more can accrue until storage is upgraded or spent.
pub fn effective_rate(live: &ResourceVector, storage_cap: f64, rate: &ResourceVector) -> ResourceVector {
    rate.map(|kind, r| if live.get(kind) >= storage_cap { 0.0 } else { r })
}

/// Minutes until `kind` reaches capacity under its current rate.
///
/// `None` when the kind is not producing; `Some(0)` when it is producing but
/// storage is already full.
pub fn minutes_to_cap(
    live: &ResourceVector,
    storage_cap: f64,
    rate: &ResourceVector,
    kind: ResourceKind,
) -> Option<f64> {
    let r = rate.get(kind);
    if r <= 0.0 {
        return None;
    }
    let headroom = (storage_cap - live.get(kind)).max(0.0);
    Some(headroom / r * 60.0)
}

/// Summary of how close storage is to overflowing, for the sync scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillState {
    /// Fill percentage of the fullest resource, `[0, 100]`.
    pub fullest_pct: f64,
    /// Smallest minutes-to-cap among producing resources, if any produce.
    pub min_minutes_to_cap: Option<f64>,
}

/// Compute the [`FillState`] for a live vector under `rate`.
pub fn fill_state(live: &ResourceVector, storage_cap: f64, rate: &ResourceVector) -> FillState {
    let min = ResourceKind::ALL
        .into_iter()
        .filter_map(|k| minutes_to_cap(live, storage_cap, rate, k))
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.min(m))));
    FillState {
        fullest_pct: fullest_percentage(live, storage_cap),
        min_minutes_to_cap: min,
    }
}

/// Whether `cost` is payable out of `live` right now, componentwise.
pub fn can_afford(live: &ResourceVector, cost: &ResourceVector) -> bool {
    ResourceKind::ALL.into_iter().all(|k| live.get(k) >= cost.get(k))
}

/// Seconds until `cost` becomes payable under `rate`, or `None` if it never
/// will at current production.
///
/// The slowest-to-fill resource gates the action, so the result is the
/// maximum over kinds (production of different kinds runs in parallel), not
/// the sum. Any deficient kind with non-positive rate makes the whole action
/// infeasible; `Some(0.0)` means affordable already.
pub fn eta_seconds(
    live: &ResourceVector,
    cost: &ResourceVector,
    rate: &ResourceVector,
) -> Option<f64> {
    let mut worst = 0.0f64;
    for kind in ResourceKind::ALL {
        let deficit = (cost.get(kind) - live.get(kind)).max(0.0);
        if deficit == 0.0 {
            continue;
        }
        let r = rate.get(kind);
        if r <= 0.0 {
            return None;
        }
        worst = worst.max(deficit / r * SECONDS_PER_HOUR);
    }
    Some(worst)
}

/// Format a second count as a compact `1h 02m 03s` / `5m 09s` countdown.
pub fn hms(total_seconds: f64) -> String {
    let s = total_seconds.max(0.0).floor() as u64;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    let ss = s % 60;
    if h > 0 {
        format!("{h}h {m:02}m {ss:02}s")
    } else {
        format!("{m}m {ss:02}s")
    }
}
