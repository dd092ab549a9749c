#![deny(warnings)]

//! Core domain models and invariants for the village client.
//!
//! This crate defines the serializable types shared by the projection math
//! and the sync runtime: resource kinds, dense per-kind vectors, the
//! authoritative snapshot, and per-building production sources. Values
//! arriving from the backend pass through sanitization so that garbage
//! (non-finite or negative numbers) is coerced to zero instead of reaching
//! the display layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The harvestable resource schema.
///
/// This enum is the single configuration point for the resource taxonomy:
/// every vector, rate, and cost is keyed by it, and no other code names a
/// concrete resource. Adding a variant here (and to [`ResourceKind::ALL`])
/// extends the whole engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Gathered plant matter.
    Plants,
    /// Scavenged bones.
    Bones,
    /// Hunted meat.
    Meat,
}

impl ResourceKind {
    /// All kinds in canonical order. Iteration order is fixed.
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Plants, ResourceKind::Bones, ResourceKind::Meat];

    /// Number of kinds in the schema.
    pub const COUNT: usize = Self::ALL.len();

    /// Lowercase wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Plants => "plants",
            ResourceKind::Bones => "bones",
            ResourceKind::Meat => "meat",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coerce a backend-supplied number to a safe quantity.
///
/// Non-finite and negative values become `0.0`; showing zero beats showing
/// garbage.
pub fn sanitize_quantity(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

/// A dense vector of one `f64` per [`ResourceKind`].
///
/// Every kind is always present (zero-filled); no key is ever dropped. The
/// same type carries quantities, production rates (units per hour), and
/// action costs. Serialized as a map keyed by kind name; missing keys
/// deserialize as zero and garbage values are coerced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ResourceKind, f64>", into = "BTreeMap<ResourceKind, f64>")]
pub struct ResourceVector([f64; ResourceKind::COUNT]);

/// A non-negative cost for a specific upgrade or training action.
pub type CostVector = ResourceVector;

impl ResourceVector {
    /// The all-zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build a vector by evaluating `f` for every kind.
    pub fn from_fn(mut f: impl FnMut(ResourceKind) -> f64) -> Self {
        let mut v = Self::zero();
        for kind in ResourceKind::ALL {
            v.set(kind, f(kind));
        }
        v
    }

    /// Component for `kind`.
    pub fn get(&self, kind: ResourceKind) -> f64 {
        self.0[kind as usize]
    }

    /// Overwrite the component for `kind`.
    pub fn set(&mut self, kind: ResourceKind, value: f64) {
        self.0[kind as usize] = value;
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, kind: ResourceKind, value: f64) -> Self {
        self.set(kind, value);
        self
    }

    /// Iterate components in canonical kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, f64)> + '_ {
        ResourceKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Componentwise transform.
    pub fn map(self, mut f: impl FnMut(ResourceKind, f64) -> f64) -> Self {
        Self::from_fn(|k| f(k, self.get(k)))
    }

    /// Sum across all kinds.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Componentwise [`sanitize_quantity`].
    pub fn sanitized(self) -> Self {
        self.map(|_, v| sanitize_quantity(v))
    }
}

impl From<BTreeMap<ResourceKind, f64>> for ResourceVector {
    fn from(map: BTreeMap<ResourceKind, f64>) -> Self {
        Self::from_fn(|k| sanitize_quantity(map.get(&k).copied().unwrap_or(0.0)))
    }
}

impl From<ResourceVector> for BTreeMap<ResourceKind, f64> {
    fn from(v: ResourceVector) -> Self {
        v.iter().collect()
    }
}

/// The last authoritative resource reading and when it was taken.
///
/// Immutable once created; replaced wholesale on each successful sync.
/// `taken_at == None` means no sync has ever occurred, and projections must
/// return the stored quantities unmodified.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Confirmed quantities per kind.
    pub quantities: ResourceVector,
    /// Shared storage capacity; every quantity is capped by it.
    pub storage_cap: f64,
    /// Wall-clock instant the reading was taken, if any sync has happened.
    pub taken_at: Option<DateTime<Utc>>,
}

impl ResourceSnapshot {
    /// The pre-first-sync snapshot: all zero, no capacity, never taken.
    pub fn empty() -> Self {
        Self {
            quantities: ResourceVector::zero(),
            storage_cap: 0.0,
            taken_at: None,
        }
    }

    /// Coerce backend garbage and clamp quantities into `[0, storage_cap]`.
    ///
    /// The clamp keeps the zero-elapsed projection collapse exact: a
    /// sanitized snapshot already satisfies the componentwise bound.
    pub fn sanitized(self) -> Self {
        let cap = sanitize_quantity(self.storage_cap);
        Self {
            quantities: self.quantities.map(|_, q| sanitize_quantity(q).min(cap)),
            storage_cap: cap,
            taken_at: self.taken_at,
        }
    }

    /// Seconds elapsed between `taken_at` and `now`, never negative.
    ///
    /// Zero when no sync has occurred or when `now` precedes the snapshot
    /// (clock skew).
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        match self.taken_at {
            Some(taken) => ((now - taken).num_milliseconds() as f64 / 1000.0).max(0.0),
            None => 0.0,
        }
    }
}

/// One building's production contribution, as reported by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionSource {
    /// Building type identifier, e.g. "gathering_grove".
    pub building: String,
    /// Current building level.
    pub level: u32,
    /// Production contribution in units per hour.
    pub per_hour: ResourceVector,
}

/// Reduce per-building contributions into the aggregate rate vector.
///
/// Each contribution is sanitized before summing, so one garbage row cannot
/// poison the aggregate.
pub fn aggregate_rates(sources: &[ProductionSource]) -> ResourceVector {
    sources
        .iter()
        .fold(ResourceVector::zero(), |acc, s| {
            let clean = s.per_hour.sanitized();
            acc.map(|k, v| v + clean.get(k))
        })
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite numeric value encountered")]
    NonFinite,
    /// Quantities and rates must be non-negative.
    #[error("negative quantity for {0}")]
    NegativeQuantity(ResourceKind),
    /// Storage capacity must be non-negative.
    #[error("storage capacity must be >= 0")]
    NegativeCap,
    /// Quantity exceeds the storage capacity.
    #[error("quantity for {0} exceeds storage capacity")]
    OverCap(ResourceKind),
    /// Production source is missing its building identifier.
    #[error("production source has no building identifier")]
    UnnamedSource,
}

/// Validate a snapshot against the componentwise storage invariant.
pub fn validate_snapshot(snapshot: &ResourceSnapshot) -> Result<(), ValidationError> {
    if !snapshot.storage_cap.is_finite() {
        return Err(ValidationError::NonFinite);
    }
    if snapshot.storage_cap < 0.0 {
        return Err(ValidationError::NegativeCap);
    }
    for (kind, q) in snapshot.quantities.iter() {
        if !q.is_finite() {
            return Err(ValidationError::NonFinite);
        }
        if q < 0.0 {
            return Err(ValidationError::NegativeQuantity(kind));
        }
        if q > snapshot.storage_cap {
            return Err(ValidationError::OverCap(kind));
        }
    }
    Ok(())
}

/// Validate a production source.
pub fn validate_source(source: &ProductionSource) -> Result<(), ValidationError> {
    if source.building.trim().is_empty() {
        return Err(ValidationError::UnnamedSource);
    }
    for (kind, r) in source.per_hour.iter() {
        if !r.is_finite() {
            return Err(ValidationError::NonFinite);
        }
        if r < 0.0 {
            return Err(ValidationError::NegativeQuantity(kind));
        }
    }
    Ok(())
}
