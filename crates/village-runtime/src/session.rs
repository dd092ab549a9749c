//! Session-scoped controller owning the live resource state.
//!
//! One `VillageSession` holds the single explicit state container for a
//! play session: the authoritative snapshot, the aggregate production rate,
//! the sync schedule, and the last surfaced error. The projection and ETA
//! functions stay pure; this controller feeds them values out of the
//! container and guards the one suspending operation (the authoritative
//! re-fetch) with the {Idle, Syncing} state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use village_core::{
    aggregate_rates, CostVector, ProductionSource, ResourceKind, ResourceSnapshot, ResourceVector,
};
use village_econ as econ;

use crate::backend::{ActionId, BackendError, VillageBackend};
use crate::scheduler::{SyncPhase, SyncPolicy, SyncSchedule};

/// Failures surfaced by session operations.
#[derive(Debug, Error, PartialEq)]
pub enum SyncError {
    /// Another sync is already outstanding; the request was not issued.
    #[error("a sync is already in flight")]
    SyncInFlight,
    /// The session was torn down; the result (if any) was discarded.
    #[error("session is closed")]
    Closed,
    /// The backend call itself failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything the presentation layer needs for one display tick.
#[derive(Clone, Debug, Serialize)]
pub struct LiveView {
    /// Extrapolated, capacity-clamped quantities.
    pub live: ResourceVector,
    /// Aggregate configured production in units per hour.
    pub rate_per_hour: ResourceVector,
    /// Displayed rate: zero for resources already at capacity.
    pub effective_rate_per_hour: ResourceVector,
    /// Shared storage capacity.
    pub storage_cap: f64,
    /// Fill percentage per kind, each in `[0, 100]`.
    pub fill_pct: ResourceVector,
    /// Fill percentage of the fullest resource.
    pub fullest_pct: f64,
    /// Countdown to the next automatic sync; 0 when due or in flight.
    pub next_sync_in_seconds: u64,
    /// Whether a sync is outstanding right now.
    pub syncing: bool,
    /// Last sync/action error message, if any.
    pub last_error: Option<String>,
}

struct SessionState {
    snapshot: ResourceSnapshot,
    rate: ResourceVector,
    schedule: SyncSchedule,
    last_error: Option<String>,
    closed: bool,
}

/// The session-scoped resource controller.
///
/// All reads are synchronous and non-blocking; only the sync and action
/// paths suspend, and the internal lock is never held across an await.
pub struct VillageSession<B> {
    backend: B,
    state: Mutex<SessionState>,
}

impl<B: VillageBackend> VillageSession<B> {
    /// Create a session with no live data yet: the first sync (manual or
    /// automatic, which is immediately due) populates it.
    pub fn new(backend: B, policy: SyncPolicy) -> Self {
        Self {
            backend,
            state: Mutex::new(SessionState {
                snapshot: ResourceSnapshot::empty(),
                rate: ResourceVector::zero(),
                schedule: SyncSchedule::new(policy),
                last_error: None,
                closed: false,
            }),
        }
    }

    /// Extrapolated quantities at `now`.
    pub fn live_vector(&self, now: DateTime<Utc>) -> ResourceVector {
        let st = self.state.lock().unwrap();
        econ::project(&st.snapshot, &st.rate, now)
    }

    /// Aggregate configured production in units per hour.
    pub fn rates(&self) -> ResourceVector {
        self.state.lock().unwrap().rate
    }

    /// Fill percentage for one kind at `now`, in `[0, 100]`.
    pub fn fill_percentage(&self, kind: ResourceKind, now: DateTime<Utc>) -> f64 {
        let st = self.state.lock().unwrap();
        let live = econ::project(&st.snapshot, &st.rate, now);
        econ::fill_percentage(&live, st.snapshot.storage_cap, kind)
    }

    /// Whether `cost` is payable out of the projected quantities at `now`.
    ///
    /// Advisory only: the backend re-validates every action.
    pub fn can_afford(&self, cost: &CostVector, now: DateTime<Utc>) -> bool {
        let st = self.state.lock().unwrap();
        let live = econ::project(&st.snapshot, &st.rate, now);
        econ::can_afford(&live, cost)
    }

    /// Seconds until `cost` becomes payable, or `None` if it never will at
    /// current rates.
    pub fn eta_seconds(&self, cost: &CostVector, now: DateTime<Utc>) -> Option<f64> {
        let st = self.state.lock().unwrap();
        let live = econ::project(&st.snapshot, &st.rate, now);
        econ::eta_seconds(&live, cost, &st.rate)
    }

    /// Countdown to the next automatic sync.
    pub fn next_sync_in_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.state.lock().unwrap().schedule.next_sync_in_seconds(now)
    }

    /// Last surfaced error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    /// Snapshot of everything the display needs at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> LiveView {
        let st = self.state.lock().unwrap();
        let cap = st.snapshot.storage_cap;
        let live = econ::project(&st.snapshot, &st.rate, now);
        LiveView {
            live,
            rate_per_hour: st.rate,
            effective_rate_per_hour: econ::effective_rate(&live, cap, &st.rate),
            storage_cap: cap,
            fill_pct: ResourceVector::from_fn(|k| econ::fill_percentage(&live, cap, k)),
            fullest_pct: econ::fullest_percentage(&live, cap),
            next_sync_in_seconds: st.schedule.next_sync_in_seconds(now),
            syncing: st.schedule.phase() == SyncPhase::Syncing,
            last_error: st.last_error.clone(),
        }
    }

    /// Tear the session down. Reads keep serving the last state, but no
    /// further mutation happens and an in-flight sync's result is discarded
    /// when it eventually arrives.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Whether the session was torn down.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Force an authoritative re-fetch, bypassing the schedule but not the
    /// in-flight guard. Failures are returned to the caller; the stale
    /// snapshot keeps being projected either way.
    pub async fn force_sync(&self, now: DateTime<Utc>) -> Result<ResourceSnapshot, SyncError> {
        self.begin_sync()?;
        let fetched = self.fetch_authoritative().await;
        self.apply_sync_result(fetched, now)
    }

    /// Run an automatic sync if one is due. Returns true only when a sync
    /// ran and applied; failures are swallowed (the next natural tick
    /// retries) and cadence is left unchanged.
    pub async fn auto_sync_if_due(&self, now: DateTime<Utc>) -> bool {
        {
            let st = self.state.lock().unwrap();
            if st.closed || !st.schedule.is_due(now) {
                return false;
            }
        }
        if self.begin_sync().is_err() {
            return false;
        }
        let fetched = self.fetch_authoritative().await;
        match self.apply_sync_result(fetched, now) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "background sync failed; waiting for next tick");
                false
            }
        }
    }

    /// Current cost of an action, fetched on demand.
    pub async fn fetch_cost(&self, action: &ActionId) -> Result<CostVector, SyncError> {
        match self.backend.fetch_cost(action).await {
            Ok(cost) => Ok(cost.sanitized()),
            Err(err) => {
                self.state.lock().unwrap().last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Execute an action server-side and apply its authoritative snapshot.
    ///
    /// Local state is never optimistically mutated: a rejection leaves the
    /// projected state exactly as it was.
    pub async fn perform_action(
        &self,
        action: &ActionId,
        now: DateTime<Utc>,
    ) -> Result<ResourceSnapshot, SyncError> {
        if self.state.lock().unwrap().closed {
            return Err(SyncError::Closed);
        }
        match self.backend.perform_action(action).await {
            Ok(snapshot) => {
                let snapshot = snapshot.sanitized();
                let mut st = self.state.lock().unwrap();
                if st.closed {
                    return Err(SyncError::Closed);
                }
                st.snapshot = snapshot;
                st.last_error = None;
                st.schedule.note_authoritative(now);
                info!(action = ?action, "action applied");
                Ok(snapshot)
            }
            Err(err) => {
                let mut st = self.state.lock().unwrap();
                st.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    fn begin_sync(&self) -> Result<(), SyncError> {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            return Err(SyncError::Closed);
        }
        if !st.schedule.begin() {
            return Err(SyncError::SyncInFlight);
        }
        Ok(())
    }

    async fn fetch_authoritative(
        &self,
    ) -> Result<(ResourceSnapshot, Vec<ProductionSource>), BackendError> {
        let snapshot = self.backend.fetch_snapshot().await?;
        let sources = self.backend.fetch_rate_sources().await?;
        Ok((snapshot, sources))
    }

    fn apply_sync_result(
        &self,
        fetched: Result<(ResourceSnapshot, Vec<ProductionSource>), BackendError>,
        now: DateTime<Utc>,
    ) -> Result<ResourceSnapshot, SyncError> {
        let mut st = self.state.lock().unwrap();
        if st.closed {
            // The view is gone; drop the result on the floor.
            return Err(SyncError::Closed);
        }
        st.schedule.finish(now);
        match fetched {
            Ok((snapshot, sources)) => {
                let snapshot = snapshot.sanitized();
                let rate = aggregate_rates(&sources);
                st.snapshot = snapshot;
                st.rate = rate;
                st.last_error = None;
                let live = econ::project(&snapshot, &rate, now);
                let fill = econ::fill_state(&live, snapshot.storage_cap, &rate);
                st.schedule.retarget(&rate, &fill);
                info!(
                    interval_secs = st.schedule.interval_secs(),
                    fullest_pct = fill.fullest_pct,
                    "sync applied"
                );
                Ok(snapshot)
            }
            Err(err) => {
                st.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }
}
