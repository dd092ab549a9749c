//! Adaptive sync scheduling.
//!
//! Polling frequency trades server load against display staleness. Urgency
//! tracks how soon a resource would silently overflow and waste production,
//! so the interval shortens as the soonest-to-fill resource approaches
//! capacity, and stretches out when nothing is producing or storage is
//! already full.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use village_core::ResourceVector;
use village_econ::FillState;

/// Minutes-to-cap thresholds for the interval ladder.
const IMMINENT_MINS: f64 = 5.0;
const SOON_MINS: f64 = 15.0;
const WITHIN_HOUR_MINS: f64 = 60.0;

/// Interval settings for the adaptive scheduler, all in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Hard minimum between automatic syncs; prevents sync storms.
    pub floor_secs: u64,
    /// Hard maximum; prevents staleness when idle.
    pub ceiling_secs: u64,
    /// Nothing is producing at all.
    pub idle_secs: u64,
    /// The fullest resource is essentially at capacity.
    pub near_full_secs: u64,
    /// Fill percentage at which a resource counts as essentially full.
    pub near_full_pct: f64,
    /// Some resource fills within five minutes.
    pub imminent_secs: u64,
    /// Some resource fills within fifteen minutes.
    pub soon_secs: u64,
    /// Some resource fills within the hour.
    pub within_hour_secs: u64,
    /// Production is running with plenty of headroom.
    pub relaxed_secs: u64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            floor_secs: 10,
            ceiling_secs: 900,
            idle_secs: 600,
            near_full_secs: 300,
            near_full_pct: 99.0,
            imminent_secs: 15,
            soon_secs: 30,
            within_hour_secs: 60,
            relaxed_secs: 120,
        }
    }
}

impl SyncPolicy {
    /// Pick the polling interval for the given production and fill state.
    ///
    /// Ordered policy, first match wins: idle production, then
    /// essentially-full storage (nothing more to gain by syncing faster),
    /// then the minutes-to-cap ladder.
    pub fn interval_for(&self, rate: &ResourceVector, fill: &FillState) -> u64 {
        let raw = if rate.total() <= 0.0 {
            self.idle_secs
        } else if fill.fullest_pct >= self.near_full_pct {
            self.near_full_secs
        } else {
            match fill.min_minutes_to_cap {
                Some(mins) if mins <= IMMINENT_MINS => self.imminent_secs,
                Some(mins) if mins <= SOON_MINS => self.soon_secs,
                Some(mins) if mins <= WITHIN_HOUR_MINS => self.within_hour_secs,
                _ => self.relaxed_secs,
            }
        };
        raw.clamp(self.floor_secs, self.ceiling_secs)
    }
}

/// Phase of the one-outstanding-sync state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// No request outstanding.
    Idle,
    /// Exactly one request outstanding.
    Syncing,
}

/// Scheduling state for authoritative re-fetches.
///
/// Transitions: [`begin`](SyncSchedule::begin) moves Idle → Syncing and
/// refuses re-entry; [`finish`](SyncSchedule::finish) moves back to Idle and
/// stamps `last_sync_at` whether the sync succeeded or failed. The interval
/// is re-targeted separately, and only after a successful sync.
#[derive(Clone, Copy, Debug)]
pub struct SyncSchedule {
    policy: SyncPolicy,
    interval_secs: u64,
    last_sync_at: Option<DateTime<Utc>>,
    phase: SyncPhase,
}

impl SyncSchedule {
    /// New schedule at the relaxed interval, immediately due.
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            interval_secs: policy.relaxed_secs.clamp(policy.floor_secs, policy.ceiling_secs),
            last_sync_at: None,
            phase: SyncPhase::Idle,
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Current polling interval in seconds.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Current state-machine phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Whether an automatic sync should fire at `now`.
    ///
    /// Never true while a sync is in flight. A schedule that has never
    /// synced is immediately due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.phase == SyncPhase::Syncing {
            return false;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(self.interval_secs as i64),
        }
    }

    /// Try to claim the in-flight slot. Returns false if already Syncing.
    pub fn begin(&mut self) -> bool {
        if self.phase == SyncPhase::Idle {
            self.phase = SyncPhase::Syncing;
            true
        } else {
            false
        }
    }

    /// Record sync completion (success or failure) at `now`.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.phase = SyncPhase::Idle;
        self.last_sync_at = Some(now);
    }

    /// Record that an authoritative snapshot arrived outside the sync path
    /// (an action response). Defers the next automatic re-fetch, but leaves
    /// an in-flight sync's bookkeeping alone.
    pub fn note_authoritative(&mut self, now: DateTime<Utc>) {
        if self.phase == SyncPhase::Idle {
            self.last_sync_at = Some(now);
        }
    }

    /// Re-target the interval from fresh production and fill state.
    pub fn retarget(&mut self, rate: &ResourceVector, fill: &FillState) {
        self.interval_secs = self.policy.interval_for(rate, fill);
    }

    /// Seconds until the next automatic sync; 0 when due or in flight.
    pub fn next_sync_in_seconds(&self, now: DateTime<Utc>) -> u64 {
        match (self.phase, self.last_sync_at) {
            (SyncPhase::Syncing, _) | (_, None) => 0,
            (SyncPhase::Idle, Some(last)) => {
                let elapsed = (now - last).num_seconds().max(0) as u64;
                self.interval_secs.saturating_sub(elapsed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use village_core::ResourceKind;

    fn producing(total: f64) -> ResourceVector {
        ResourceVector::zero().with(ResourceKind::Plants, total)
    }

    fn fill(fullest_pct: f64, mins: Option<f64>) -> FillState {
        FillState {
            fullest_pct,
            min_minutes_to_cap: mins,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn idle_production_gets_the_slowest_interval() {
        let p = SyncPolicy::default();
        let interval = p.interval_for(&ResourceVector::zero(), &fill(50.0, None));
        assert_eq!(interval, p.idle_secs);
        for candidate in [
            p.near_full_secs,
            p.imminent_secs,
            p.soon_secs,
            p.within_hour_secs,
            p.relaxed_secs,
        ] {
            assert!(interval >= candidate);
        }
    }

    #[test]
    fn essentially_full_storage_wins_over_the_ladder() {
        let p = SyncPolicy::default();
        // Even with one minute to cap, a 99% fullest resource means there is
        // nothing to gain by polling faster.
        assert_eq!(
            p.interval_for(&producing(100.0), &fill(99.0, Some(1.0))),
            p.near_full_secs
        );
    }

    #[test]
    fn ladder_boundaries_are_inclusive() {
        let p = SyncPolicy::default();
        let cases = [
            (4.0, p.imminent_secs),
            (5.0, p.imminent_secs),
            (5.01, p.soon_secs),
            (15.0, p.soon_secs),
            (45.0, p.within_hour_secs),
            (60.0, p.within_hour_secs),
            (61.0, p.relaxed_secs),
        ];
        for (mins, expected) in cases {
            assert_eq!(
                p.interval_for(&producing(100.0), &fill(50.0, Some(mins))),
                expected,
                "mins={mins}"
            );
        }
        // Producing but nothing ever fills (cap effectively unbounded).
        assert_eq!(
            p.interval_for(&producing(100.0), &fill(50.0, None)),
            p.relaxed_secs
        );
    }

    #[test]
    fn intervals_are_clamped_to_floor_and_ceiling() {
        let p = SyncPolicy {
            imminent_secs: 1,
            idle_secs: 30_000,
            ..SyncPolicy::default()
        };
        assert_eq!(
            p.interval_for(&producing(100.0), &fill(50.0, Some(1.0))),
            p.floor_secs
        );
        assert_eq!(
            p.interval_for(&ResourceVector::zero(), &fill(0.0, None)),
            p.ceiling_secs
        );
    }

    #[test]
    fn state_machine_admits_one_sync_at_a_time() {
        let mut s = SyncSchedule::new(SyncPolicy::default());
        assert_eq!(s.phase(), SyncPhase::Idle);
        assert!(s.begin());
        assert_eq!(s.phase(), SyncPhase::Syncing);
        assert!(!s.begin());
        s.finish(t0());
        assert_eq!(s.phase(), SyncPhase::Idle);
        assert!(s.begin());
    }

    #[test]
    fn due_logic_respects_interval_and_in_flight_guard() {
        let mut s = SyncSchedule::new(SyncPolicy::default());
        // Never synced: immediately due.
        assert!(s.is_due(t0()));
        assert_eq!(s.next_sync_in_seconds(t0()), 0);

        assert!(s.begin());
        assert!(!s.is_due(t0()));
        s.finish(t0());

        let interval = s.interval_secs() as i64;
        assert!(!s.is_due(t0() + Duration::seconds(interval - 1)));
        assert!(s.is_due(t0() + Duration::seconds(interval)));
        assert_eq!(
            s.next_sync_in_seconds(t0() + Duration::seconds(10)),
            (interval - 10) as u64
        );

        // In flight suppresses dueness even past the deadline.
        assert!(s.begin());
        assert!(!s.is_due(t0() + Duration::seconds(interval * 2)));
    }

    #[test]
    fn action_responses_defer_the_next_fetch_only_when_idle() {
        let mut s = SyncSchedule::new(SyncPolicy::default());
        assert!(s.begin());
        s.finish(t0());

        s.note_authoritative(t0() + Duration::seconds(60));
        let interval = s.interval_secs() as i64;
        assert!(!s.is_due(t0() + Duration::seconds(interval)));
        assert!(s.is_due(t0() + Duration::seconds(60 + interval)));

        // While syncing, the action path must not disturb bookkeeping.
        assert!(s.begin());
        let before = s.next_sync_in_seconds(t0());
        s.note_authoritative(t0() + Duration::seconds(120));
        assert_eq!(s.next_sync_in_seconds(t0()), before);
    }

    proptest! {
        #[test]
        fn interval_is_monotone_in_minutes_to_cap(
            m1 in 0.0f64..2000.0,
            m2 in 0.0f64..2000.0,
        ) {
            let p = SyncPolicy::default();
            let (lo, hi) = if m1 <= m2 { (m1, m2) } else { (m2, m1) };
            let rate = producing(100.0);
            let fast = p.interval_for(&rate, &fill(50.0, Some(lo)));
            let slow = p.interval_for(&rate, &fill(50.0, Some(hi)));
            prop_assert!(fast <= slow);
            // Idle is never faster than any producing configuration.
            let idle = p.interval_for(&ResourceVector::zero(), &fill(50.0, None));
            prop_assert!(idle >= slow);
        }
    }
}
