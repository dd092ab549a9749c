#![deny(warnings)]

//! Headless demo: drives a village session against an in-memory backend.
//!
//! Runs the display clock for a bounded number of ticks, letting the
//! adaptive scheduler decide when to re-fetch the authoritative snapshot,
//! and prints the live figures a UI would render.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use village_core::{
    aggregate_rates, validate_snapshot, CostVector, ProductionSource, ResourceKind,
    ResourceSnapshot, ResourceVector,
};
use village_econ::{can_afford, hms, SECONDS_PER_HOUR};
use village_runtime::{
    ActionId, BackendError, GameClock, SyncPolicy, VillageBackend, VillageSession,
};

fn parse_args() -> (Option<u64>, Option<u64>) {
    let mut ticks: Option<u64> = None;
    let mut period_ms: Option<u64> = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--ticks" => ticks = it.next().and_then(|s| s.parse().ok()),
            "--period-ms" => period_ms = it.next().and_then(|s| s.parse().ok()),
            _ => {}
        }
    }
    (ticks, period_ms)
}

fn vector(plants: f64, bones: f64, meat: f64) -> ResourceVector {
    ResourceVector::zero()
        .with(ResourceKind::Plants, plants)
        .with(ResourceKind::Bones, bones)
        .with(ResourceKind::Meat, meat)
}

struct ServerState {
    quantities: ResourceVector,
    storage_cap: f64,
    storage_level: u32,
    buildings: Vec<ProductionSource>,
    last_update: DateTime<Utc>,
}

/// In-memory stand-in for the authoritative backend.
///
/// Plays the role of the server-side procedures: it accrues production
/// against its own clock, prices actions by level, and rejects anything the
/// player cannot actually pay for, so the client's advisory affordability
/// check can be wrong and get corrected.
struct DemoBackend {
    state: Mutex<ServerState>,
}

impl DemoBackend {
    fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                quantities: vector(100.0, 50.0, 80.0),
                storage_cap: 500.0,
                storage_level: 1,
                buildings: vec![
                    ProductionSource {
                        building: "gathering_grove".into(),
                        level: 3,
                        per_hour: vector(360.0, 0.0, 0.0),
                    },
                    ProductionSource {
                        building: "bone_pit".into(),
                        level: 1,
                        per_hour: vector(0.0, 45.0, 0.0),
                    },
                    ProductionSource {
                        building: "hunting_ground".into(),
                        level: 2,
                        per_hour: vector(0.0, 0.0, 60.0),
                    },
                ],
                last_update: Utc::now(),
            }),
        }
    }

    fn settle(state: &mut ServerState, now: DateTime<Utc>) {
        let elapsed = ((now - state.last_update).num_milliseconds() as f64 / 1000.0).max(0.0);
        let rate = aggregate_rates(&state.buildings);
        state.quantities = state
            .quantities
            .map(|k, q| (q + rate.get(k) / SECONDS_PER_HOUR * elapsed).min(state.storage_cap));
        state.last_update = now;
    }

    fn action_cost(state: &ServerState, action: &ActionId) -> CostVector {
        match action {
            ActionId::Collect => CostVector::zero(),
            ActionId::UpgradeStorage => {
                let scale = 1.6f64.powi(state.storage_level as i32 - 1);
                vector(110.0, 55.0, 85.0).map(|_, c| c * scale)
            }
            ActionId::UpgradeBuilding { building } => {
                let level = state
                    .buildings
                    .iter()
                    .find(|b| &b.building == building)
                    .map(|b| b.level)
                    .unwrap_or(1);
                vector(90.0, 40.0, 30.0).map(|_, c| c * level as f64)
            }
            ActionId::TrainUnit { .. } => vector(30.0, 45.0, 60.0),
        }
    }

    fn snapshot(state: &ServerState, now: DateTime<Utc>) -> ResourceSnapshot {
        ResourceSnapshot {
            quantities: state.quantities,
            storage_cap: state.storage_cap,
            taken_at: Some(now),
        }
    }
}

impl VillageBackend for DemoBackend {
    async fn fetch_snapshot(&self) -> Result<ResourceSnapshot, BackendError> {
        let now = Utc::now();
        let mut st = self.state.lock().unwrap();
        Self::settle(&mut st, now);
        Ok(Self::snapshot(&st, now))
    }

    async fn fetch_rate_sources(&self) -> Result<Vec<ProductionSource>, BackendError> {
        Ok(self.state.lock().unwrap().buildings.clone())
    }

    async fn fetch_cost(&self, action: &ActionId) -> Result<CostVector, BackendError> {
        Ok(Self::action_cost(&self.state.lock().unwrap(), action))
    }

    async fn perform_action(&self, action: &ActionId) -> Result<ResourceSnapshot, BackendError> {
        let now = Utc::now();
        let mut st = self.state.lock().unwrap();
        Self::settle(&mut st, now);
        let cost = Self::action_cost(&st, action);
        if !can_afford(&st.quantities, &cost) {
            return Err(BackendError::Rejected(format!(
                "insufficient resources for {action:?}"
            )));
        }
        st.quantities = st.quantities.map(|k, q| q - cost.get(k));
        match action {
            ActionId::Collect | ActionId::TrainUnit { .. } => {}
            ActionId::UpgradeStorage => {
                st.storage_cap += 250.0;
                st.storage_level += 1;
            }
            ActionId::UpgradeBuilding { building } => {
                match st.buildings.iter_mut().find(|b| &b.building == building) {
                    Some(b) => {
                        b.level += 1;
                        b.per_hour = b.per_hour.map(|_, r| r * 1.25);
                    }
                    None => {
                        return Err(BackendError::Rejected(format!(
                            "unknown building {building}"
                        )))
                    }
                }
            }
        }
        Ok(Self::snapshot(&st, now))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let (ticks, period_ms) = parse_args();
    let ticks = ticks.unwrap_or(10);
    let period = period_ms
        .map(Duration::from_millis)
        .unwrap_or(GameClock::DISPLAY_PERIOD);
    info!(ticks, period_ms = period.as_millis() as u64, "starting village demo");

    let session = VillageSession::new(DemoBackend::new(), SyncPolicy::default());
    let first = session.force_sync(Utc::now()).await?;
    validate_snapshot(&first)?;
    info!(cap = first.storage_cap, "initial snapshot applied");

    let storage_cost = session.fetch_cost(&ActionId::UpgradeStorage).await?;
    let mut upgraded = false;

    let mut clock = GameClock::new(period);
    let mut tick_rx = clock.subscribe();
    clock.start();

    for _ in 0..ticks {
        tick_rx.changed().await?;
        let now = Utc::now();
        session.auto_sync_if_due(now).await;

        let view = session.view(now);
        let cells: Vec<String> = view
            .live
            .iter()
            .map(|(kind, q)| format!("{kind} {q:>6.1}"))
            .collect();
        let upgrade_eta = match session.eta_seconds(&storage_cost, now) {
            Some(secs) => hms(secs),
            None => "never".to_string(),
        };
        println!(
            "Live | {} | cap {:>5.0} | fullest {:>5.1}% | storage upgrade in {} | next sync {}",
            cells.join(" | "),
            view.storage_cap,
            view.fullest_pct,
            upgrade_eta,
            hms(view.next_sync_in_seconds as f64),
        );

        if !upgraded && session.can_afford(&storage_cost, now) {
            match session.perform_action(&ActionId::UpgradeStorage, now).await {
                Ok(snap) => {
                    info!(cap = snap.storage_cap, "storage upgraded");
                    upgraded = true;
                }
                Err(err) => warn!(error = %err, "storage upgrade refused"),
            }
        }
    }

    // Collecting is free and always demonstrates the action path.
    let collected = session.perform_action(&ActionId::Collect, Utc::now()).await?;

    clock.stop();
    session.close();

    println!(
        "Session done | ticks: {} | cap: {:.0} | upgraded: {} | last error: {}",
        ticks,
        collected.storage_cap,
        upgraded,
        session.last_error().unwrap_or_else(|| "none".into()),
    );

    Ok(())
}
