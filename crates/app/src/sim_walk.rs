//! Simulated location provider and demo driver.
//!
//! Stands in for the device GPS: a seeded random walk around a home point,
//! emitting the same `PositionUpdate` events a real provider would. On top
//! of that it plays a minimal session: claims an affordable cell now and
//! then, asks for a free boost, and logs a status line every few seconds.

use bevy::app::AppExit;
use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use engine::boost::{BoostKind, BoostRequest, BoostState};
use engine::cells::OwnedCells;
use engine::clock::SessionClock;
use engine::config::{CELL_PRICE_TB, MAX_VISIBLE_RADIUS_M};
use engine::display::{format_earnings, DisplayEarnings};
use engine::grid::LatLon;
use engine::location::{visible_cells_around, CurrentPosition, PositionUpdate};
use engine::purchase::PurchaseRequest;
use engine::wallet::OwnerAccount;
use engine::{EngineSet, TickCounter};

// Boston Common, mid-latitude and walkable.
const HOME_LAT: f64 = 42.35541;
const HOME_LON: f64 = -71.06563;

/// Step per second of walking, in degrees (~6 m).
const STEP_DEG: f64 = 0.00006;

/// Cadences in fixed ticks.
const WALK_INTERVAL: u64 = 10; // 1 Hz position fixes
const PURCHASE_INTERVAL: u64 = 300; // consider a claim every 30 s
const BOOST_INTERVAL: u64 = 1200; // ask for a free boost every 2 min
const STATUS_INTERVAL: u64 = 100; // status line every 10 s

#[derive(Resource)]
pub struct Walker {
    rng: ChaCha8Rng,
    position: LatLon,
    /// Stop after this many fixed ticks; `None` runs until interrupted.
    max_ticks: Option<u64>,
}

impl Default for Walker {
    fn default() -> Self {
        let max_ticks = match std::env::var("LANDGRAB_TICKS") {
            Ok(v) => match v.parse::<u64>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => Some(600),
            },
            Err(_) => Some(600),
        };
        Self {
            rng: ChaCha8Rng::seed_from_u64(0xC0FFEE),
            position: LatLon::new(HOME_LAT, HOME_LON),
            max_ticks,
        }
    }
}

/// Random walk emitting position fixes at 1 Hz.
fn walk_system(
    tick: Res<TickCounter>,
    mut walker: ResMut<Walker>,
    mut updates: EventWriter<PositionUpdate>,
) {
    if !tick.0.is_multiple_of(WALK_INTERVAL) {
        return;
    }
    let dlat = walker.rng.gen_range(-STEP_DEG..=STEP_DEG);
    let dlon = walker.rng.gen_range(-STEP_DEG..=STEP_DEG);
    walker.position.lat += dlat;
    walker.position.lon += dlon;
    let position = walker.position;
    updates.send(PositionUpdate(position));
}

/// Occasionally claims the cell underfoot and tops up the boost.
fn demo_actions_system(
    tick: Res<TickCounter>,
    position: Res<CurrentPosition>,
    account: Res<OwnerAccount>,
    boost: Res<BoostState>,
    clock: Res<SessionClock>,
    mut purchases: EventWriter<PurchaseRequest>,
    mut boosts: EventWriter<BoostRequest>,
) {
    let Some(here) = position.0 else {
        return;
    };
    if tick.0.is_multiple_of(PURCHASE_INTERVAL) && account.tb_balance >= CELL_PRICE_TB {
        purchases.send(PurchaseRequest {
            lat: here.lat,
            lon: here.lon,
        });
    }
    if tick.0.is_multiple_of(BOOST_INTERVAL)
        && !boost.is_active(clock.now)
        && boost.free_grants_remaining > 0
    {
        boosts.send(BoostRequest {
            kind: BoostKind::Free,
        });
    }
}

/// Periodic status line, and the bounded-run exit.
fn status_system(
    tick: Res<TickCounter>,
    walker: Res<Walker>,
    position: Res<CurrentPosition>,
    account: Res<OwnerAccount>,
    owned: Res<OwnedCells>,
    boost: Res<BoostState>,
    display: Res<DisplayEarnings>,
    clock: Res<SessionClock>,
    mut exit: EventWriter<AppExit>,
) {
    if tick.0.is_multiple_of(STATUS_INTERVAL) {
        let visible = visible_cells_around(&position, MAX_VISIBLE_RADIUS_M).len();
        let earned = format_earnings(display.value);
        info!(
            "tick {}: {} cells owned, {} TB, earned {}, boost {}s, {} cells in view",
            tick.0,
            owned.cells.len(),
            account.tb_balance,
            earned,
            boost.remaining_secs(clock.now),
            visible
        );
    }
    if walker.max_ticks.is_some_and(|max| tick.0 >= max) {
        info!("demo run complete after {} ticks", tick.0);
        exit.send(AppExit::Success);
    }
}

pub struct SimWalkPlugin;

impl Plugin for SimWalkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Walker>()
            .add_systems(
                FixedUpdate,
                walk_system
                    .in_set(EngineSet::PreSim)
                    .before(engine::location::apply_position_updates),
            )
            .add_systems(FixedUpdate, demo_actions_system.in_set(EngineSet::Sim))
            .add_systems(FixedUpdate, status_system.in_set(EngineSet::PostSim));
    }
}
