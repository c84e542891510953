//! Core engine for the Landgrab virtual-property game: deterministic grid
//! addressing over real-world coordinates, continuous passive-income accrual
//! with offline catch-up, and the time-boxed boost multiplier.
//!
//! State lives in resources, every operation is a pure function of
//! (state, now, inputs), and thin systems drive those operations on a 10 Hz
//! fixed tick. Presentation layers talk to the engine through request/
//! completed event pairs and never mutate engine state directly.

use bevy::prelude::*;

pub mod accrual;
pub mod boost;
pub mod cells;
pub mod checkin;
pub mod clock;
pub mod config;
pub mod display;
pub mod grid;
pub mod location;
pub mod proximity;
pub mod purchase;
pub mod session;
pub mod store;
pub mod wallet;


// ---------------------------------------------------------------------------
// Tick phases
// ---------------------------------------------------------------------------

/// Ordered phases for systems running in `FixedUpdate`, configured as a
/// chain: `PreSim` -> `Sim` -> `PostSim`.
///
/// * **PreSim**: tick counter, session clock, position intake. Sets up the
///   instant and inputs the rest of the tick reads.
/// * **Sim**: operations that mutate session state: boost countdown and
///   grants, purchases, check-ins.
/// * **PostSim**: aggregation that only reads simulation state: the
///   periodic earnings flush and the live display refresh.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineSet {
    PreSim,
    Sim,
    PostSim,
}

/// Global tick counter incremented each `FixedUpdate`; all periodic engine
/// systems derive their cadence from it.
#[derive(Resource, Default)]
pub struct TickCounter(pub u64);

pub fn tick_counter_system(mut tick: ResMut<TickCounter>) {
    tick.0 = tick.0.wrapping_add(1);
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Wires the whole engine into an `App`. A `StoreHandle` (and
/// `PhotoStoreHandle`) inserted before this plugin is respected; otherwise
/// the in-memory store backs the session.
pub struct EnginePlugin;

impl Plugin for EnginePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Time::<Fixed>::from_hz(config::FIXED_TICK_HZ));

        if !app.world().contains_resource::<store::StoreHandle>() {
            app.init_resource::<store::StoreHandle>();
        }
        if !app.world().contains_resource::<store::PhotoStoreHandle>() {
            app.init_resource::<store::PhotoStoreHandle>();
        }

        app.configure_sets(
            FixedUpdate,
            (EngineSet::PreSim, EngineSet::Sim, EngineSet::PostSim).chain(),
        );

        app.init_resource::<TickCounter>()
            .add_systems(FixedUpdate, tick_counter_system.in_set(EngineSet::PreSim));

        app.add_plugins((
            clock::ClockPlugin,
            location::LocationPlugin,
            session::SessionPlugin,
            boost::BoostPlugin,
            purchase::PurchasePlugin,
            checkin::CheckInPlugin,
            accrual::AccrualPlugin,
            display::DisplayPlugin,
        ));
    }
}
