//! Live earnings display: a cheap linear extrapolation between flushes plus
//! scale-adaptive formatting. Presentation only; nothing here is persisted.

use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::accrual::seconds_between;
use crate::clock::SessionClock;
use crate::EngineSet;

/// Anchor and output of the live earnings readout. Re-anchored on every
/// flush, purchase, and boost transition so the extrapolated rate matches
/// the effective rate.
#[derive(Resource, Debug, Clone)]
pub struct DisplayEarnings {
    pub base_amount: f64,
    pub rate_per_sec: f64,
    pub anchored_at: DateTime<Utc>,
    /// Latest extrapolated value, refreshed every display tick.
    pub value: f64,
}

impl Default for DisplayEarnings {
    fn default() -> Self {
        Self {
            base_amount: 0.0,
            rate_per_sec: 0.0,
            anchored_at: DateTime::<Utc>::UNIX_EPOCH,
            value: 0.0,
        }
    }
}

impl DisplayEarnings {
    pub fn re_anchor(&mut self, base_amount: f64, rate_per_sec: f64, now: DateTime<Utc>) {
        self.base_amount = base_amount;
        self.rate_per_sec = rate_per_sec;
        self.anchored_at = now;
        self.value = base_amount;
    }
}

/// Linear extrapolation from the last persisted amount. Clock skew before
/// the anchor extrapolates nothing rather than shrinking the readout.
pub fn projected_display(
    base_amount: f64,
    rate_per_sec: f64,
    anchored_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    base_amount + rate_per_sec * seconds_between(anchored_at, now).max(0.0)
}

/// Formats an earnings amount with more decimal places as the magnitude
/// shrinks, so early-game micro-amounts still visibly move.
pub fn format_earnings(value: f64) -> String {
    let decimals = if value >= 1.0 {
        2
    } else if value >= 1e-3 {
        6
    } else if value >= 1e-6 {
        9
    } else {
        12
    };
    format!("${value:.decimals$}")
}

/// Refreshes the readout once per fixed tick (100 ms).
pub fn display_tick_system(clock: Res<SessionClock>, mut display: ResMut<DisplayEarnings>) {
    display.value = projected_display(
        display.base_amount,
        display.rate_per_sec,
        display.anchored_at,
        clock.now,
    );
}

pub struct DisplayPlugin;

impl Plugin for DisplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DisplayEarnings>().add_systems(
            FixedUpdate,
            display_tick_system
                .in_set(EngineSet::PostSim)
                .after(crate::accrual::earnings_flush_system),
        );
    }
}
