use bevy::prelude::*;
use chrono::{DateTime, Duration, Utc};

use crate::EngineSet;

/// The engine's notion of "now".
///
/// Anchored to the wall clock once at startup and advanced from tick deltas
/// afterwards, so every system in a tick sees the same instant and tests can
/// pin it wherever they like. Engine logic never reads the wall clock
/// directly.
#[derive(Resource, Debug, Clone)]
pub struct SessionClock {
    pub now: DateTime<Utc>,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self { now: Utc::now() }
    }
}

impl SessionClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn advance_secs(&mut self, delta_secs: f64) {
        self.now += Duration::nanoseconds((delta_secs * 1e9) as i64);
    }
}

pub fn tick_session_clock(time: Res<Time>, mut clock: ResMut<SessionClock>) {
    clock.advance_secs(time.delta_secs_f64());
}

pub struct ClockPlugin;

impl Plugin for ClockPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SessionClock>()
            .add_systems(FixedUpdate, tick_session_clock.in_set(EngineSet::PreSim));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_advance_accumulates() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut clock = SessionClock::at(start);
        for _ in 0..10 {
            clock.advance_secs(0.1);
        }
        let elapsed = (clock.now - start).num_milliseconds();
        assert!((999..=1001).contains(&elapsed), "elapsed {elapsed} ms");
    }
}
