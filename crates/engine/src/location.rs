use bevy::prelude::*;

use crate::config::MAX_VISIBLE_RADIUS_M;
use crate::grid::{visible_cell_ids, CellId, LatLon};
use crate::EngineSet;

/// A position fix from the device location collaborator. Real providers and
/// the simulated walker both feed the engine through this event.
#[derive(Event, Debug, Clone, Copy)]
pub struct PositionUpdate(pub LatLon);

/// Latest known position. `None` until the first fix arrives, or when the
/// provider reports itself unavailable.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CurrentPosition(pub Option<LatLon>);

pub fn apply_position_updates(
    mut updates: EventReader<PositionUpdate>,
    mut position: ResMut<CurrentPosition>,
) {
    for update in updates.read() {
        position.0 = Some(update.0);
    }
}

/// Cells the map should show around the current position. Input problems
/// (no fix yet, out-of-range coordinates) degrade to an empty list.
pub fn visible_cells_around(position: &CurrentPosition, radius_m: f64) -> Vec<CellId> {
    let Some(p) = position.0 else {
        return Vec::new();
    };
    match visible_cell_ids(p.lat, p.lon, radius_m.min(MAX_VISIBLE_RADIUS_M)) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("visibility query rejected: {e}");
            Vec::new()
        }
    }
}

pub struct LocationPlugin;

impl Plugin for LocationPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<PositionUpdate>()
            .init_resource::<CurrentPosition>()
            .add_systems(
                FixedUpdate,
                apply_position_updates.in_set(EngineSet::PreSim),
            );
    }
}
