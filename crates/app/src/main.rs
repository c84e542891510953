use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

mod sim_walk;

fn main() {
    let mut app = App::new();

    // Headless: the fixed 10 Hz engine tick is driven by a plain runner loop.
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(100))),
        LogPlugin::default(),
    ));

    if let Ok(owner_id) = std::env::var("LANDGRAB_USER") {
        app.insert_resource(engine::session::SessionUser { owner_id });
    }

    // Store first so the engine picks up the persisted handles.
    app.add_plugins((
        store::StorePlugin::default(),
        engine::EnginePlugin,
        sim_walk::SimWalkPlugin,
    ));

    app.run();
}
