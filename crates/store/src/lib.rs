//! Local persistence for the Landgrab document store: a checksummed,
//! compressed snapshot file written atomically, plus on-disk photo objects.
//!
//! The bridge plugin owns the snapshot cadence: load once at startup,
//! persist when the store has changed (every 5 minutes), and persist on the
//! way out after the engine's exit flush has written its final totals.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bevy::app::AppExit;
use bevy::prelude::*;

use engine::config::SNAPSHOT_INTERVAL_TICKS;
use engine::store::{MemoryStore, PhotoStoreHandle, StoreHandle};
use engine::{EngineSet, TickCounter};

pub mod atomic_write;
pub mod file_header;
pub mod photos;
pub mod snapshot;

/// Errors from snapshot persistence. All of them are logged and tolerated;
/// a failed save retries on the next cadence and a failed load starts the
/// session on a fresh store.
#[derive(Debug)]
pub enum SnapshotError {
    /// I/O error (permissions, disk full, unreadable file).
    Io(std::io::Error),
    /// Document serialization failed.
    Encode(String),
    /// File damaged: bad magic, checksum mismatch, or undecodable body.
    Corrupt(String),
    /// Snapshot written by a newer build than this one supports.
    VersionMismatch { expected_max: u32, found: u32 },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "I/O error: {e}"),
            SnapshotError::Encode(msg) => write!(f, "encoding error: {msg}"),
            SnapshotError::Corrupt(msg) => write!(f, "corrupt snapshot: {msg}"),
            SnapshotError::VersionMismatch {
                expected_max,
                found,
            } => write!(
                f,
                "snapshot is format v{found}, this build supports up to v{expected_max}"
            ),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

/// The snapshot writer's view of the store: the concrete memory store plus
/// the generation it last persisted, so clean ticks skip the disk entirely.
#[derive(Resource)]
pub struct SnapshotState {
    store: Arc<MemoryStore>,
    path: PathBuf,
    last_saved_generation: u64,
}

impl SnapshotState {
    pub fn new(store: Arc<MemoryStore>, path: PathBuf) -> Self {
        let last_saved_generation = store.generation();
        Self {
            store,
            path,
            last_saved_generation,
        }
    }
}

fn flush_if_dirty(state: &mut SnapshotState) {
    let generation = state.store.generation();
    if generation == state.last_saved_generation {
        return;
    }
    match snapshot::save_snapshot(&state.store, &state.path) {
        Ok(()) => {
            state.last_saved_generation = generation;
            debug!("store snapshot written ({})", state.path.display());
        }
        Err(e) => warn!("store snapshot failed, will retry: {e}"),
    }
}

pub fn periodic_snapshot_system(tick: Res<TickCounter>, mut state: ResMut<SnapshotState>) {
    if !tick.0.is_multiple_of(SNAPSHOT_INTERVAL_TICKS) {
        return;
    }
    flush_if_dirty(&mut state);
}

pub fn exit_snapshot_system(mut exit: EventReader<AppExit>, mut state: ResMut<SnapshotState>) {
    if exit.is_empty() {
        return;
    }
    exit.clear();
    flush_if_dirty(&mut state);
}

/// Backs the engine's store handles with a snapshot-persisted local store.
/// Insert before `EnginePlugin` so the engine picks these handles up.
pub struct StorePlugin {
    pub data_dir: PathBuf,
}

impl Default for StorePlugin {
    fn default() -> Self {
        let data_dir = std::env::var("LANDGRAB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("landgrab_data"));
        Self { data_dir }
    }
}

impl Plugin for StorePlugin {
    fn build(&self, app: &mut App) {
        let store = Arc::new(MemoryStore::new());
        let path = self.data_dir.join("store.lgrb");

        match snapshot::load_snapshot(&path) {
            Ok(Some(dump)) => {
                store.import(dump);
                info!("store snapshot loaded from {}", path.display());
            }
            Ok(None) => info!("no store snapshot at {}, starting fresh", path.display()),
            Err(e) => warn!("store snapshot unreadable, starting fresh: {e}"),
        }

        app.insert_resource(StoreHandle(store.clone()));
        app.insert_resource(PhotoStoreHandle(Arc::new(photos::FilePhotoStore::new(
            self.data_dir.join("photos"),
        ))));
        app.insert_resource(SnapshotState::new(store, path));

        app.add_systems(
            FixedUpdate,
            periodic_snapshot_system
                .in_set(EngineSet::PostSim)
                .after(engine::accrual::earnings_flush_system),
        );
        app.add_systems(Last, exit_snapshot_system.after(engine::session::exit_flush));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use engine::boost::BoostState;
    use engine::store::{OwnerAccountDoc, PropertyStore};
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("/tmp/landgrab_bridge_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn account(owner: &str) -> OwnerAccountDoc {
        OwnerAccountDoc {
            owner_id: owner.into(),
            tb_balance: 100,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: chrono::Utc
                .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
                .unwrap(),
            boost: BoostState::default(),
        }
    }

    #[test]
    fn test_clean_store_skips_disk() {
        let dir = test_dir("clean_skip");
        let path = dir.join("store.lgrb");
        let store = Arc::new(MemoryStore::new());
        let mut state = SnapshotState::new(store, path.clone());

        flush_if_dirty(&mut state);
        assert!(!path.exists(), "clean store must not write a snapshot");
    }

    #[test]
    fn test_dirty_store_persists_then_settles() {
        let dir = test_dir("dirty_persist");
        let path = dir.join("store.lgrb");
        let store = Arc::new(MemoryStore::new());
        let mut state = SnapshotState::new(store.clone(), path.clone());

        store.put_owner_account(&account("alice")).unwrap();
        flush_if_dirty(&mut state);
        assert!(path.exists());

        // No further mutation: the file's mtime-equivalent (its bytes)
        // must not be rewritten. Delete it and confirm no rewrite happens.
        fs::remove_file(&path).unwrap();
        flush_if_dirty(&mut state);
        assert!(!path.exists());
    }

    #[test]
    fn test_snapshot_survives_session_boundary() {
        let dir = test_dir("session_boundary");
        let path = dir.join("store.lgrb");
        let store = Arc::new(MemoryStore::new());
        let mut state = SnapshotState::new(store.clone(), path.clone());
        store.put_owner_account(&account("alice")).unwrap();
        flush_if_dirty(&mut state);

        // Next session: fresh store hydrated from the snapshot.
        let next = MemoryStore::new();
        next.import(snapshot::load_snapshot(&path).unwrap().unwrap());
        assert_eq!(
            next.get_owner_account("alice").unwrap().unwrap().tb_balance,
            100
        );
    }
}
