//! The persistent-store collaborator, reduced to the interface the engine
//! consumes. Documents use last-write-wins semantics; `create_cell` and
//! `record_check_in` are the two compare-and-set exceptions (first writer
//! wins, duplicates rejected) so concurrent purchases and same-day check-ins
//! cannot race past the rules.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::boost::BoostState;
use crate::cells::Cell;
use crate::grid::CellId;

/// Store operation failures. Business rules surface as typed variants; an
/// unreachable backend is `Unavailable` and is always safe to retry later
/// because earnings flushes write absolute totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced account document does not exist.
    NotFound,
    /// A create-if-absent write lost the race or repeated a day key.
    AlreadyExists,
    /// A balance adjustment would take the account below zero.
    InsufficientBalance,
    /// Backend unreachable or rejected the write.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "document not found"),
            StoreError::AlreadyExists => write!(f, "document already exists"),
            StoreError::InsufficientBalance => write!(f, "balance would go negative"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Owner account document as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerAccountDoc {
    pub owner_id: String,
    pub tb_balance: i64,
    pub lifetime_earnings: f64,
    pub last_earnings_snapshot: DateTime<Utc>,
    pub boost: BoostState,
}

/// One recorded check-in. `day_key` is the reference-timezone calendar date
/// and forms the uniqueness key together with visitor and cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub visitor_id: String,
    pub cell_key: String,
    pub owner_id: String,
    pub message: Option<String>,
    pub photo_ref: Option<String>,
    pub day_key: String,
    pub created_at: DateTime<Utc>,
}

/// The engine-facing store interface. Implementations must be safe to share
/// across systems; all methods are synchronous.
pub trait PropertyStore: Send + Sync {
    fn get_owner_account(&self, owner_id: &str) -> Result<Option<OwnerAccountDoc>, StoreError>;

    /// Create or replace the whole account document.
    fn put_owner_account(&self, doc: &OwnerAccountDoc) -> Result<(), StoreError>;

    /// Write the absolute earnings total and move the snapshot timestamp.
    /// Absolute, not a delta, so a retried flush cannot double-count.
    fn set_owner_earnings(
        &self,
        owner_id: &str,
        new_total: f64,
        snapshot: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Atomically add `delta` TB (may be negative) and return the new
    /// balance. Fails rather than going below zero.
    fn adjust_balance(&self, owner_id: &str, delta: i64) -> Result<i64, StoreError>;

    fn set_boost_state(&self, owner_id: &str, state: &BoostState) -> Result<(), StoreError>;

    fn get_owned_cells(&self, owner_id: &str) -> Result<Vec<Cell>, StoreError>;

    fn get_cell(&self, id: CellId) -> Result<Option<Cell>, StoreError>;

    /// Create-if-absent. `AlreadyExists` means another purchase won.
    fn create_cell(&self, cell: &Cell) -> Result<(), StoreError>;

    /// Append a check-in. Enforces at most one record per
    /// (visitor, cell, day_key); duplicates fail with `AlreadyExists`.
    fn record_check_in(&self, record: &CheckInRecord) -> Result<(), StoreError>;
}

/// Photo storage collaborator: bytes in, opaque object reference out.
pub trait PhotoStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<String, StoreError>;
}

/// Shared handle the engine systems read the store through.
#[derive(Resource, Clone)]
pub struct StoreHandle(pub Arc<dyn PropertyStore>);

impl Default for StoreHandle {
    fn default() -> Self {
        Self(Arc::new(MemoryStore::new()))
    }
}

/// Shared handle for photo uploads.
#[derive(Resource, Clone)]
pub struct PhotoStoreHandle(pub Arc<dyn PhotoStore>);

impl Default for PhotoStoreHandle {
    fn default() -> Self {
        Self(Arc::new(MemoryPhotoStore::default()))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Full dump of the store's documents, the unit of snapshot persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDump {
    pub accounts: Vec<OwnerAccountDoc>,
    pub cells: Vec<Cell>,
    pub check_ins: Vec<CheckInRecord>,
}

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<String, OwnerAccountDoc>,
    cells: HashMap<String, Cell>,
    check_ins: Vec<CheckInRecord>,
    check_in_keys: HashSet<(String, String, String)>,
    /// Bumped on every mutation; snapshot writers compare generations to
    /// skip clean saves.
    generation: u64,
}

/// Reference store implementation backing tests and the local session. A
/// deployment would put the same interface in front of its hosted document
/// database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A poisoned lock just means a panic mid-write somewhere else;
        // the data is still the best copy we have.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn export(&self) -> StoreDump {
        let inner = self.lock();
        let mut accounts: Vec<_> = inner.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        let mut cells: Vec<_> = inner.cells.values().cloned().collect();
        cells.sort_by_key(|c| (c.id.x, c.id.y));
        StoreDump {
            accounts,
            cells,
            check_ins: inner.check_ins.clone(),
        }
    }

    pub fn import(&self, dump: StoreDump) {
        let mut inner = self.lock();
        inner.accounts = dump
            .accounts
            .into_iter()
            .map(|a| (a.owner_id.clone(), a))
            .collect();
        inner.cells = dump.cells.into_iter().map(|c| (c.id.key(), c)).collect();
        inner.check_in_keys = dump
            .check_ins
            .iter()
            .map(|r| {
                (
                    r.visitor_id.clone(),
                    r.cell_key.clone(),
                    r.day_key.clone(),
                )
            })
            .collect();
        inner.check_ins = dump.check_ins;
    }
}

impl PropertyStore for MemoryStore {
    fn get_owner_account(&self, owner_id: &str) -> Result<Option<OwnerAccountDoc>, StoreError> {
        Ok(self.lock().accounts.get(owner_id).cloned())
    }

    fn put_owner_account(&self, doc: &OwnerAccountDoc) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.accounts.insert(doc.owner_id.clone(), doc.clone());
        inner.generation += 1;
        Ok(())
    }

    fn set_owner_earnings(
        &self,
        owner_id: &str,
        new_total: f64,
        snapshot: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let account = inner.accounts.get_mut(owner_id).ok_or(StoreError::NotFound)?;
        account.lifetime_earnings = new_total;
        account.last_earnings_snapshot = snapshot;
        inner.generation += 1;
        Ok(())
    }

    fn adjust_balance(&self, owner_id: &str, delta: i64) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let account = inner.accounts.get_mut(owner_id).ok_or(StoreError::NotFound)?;
        let new_balance = account.tb_balance + delta;
        if new_balance < 0 {
            return Err(StoreError::InsufficientBalance);
        }
        account.tb_balance = new_balance;
        inner.generation += 1;
        Ok(new_balance)
    }

    fn set_boost_state(&self, owner_id: &str, state: &BoostState) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let account = inner.accounts.get_mut(owner_id).ok_or(StoreError::NotFound)?;
        account.boost = state.clone();
        inner.generation += 1;
        Ok(())
    }

    fn get_owned_cells(&self, owner_id: &str) -> Result<Vec<Cell>, StoreError> {
        let inner = self.lock();
        let mut cells: Vec<_> = inner
            .cells
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        cells.sort_by_key(|c| (c.id.x, c.id.y));
        Ok(cells)
    }

    fn get_cell(&self, id: CellId) -> Result<Option<Cell>, StoreError> {
        Ok(self.lock().cells.get(&id.key()).cloned())
    }

    fn create_cell(&self, cell: &Cell) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = cell.id.key();
        if inner.cells.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        inner.cells.insert(key, cell.clone());
        inner.generation += 1;
        Ok(())
    }

    fn record_check_in(&self, record: &CheckInRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let key = (
            record.visitor_id.clone(),
            record.cell_key.clone(),
            record.day_key.clone(),
        );
        if inner.check_in_keys.contains(&key) {
            return Err(StoreError::AlreadyExists);
        }
        inner.check_in_keys.insert(key);
        inner.check_ins.push(record.clone());
        inner.generation += 1;
        Ok(())
    }
}

/// Test-double photo store: remembers bytes, hands back sequential refs.
#[derive(Default)]
pub struct MemoryPhotoStore {
    photos: Mutex<Vec<Vec<u8>>>,
}

impl PhotoStore for MemoryPhotoStore {
    fn put(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let mut photos = self.photos.lock().unwrap_or_else(|e| e.into_inner());
        photos.push(bytes.to_vec());
        Ok(format!("mem://photo/{}", photos.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CellCategory;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn account(owner: &str) -> OwnerAccountDoc {
        OwnerAccountDoc {
            owner_id: owner.to_string(),
            tb_balance: 100,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: t0(),
            boost: BoostState::default(),
        }
    }

    fn cell(x: i64, y: i64, owner: &str) -> Cell {
        Cell {
            id: CellId::new(x, y),
            category: CellCategory::Rock,
            owner_id: owner.to_string(),
            acquired_at: t0(),
        }
    }

    #[test]
    fn test_account_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_owner_account("alice").unwrap(), None);
        store.put_owner_account(&account("alice")).unwrap();
        let loaded = store.get_owner_account("alice").unwrap().unwrap();
        assert_eq!(loaded.tb_balance, 100);
    }

    #[test]
    fn test_adjust_balance_floor_at_zero() {
        let store = MemoryStore::new();
        store.put_owner_account(&account("alice")).unwrap();
        assert_eq!(store.adjust_balance("alice", -40).unwrap(), 60);
        assert_eq!(
            store.adjust_balance("alice", -100),
            Err(StoreError::InsufficientBalance)
        );
        // Failed adjustment leaves the balance alone.
        assert_eq!(
            store.get_owner_account("alice").unwrap().unwrap().tb_balance,
            60
        );
        assert_eq!(
            store.adjust_balance("nobody", 1),
            Err(StoreError::NotFound)
        );
    }

    #[test]
    fn test_create_cell_first_writer_wins() {
        let store = MemoryStore::new();
        store.create_cell(&cell(1, 2, "alice")).unwrap();
        assert_eq!(
            store.create_cell(&cell(1, 2, "bob")),
            Err(StoreError::AlreadyExists)
        );
        let stored = store.get_cell(CellId::new(1, 2)).unwrap().unwrap();
        assert_eq!(stored.owner_id, "alice");
    }

    #[test]
    fn test_owned_cells_filtered_by_owner() {
        let store = MemoryStore::new();
        store.create_cell(&cell(1, 1, "alice")).unwrap();
        store.create_cell(&cell(2, 2, "bob")).unwrap();
        store.create_cell(&cell(3, 3, "alice")).unwrap();
        let owned = store.get_owned_cells("alice").unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|c| c.owner_id == "alice"));
    }

    #[test]
    fn test_check_in_day_key_uniqueness() {
        let store = MemoryStore::new();
        let record = CheckInRecord {
            visitor_id: "bob".into(),
            cell_key: "1_2".into(),
            owner_id: "alice".into(),
            message: None,
            photo_ref: None,
            day_key: "2024-06-01".into(),
            created_at: t0(),
        };
        store.record_check_in(&record).unwrap();
        assert_eq!(
            store.record_check_in(&record),
            Err(StoreError::AlreadyExists)
        );
        // Next day is a fresh key.
        let next_day = CheckInRecord {
            day_key: "2024-06-02".into(),
            ..record
        };
        store.record_check_in(&next_day).unwrap();
    }

    #[test]
    fn test_export_import_roundtrip() {
        let store = MemoryStore::new();
        store.put_owner_account(&account("alice")).unwrap();
        store.create_cell(&cell(1, 1, "alice")).unwrap();
        let dump = store.export();

        let restored = MemoryStore::new();
        restored.import(dump);
        assert_eq!(
            restored.get_owner_account("alice").unwrap().unwrap().owner_id,
            "alice"
        );
        assert_eq!(restored.get_owned_cells("alice").unwrap().len(), 1);
        // Imported check-in keys keep enforcing uniqueness.
        let record = CheckInRecord {
            visitor_id: "bob".into(),
            cell_key: "1_1".into(),
            owner_id: "alice".into(),
            message: None,
            photo_ref: None,
            day_key: "2024-06-01".into(),
            created_at: t0(),
        };
        restored.record_check_in(&record).unwrap();
        let dump2 = restored.export();
        let again = MemoryStore::new();
        again.import(dump2);
        assert_eq!(
            again.record_check_in(&record),
            Err(StoreError::AlreadyExists)
        );
    }

    #[test]
    fn test_documents_serialize_as_json_scalars() {
        // Store documents are plain string/number/ISO-8601/boolean fields.
        let json = serde_json::to_value(account("alice")).unwrap();
        assert!(json["last_earnings_snapshot"].is_string());
        assert!(json["last_earnings_snapshot"]
            .as_str()
            .unwrap()
            .starts_with("2024-06-01T12:00:00"));
        assert!(json["tb_balance"].is_i64());

        let cell_json = serde_json::to_value(cell(1, 2, "alice")).unwrap();
        assert_eq!(cell_json["category"], "rock");
        assert_eq!(cell_json["id"]["x"], 1);
    }

    #[test]
    fn test_generation_tracks_mutations() {
        let store = MemoryStore::new();
        let g0 = store.generation();
        store.put_owner_account(&account("alice")).unwrap();
        assert!(store.generation() > g0);
        let g1 = store.generation();
        let _ = store.get_owner_account("alice").unwrap();
        assert_eq!(store.generation(), g1);
    }
}
