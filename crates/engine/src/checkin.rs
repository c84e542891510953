//! Visiting someone else's cell: proximity-gated, once per reference-day,
//! rewarding both parties.
//!
//! The once-per-day rule is enforced twice. The session-local log gives the
//! UI an instant optimistic answer but resets on restart; the store's
//! (visitor, cell, day) uniqueness key is the authoritative check and is
//! what actually blocks a duplicate from a restarted session.

use std::collections::HashMap;
use std::fmt;

use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::clock::SessionClock;
use crate::config::{CHECKIN_OWNER_REWARD_TB, CHECKIN_VISITOR_REWARD_TB};
use crate::grid::{CellId, LatLon};
use crate::location::CurrentPosition;
use crate::proximity::{can_check_in_today, is_adjacent_or_inside, reference_day_key};
use crate::session::SessionUser;
use crate::store::{
    CheckInRecord, PhotoStore, PhotoStoreHandle, PropertyStore, StoreError, StoreHandle,
};
use crate::wallet::OwnerAccount;
use crate::EngineSet;

/// Presentation layer submits a visit to the given cell.
#[derive(Event, Debug, Clone)]
pub struct CheckInRequest {
    pub cell_id: CellId,
    pub message: Option<String>,
    pub photo: Option<Vec<u8>>,
}

#[derive(Event, Debug, Clone)]
pub struct CheckInCompleted {
    pub result: Result<CheckInReceipt, CheckInError>,
}

/// What the visitor gets back after a successful check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInReceipt {
    pub cell_id: CellId,
    pub owner_id: String,
    pub visitor_reward_tb: i64,
    pub owner_reward_tb: i64,
    pub photo_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInError {
    /// The cell has no owner; only owned cells can host check-ins.
    NotOwnedByOther,
    /// The visitor owns this cell themselves.
    SelfOwned,
    /// Not inside or adjacent to the cell.
    TooFar,
    AlreadyCheckedInToday,
    Unavailable(String),
}

impl fmt::Display for CheckInError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckInError::NotOwnedByOther => write!(f, "cell is not owned by another player"),
            CheckInError::SelfOwned => write!(f, "cannot check in on your own cell"),
            CheckInError::TooFar => write!(f, "too far away to check in"),
            CheckInError::AlreadyCheckedInToday => {
                write!(f, "already checked in here today")
            }
            CheckInError::Unavailable(msg) => write!(f, "check-in failed: {msg}"),
        }
    }
}

impl std::error::Error for CheckInError {}

impl From<StoreError> for CheckInError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists => CheckInError::AlreadyCheckedInToday,
            other => CheckInError::Unavailable(other.to_string()),
        }
    }
}

/// Session-local memory of the visitor's last check-in per cell. Optimistic
/// only: it starts empty every session, so the store key is the real guard
/// against restart-and-repeat.
#[derive(Resource, Debug, Default)]
pub struct CheckInLog {
    last_by_cell: HashMap<CellId, DateTime<Utc>>,
}

impl CheckInLog {
    pub fn last_for(&self, cell: CellId) -> Option<DateTime<Utc>> {
        self.last_by_cell.get(&cell).copied()
    }

    pub fn record(&mut self, cell: CellId, at: DateTime<Utc>) {
        self.last_by_cell.insert(cell, at);
    }
}

/// The check-in operation.
#[allow(clippy::too_many_arguments)]
pub fn check_in(
    store: &dyn PropertyStore,
    photos: &dyn PhotoStore,
    visitor_id: &str,
    position: Option<LatLon>,
    cell_id: CellId,
    message: Option<String>,
    photo: Option<Vec<u8>>,
    log: &mut CheckInLog,
    now: DateTime<Utc>,
) -> Result<CheckInReceipt, CheckInError> {
    let cell = store
        .get_cell(cell_id)?
        .ok_or(CheckInError::NotOwnedByOther)?;
    if cell.owner_id == visitor_id {
        return Err(CheckInError::SelfOwned);
    }
    let here = position.ok_or(CheckInError::TooFar)?;
    if !is_adjacent_or_inside(here.lat, here.lon, cell_id) {
        return Err(CheckInError::TooFar);
    }
    if !can_check_in_today(log.last_for(cell_id), now) {
        return Err(CheckInError::AlreadyCheckedInToday);
    }

    let photo_ref = match photo {
        Some(bytes) => Some(photos.put(&bytes)?),
        None => None,
    };

    store.record_check_in(&CheckInRecord {
        visitor_id: visitor_id.to_string(),
        cell_key: cell_id.key(),
        owner_id: cell.owner_id.clone(),
        message,
        photo_ref: photo_ref.clone(),
        day_key: reference_day_key(now),
        created_at: now,
    })?;
    log.record(cell_id, now);

    store.adjust_balance(visitor_id, CHECKIN_VISITOR_REWARD_TB)?;
    // A missing owner account is tolerated drift, not a failed check-in.
    let owner_reward = match store.adjust_balance(&cell.owner_id, CHECKIN_OWNER_REWARD_TB) {
        Ok(_) => CHECKIN_OWNER_REWARD_TB,
        Err(StoreError::NotFound) => 0,
        Err(e) => return Err(e.into()),
    };

    Ok(CheckInReceipt {
        cell_id,
        owner_id: cell.owner_id,
        visitor_reward_tb: CHECKIN_VISITOR_REWARD_TB,
        owner_reward_tb: owner_reward,
        photo_ref,
        created_at: now,
    })
}

pub fn handle_check_in_requests(
    mut requests: EventReader<CheckInRequest>,
    mut completed: EventWriter<CheckInCompleted>,
    store: Res<StoreHandle>,
    photos: Res<PhotoStoreHandle>,
    user: Res<SessionUser>,
    position: Res<CurrentPosition>,
    clock: Res<SessionClock>,
    mut log: ResMut<CheckInLog>,
    mut account: ResMut<OwnerAccount>,
) {
    for request in requests.read() {
        let result = check_in(
            store.0.as_ref(),
            photos.0.as_ref(),
            &user.owner_id,
            position.0,
            request.cell_id,
            request.message.clone(),
            request.photo.clone(),
            &mut log,
            clock.now,
        );
        if let Ok(receipt) = &result {
            account.credit(receipt.visitor_reward_tb);
            info!(
                "checked in at {} (owner {}): +{} TB",
                receipt.cell_id, receipt.owner_id, receipt.visitor_reward_tb
            );
        }
        completed.send(CheckInCompleted { result });
    }
}

pub struct CheckInPlugin;

impl Plugin for CheckInPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<CheckInRequest>()
            .add_event::<CheckInCompleted>()
            .init_resource::<CheckInLog>()
            .add_systems(
                FixedUpdate,
                handle_check_in_requests.in_set(EngineSet::Sim),
            );
    }
}
