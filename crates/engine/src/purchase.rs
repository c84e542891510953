//! Claiming a cell: eligibility by proximity, payment in TB, category drawn
//! at purchase time, ownership settled by the store's create-if-absent.

use std::fmt;

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::accrual::flush_earnings;
use crate::boost::BoostState;
use crate::cells::{Cell, CellCategory, OwnedCells};
use crate::clock::SessionClock;
use crate::config::CELL_PRICE_TB;
use crate::display::DisplayEarnings;
use crate::grid::{point_to_cell, LatLon};
use crate::location::CurrentPosition;
use crate::proximity::is_adjacent_or_inside;
use crate::session::SessionUser;
use crate::store::{PropertyStore, StoreError, StoreHandle};
use crate::wallet::OwnerAccount;
use crate::EngineSet;

/// Presentation layer asks to buy the cell under the tapped point.
#[derive(Event, Debug, Clone, Copy)]
pub struct PurchaseRequest {
    pub lat: f64,
    pub lon: f64,
}

/// Outcome of a purchase request, for user-facing messaging.
#[derive(Event, Debug, Clone)]
pub struct PurchaseCompleted {
    pub result: Result<Cell, PurchaseError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// Tapped coordinates were not a valid grid point.
    OffGrid,
    /// The device position is not inside or adjacent to the target cell.
    TooFar,
    AlreadyOwned,
    InsufficientBalance,
    /// Store unreachable; nothing was charged.
    Unavailable(String),
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseError::OffGrid => write!(f, "not a valid map location"),
            PurchaseError::TooFar => write!(f, "too far away to claim this cell"),
            PurchaseError::AlreadyOwned => write!(f, "cell is already owned"),
            PurchaseError::InsufficientBalance => write!(f, "not enough TB"),
            PurchaseError::Unavailable(msg) => write!(f, "purchase failed: {msg}"),
        }
    }
}

impl std::error::Error for PurchaseError {}

impl From<StoreError> for PurchaseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists => PurchaseError::AlreadyOwned,
            StoreError::InsufficientBalance => PurchaseError::InsufficientBalance,
            StoreError::NotFound => PurchaseError::Unavailable("account missing".into()),
            StoreError::Unavailable(msg) => PurchaseError::Unavailable(msg),
        }
    }
}

/// The purchase operation. Debits first, then creates the cell document; if
/// the create loses the first-writer race the debit is refunded, so a lost
/// race never costs TB.
pub fn purchase_cell(
    store: &dyn PropertyStore,
    owner_id: &str,
    position: Option<LatLon>,
    lat: f64,
    lon: f64,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<Cell, PurchaseError> {
    let cell_id = point_to_cell(lat, lon).map_err(|_| PurchaseError::OffGrid)?;
    let here = position.ok_or(PurchaseError::TooFar)?;
    if !is_adjacent_or_inside(here.lat, here.lon, cell_id) {
        return Err(PurchaseError::TooFar);
    }
    if store.get_cell(cell_id)?.is_some() {
        return Err(PurchaseError::AlreadyOwned);
    }

    store.adjust_balance(owner_id, -CELL_PRICE_TB)?;

    let cell = Cell {
        id: cell_id,
        category: CellCategory::draw(rng),
        owner_id: owner_id.to_string(),
        acquired_at: now,
    };
    if let Err(e) = store.create_cell(&cell) {
        // Lost the race (or the store died): hand the TB back.
        if let Err(refund_err) = store.adjust_balance(owner_id, CELL_PRICE_TB) {
            warn!("refund after failed purchase also failed: {refund_err}");
        }
        return Err(e.into());
    }
    Ok(cell)
}

/// Drains purchase requests. A successful claim flushes earnings first so
/// the new cell's rate starts a clean accrual interval, then updates the
/// session mirrors and re-anchors the live display.
#[allow(clippy::too_many_arguments)]
pub fn handle_purchase_requests(
    mut requests: EventReader<PurchaseRequest>,
    mut completed: EventWriter<PurchaseCompleted>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    position: Res<CurrentPosition>,
    clock: Res<SessionClock>,
    boost: Res<BoostState>,
    mut account: ResMut<OwnerAccount>,
    mut owned: ResMut<OwnedCells>,
    mut display: ResMut<DisplayEarnings>,
) {
    for request in requests.read() {
        let now = clock.now;
        let rate_before = owned.total_rate_per_sec();
        if let Err(e) = flush_earnings(
            store.0.as_ref(),
            &user.owner_id,
            &mut account,
            rate_before,
            &boost,
            now,
        ) {
            warn!("pre-purchase earnings flush failed: {e}");
        }

        let result = purchase_cell(
            store.0.as_ref(),
            &user.owner_id,
            position.0,
            request.lat,
            request.lon,
            now,
            &mut rand::thread_rng(),
        );
        if let Ok(cell) = &result {
            account.tb_balance -= CELL_PRICE_TB;
            owned.cells.push(cell.clone());
            display.re_anchor(
                account.lifetime_earnings,
                owned.total_rate_per_sec() * boost.multiplier(now),
                now,
            );
            info!(
                "claimed cell {} ({}) for {} TB, balance {} TB",
                cell.id,
                cell.category.label(),
                CELL_PRICE_TB,
                account.tb_balance
            );
        }
        completed.send(PurchaseCompleted { result });
    }
}

pub struct PurchasePlugin;

impl Plugin for PurchasePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<PurchaseRequest>()
            .add_event::<PurchaseCompleted>()
            .add_systems(
                FixedUpdate,
                handle_purchase_requests.in_set(EngineSet::Sim),
            );
    }
}
