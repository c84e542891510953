//! Session lifecycle: restore persisted state at startup (with offline
//! catch-up), and flush everything on the way out.

use bevy::app::AppExit;
use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::accrual::{accrued_since, flush_earnings};
use crate::boost::BoostState;
use crate::cells::OwnedCells;
use crate::clock::SessionClock;
use crate::display::DisplayEarnings;
use crate::store::{OwnerAccountDoc, StoreHandle};
use crate::wallet::OwnerAccount;

/// Identity of the signed-in owner this session acts for. Supplied by the
/// authentication collaborator; the engine only carries it.
#[derive(Resource, Debug, Clone)]
pub struct SessionUser {
    pub owner_id: String,
}

impl Default for SessionUser {
    fn default() -> Self {
        Self {
            owner_id: "local-owner".to_string(),
        }
    }
}

fn fresh_account_doc(owner_id: &str, now: DateTime<Utc>) -> OwnerAccountDoc {
    OwnerAccountDoc {
        owner_id: owner_id.to_string(),
        tb_balance: crate::config::STARTING_BALANCE_TB,
        lifetime_earnings: 0.0,
        last_earnings_snapshot: now,
        boost: BoostState::default(),
    }
}

/// Startup restore. Loads (or creates) the account, mirrors the holdings,
/// applies the offline catch-up, and settles boost state that expired or
/// replenished while the app was closed.
///
/// Ordering inside matters: the catch-up accrual is computed against the
/// *persisted* boost expiry before the expiry is cleared, so time earned at
/// 2x while offline is credited at 2x.
#[allow(clippy::too_many_arguments)]
pub fn restore_session(
    clock: Res<SessionClock>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    mut account: ResMut<OwnerAccount>,
    mut boost: ResMut<BoostState>,
    mut owned: ResMut<OwnedCells>,
    mut display: ResMut<DisplayEarnings>,
) {
    let now = clock.now;
    let store = store.0.as_ref();

    let doc = match store.get_owner_account(&user.owner_id) {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            let doc = fresh_account_doc(&user.owner_id, now);
            if let Err(e) = store.put_owner_account(&doc) {
                warn!("could not create account document: {e}");
            }
            doc
        }
        Err(e) => {
            warn!("account load failed, starting with defaults: {e}");
            fresh_account_doc(&user.owner_id, now)
        }
    };

    owned.cells = match store.get_owned_cells(&user.owner_id) {
        Ok(cells) => cells,
        Err(e) => {
            warn!("owned cells load failed: {e}");
            Vec::new()
        }
    };
    let rate = owned.total_rate_per_sec();

    *account = OwnerAccount {
        tb_balance: doc.tb_balance,
        lifetime_earnings: doc.lifetime_earnings,
        last_earnings_snapshot: doc.last_earnings_snapshot,
    };

    // Offline catch-up: everything since the last persisted snapshot, with
    // the persisted boost window (possibly already over) counted at 2x.
    let mut restored_boost = doc.boost;
    let window = restored_boost.window_since(account.last_earnings_snapshot);
    let delta = accrued_since(account.last_earnings_snapshot, now, rate, window);
    if delta > 0.0 {
        let new_total = account.lifetime_earnings + delta;
        match store.set_owner_earnings(&user.owner_id, new_total, now) {
            Ok(()) => {
                account.lifetime_earnings = new_total;
                account.last_earnings_snapshot = now;
            }
            Err(e) => warn!("offline catch-up flush failed, keeping snapshot: {e}"),
        }
    }

    // "Expired while offline" and "replenished while offline" both have to
    // be persisted now, or the next restore would resurrect them.
    let outcome = restored_boost.tick(now);
    if outcome.dirty() {
        if let Err(e) = store.set_boost_state(&user.owner_id, &restored_boost) {
            warn!("boost settle-on-restore persist failed: {e}");
        }
    }
    *boost = restored_boost;

    display.re_anchor(
        account.lifetime_earnings,
        rate * boost.multiplier(now),
        now,
    );
    info!(
        "session restored for {}: {} cells, {} TB, boost {}",
        user.owner_id,
        owned.cells.len(),
        account.tb_balance,
        if boost.is_active(now) { "active" } else { "inactive" }
    );
}

/// Final flush when the app is shutting down, so at most a tick of accrual
/// is ever lost to an orderly exit.
pub fn exit_flush(
    mut exit: EventReader<AppExit>,
    clock: Res<SessionClock>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    owned: Res<OwnedCells>,
    boost: Res<BoostState>,
    mut account: ResMut<OwnerAccount>,
) {
    if exit.is_empty() {
        return;
    }
    exit.clear();
    let now = clock.now;
    if let Err(e) = flush_earnings(
        store.0.as_ref(),
        &user.owner_id,
        &mut account,
        owned.total_rate_per_sec(),
        &boost,
        now,
    ) {
        warn!("exit earnings flush failed: {e}");
    }
    if let Err(e) = store.0.set_boost_state(&user.owner_id, &boost) {
        warn!("exit boost persist failed: {e}");
    }
    info!("session state flushed on exit");
}

pub struct SessionPlugin;

impl Plugin for SessionPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<SessionUser>() {
            app.init_resource::<SessionUser>();
        }
        app.init_resource::<OwnerAccount>()
            .init_resource::<OwnedCells>()
            .add_systems(Startup, restore_session)
            .add_systems(Last, exit_flush);
    }
}
