//! Passive income accrual: continuous by wall-clock time, doubled inside a
//! boost window, flushed to the store as an idempotent absolute total.

use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::boost::BoostState;
use crate::cells::OwnedCells;
use crate::clock::SessionClock;
use crate::config::FLUSH_INTERVAL_TICKS;
use crate::display::DisplayEarnings;
use crate::session::SessionUser;
use crate::store::{PropertyStore, StoreError, StoreHandle};
use crate::wallet::OwnerAccount;
use crate::{EngineSet, TickCounter};

/// Interval during which the 2x multiplier applies. The end may lie in the
/// past (an expiry that lapsed offline); the overlap math below handles it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Fractional seconds from `a` to `b` (negative if `b` precedes `a`).
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds() as f64 / 1000.0
}

/// Income earned over `[last, now]` at `total_rate_per_sec`, with the
/// portion overlapping `boost` counted twice.
///
/// The overlap is clamped to the elapsed interval, so a window that starts
/// before `last` or ends after `now` contributes only its covered part, and
/// a window entirely outside the interval contributes nothing. Negative
/// elapsed time (clock skew) yields zero, never a negative amount.
pub fn accrued_since(
    last: DateTime<Utc>,
    now: DateTime<Utc>,
    total_rate_per_sec: f64,
    boost: Option<BoostWindow>,
) -> f64 {
    let elapsed = seconds_between(last, now).max(0.0);
    let boosted = boost
        .map(|w| {
            let start = if w.start > last { w.start } else { last };
            let end = if w.end < now { w.end } else { now };
            seconds_between(start, end).max(0.0)
        })
        .unwrap_or(0.0)
        .min(elapsed);
    let normal = elapsed - boosted;
    normal * total_rate_per_sec + boosted * total_rate_per_sec * 2.0
}

/// Compute earnings since the account's last snapshot and write the new
/// absolute total (snapshot advances to `now`). The local mirror is only
/// updated when the store write succeeds, so a failed flush leaves the full
/// delta to be retried by the next one.
pub fn flush_earnings(
    store: &dyn PropertyStore,
    owner_id: &str,
    account: &mut OwnerAccount,
    total_rate_per_sec: f64,
    boost: &BoostState,
    now: DateTime<Utc>,
) -> Result<f64, StoreError> {
    let window = boost.window_since(account.last_earnings_snapshot);
    let delta = accrued_since(
        account.last_earnings_snapshot,
        now,
        total_rate_per_sec,
        window,
    );
    let new_total = account.lifetime_earnings + delta;
    store.set_owner_earnings(owner_id, new_total, now)?;
    account.lifetime_earnings = new_total;
    account.last_earnings_snapshot = now;
    Ok(new_total)
}

/// Periodic earnings flush. Failures are logged and swallowed; the flush is
/// an absolute write, so the next attempt simply carries a larger delta.
pub fn earnings_flush_system(
    tick: Res<TickCounter>,
    clock: Res<SessionClock>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    owned: Res<OwnedCells>,
    boost: Res<BoostState>,
    mut account: ResMut<OwnerAccount>,
    mut display: ResMut<DisplayEarnings>,
) {
    if !tick.0.is_multiple_of(FLUSH_INTERVAL_TICKS) {
        return;
    }
    let now = clock.now;
    let rate = owned.total_rate_per_sec();
    match flush_earnings(store.0.as_ref(), &user.owner_id, &mut account, rate, &boost, now) {
        Ok(total) => {
            display.re_anchor(total, rate * boost.multiplier(now), now);
        }
        Err(e) => {
            warn!("earnings flush failed, will retry next cycle: {e}");
        }
    }
}

pub struct AccrualPlugin;

impl Plugin for AccrualPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            earnings_flush_system.in_set(EngineSet::PostSim),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, OwnerAccountDoc};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    const ROCK_RATE: f64 = 1.1e-9;

    #[test]
    fn test_no_boost_is_rate_times_elapsed() {
        let last = t0();
        let now = last + Duration::seconds(3600);
        let earned = accrued_since(last, now, ROCK_RATE, None);
        assert!((earned - 3600.0 * ROCK_RATE).abs() < 1e-18);
    }

    #[test]
    fn test_reference_rock_hour_scenario() {
        // One rock cell, one hour, no boost: 3600 * 1.1e-9 = 3.96e-6.
        let last = t0();
        let earned = accrued_since(last, last + Duration::seconds(3600), ROCK_RATE, None);
        assert!((earned - 3.96e-6).abs() < 1e-15);
    }

    #[test]
    fn test_interval_fully_boosted_doubles() {
        let last = t0();
        let now = last + Duration::seconds(600);
        let window = BoostWindow {
            start: last - Duration::seconds(100),
            end: now + Duration::seconds(100),
        };
        let earned = accrued_since(last, now, ROCK_RATE, Some(window));
        assert!((earned - 600.0 * ROCK_RATE * 2.0).abs() < 1e-18);
    }

    #[test]
    fn test_partial_overlap_splits_interval() {
        // 1000 s elapsed, boost covers the first 400 s.
        let last = t0();
        let now = last + Duration::seconds(1000);
        let window = BoostWindow {
            start: last - Duration::seconds(50),
            end: last + Duration::seconds(400),
        };
        let earned = accrued_since(last, now, ROCK_RATE, Some(window));
        let expected = 600.0 * ROCK_RATE + 400.0 * ROCK_RATE * 2.0;
        assert!((earned - expected).abs() < 1e-18);
    }

    #[test]
    fn test_window_entirely_before_interval() {
        let last = t0();
        let now = last + Duration::seconds(100);
        let window = BoostWindow {
            start: last - Duration::seconds(500),
            end: last - Duration::seconds(100),
        };
        let earned = accrued_since(last, now, ROCK_RATE, Some(window));
        assert!((earned - 100.0 * ROCK_RATE).abs() < 1e-18);
    }

    #[test]
    fn test_negative_elapsed_clamps_to_zero() {
        let last = t0();
        let now = last - Duration::seconds(100);
        assert_eq!(accrued_since(last, now, ROCK_RATE, None), 0.0);
    }

    #[test]
    fn test_zero_rate_earns_nothing() {
        let last = t0();
        let now = last + Duration::seconds(3600);
        assert_eq!(accrued_since(last, now, 0.0, None), 0.0);
    }

    fn seeded_store(owner: &str, snapshot: DateTime<Utc>) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put_owner_account(&OwnerAccountDoc {
                owner_id: owner.to_string(),
                tb_balance: 100,
                lifetime_earnings: 0.0,
                last_earnings_snapshot: snapshot,
                boost: BoostState::default(),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_flush_writes_absolute_total_and_snapshot() {
        let store = seeded_store("alice", t0());
        let mut account = OwnerAccount {
            tb_balance: 100,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: t0(),
        };
        let now = t0() + Duration::seconds(3600);
        let total = flush_earnings(
            &store,
            "alice",
            &mut account,
            ROCK_RATE,
            &BoostState::default(),
            now,
        )
        .unwrap();
        assert!((total - 3.96e-6).abs() < 1e-15);

        let doc = store.get_owner_account("alice").unwrap().unwrap();
        assert!((doc.lifetime_earnings - total).abs() < 1e-18);
        assert_eq!(doc.last_earnings_snapshot, now);
        assert_eq!(account.last_earnings_snapshot, now);
    }

    #[test]
    fn test_flush_twice_is_idempotent() {
        let store = seeded_store("alice", t0());
        let mut account = OwnerAccount {
            tb_balance: 100,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: t0(),
        };
        let now = t0() + Duration::seconds(3600);
        let boost = BoostState::default();
        let first = flush_earnings(&store, "alice", &mut account, ROCK_RATE, &boost, now).unwrap();
        let second = flush_earnings(&store, "alice", &mut account, ROCK_RATE, &boost, now).unwrap();
        assert_eq!(first, second);
        let doc = store.get_owner_account("alice").unwrap().unwrap();
        assert!((doc.lifetime_earnings - first).abs() < 1e-18);
    }

    #[test]
    fn test_failed_flush_keeps_local_snapshot() {
        // Store with no account: the write fails, so the local mirror must
        // keep its snapshot for the retry.
        let store = MemoryStore::new();
        let mut account = OwnerAccount {
            tb_balance: 100,
            lifetime_earnings: 1.0,
            last_earnings_snapshot: t0(),
        };
        let now = t0() + Duration::seconds(60);
        let err = flush_earnings(
            &store,
            "ghost",
            &mut account,
            ROCK_RATE,
            &BoostState::default(),
            now,
        )
        .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(account.last_earnings_snapshot, t0());
        assert_eq!(account.lifetime_earnings, 1.0);
    }

    #[test]
    fn test_flush_counts_boost_overlap() {
        let store = seeded_store("alice", t0());
        let mut account = OwnerAccount {
            tb_balance: 100,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: t0(),
        };
        // Boost expires 10 minutes into a 60-minute interval.
        let boost = BoostState {
            expires_at: Some(t0() + Duration::seconds(600)),
            ..Default::default()
        };
        let now = t0() + Duration::seconds(3600);
        let total = flush_earnings(&store, "alice", &mut account, ROCK_RATE, &boost, now).unwrap();
        let expected = 3000.0 * ROCK_RATE + 600.0 * ROCK_RATE * 2.0;
        assert!((total - expected).abs() < 1e-15);
    }
}
