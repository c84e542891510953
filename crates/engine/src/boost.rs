//! Time-boxed 2x income multiplier with a replenishing free quota and a
//! capped paid/ad quota.
//!
//! All transitions are pure methods of (state, now). The enclosing systems
//! own the cadence and persist the state after any transition; the methods
//! themselves never touch the store or the wall clock.

use std::fmt;

use bevy::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::accrual::{flush_earnings, BoostWindow};
use crate::cells::OwnedCells;
use crate::clock::SessionClock;
use crate::config::{
    BOOST_CEILING_MIN, BOOST_FREE_QUOTA, BOOST_INCREMENT_MIN, BOOST_MAX_PAID_GRANTS,
    BOOST_REPLENISH_COOLDOWN_HOURS, BOOST_TICK_INTERVAL,
};
use crate::display::DisplayEarnings;
use crate::session::SessionUser;
use crate::store::StoreHandle;
use crate::wallet::OwnerAccount;
use crate::{EngineSet, TickCounter};

/// Which quota a grant request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostKind {
    Free,
    Paid,
}

/// The boost state machine: Inactive (no expiry, or expiry in the past)
/// versus Active (now < expiry). Free and paid grants both extend the one
/// shared expiry.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostState {
    /// Free grants left, 0..=4. Refills to 4 after the replenish cooldown.
    pub free_grants_remaining: u8,
    /// Shared expiry of the 2x multiplier. None while inactive.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the free quota refills. Set the moment the quota hits zero.
    pub next_free_replenish: Option<DateTime<Utc>>,
    /// Paid/ad grants consumed over the account's lifetime, capped.
    pub paid_grants_used: u8,
}

impl Default for BoostState {
    fn default() -> Self {
        Self {
            free_grants_remaining: BOOST_FREE_QUOTA,
            expires_at: None,
            next_free_replenish: None,
            paid_grants_used: 0,
        }
    }
}

/// What a `tick` or restore pass changed. Either flag set means the caller
/// must persist the new state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoostTickOutcome {
    pub expired: bool,
    pub replenished: bool,
}

impl BoostTickOutcome {
    pub fn dirty(self) -> bool {
        self.expired || self.replenished
    }
}

impl BoostState {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| now < e)
    }

    /// Accrual multiplier at `now`: 2x while active, otherwise 1x.
    pub fn multiplier(&self, now: DateTime<Utc>) -> f64 {
        if self.is_active(now) {
            2.0
        } else {
            1.0
        }
    }

    /// Seconds of boosted time still outstanding.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.expires_at {
            Some(e) if e > now => (e - now).num_seconds(),
            _ => 0,
        }
    }

    /// Boost window for accrual over an interval starting at `since`. The
    /// window survives expiry: an expiry in the past still bounds the
    /// boosted portion of an offline catch-up interval.
    pub fn window_since(&self, since: DateTime<Utc>) -> Option<BoostWindow> {
        self.expires_at.map(|end| BoostWindow { start: since, end })
    }

    /// Extend the shared expiry by one increment, clamped so no more than
    /// [`BOOST_CEILING_MIN`] boosted minutes are ever outstanding.
    fn extend(&mut self, now: DateTime<Utc>) {
        let base = match self.expires_at {
            Some(e) if e > now => e,
            _ => now,
        };
        let extended = base + Duration::minutes(BOOST_INCREMENT_MIN);
        let ceiling = now + Duration::minutes(BOOST_CEILING_MIN);
        self.expires_at = Some(extended.min(ceiling));
    }

    /// Spend one free grant.
    pub fn grant_free(&mut self, now: DateTime<Utc>) -> Result<(), BoostError> {
        if self.free_grants_remaining == 0 {
            return Err(BoostError::NoFreeGrantsAvailable);
        }
        self.extend(now);
        self.free_grants_remaining -= 1;
        if self.free_grants_remaining == 0 && self.next_free_replenish.is_none() {
            self.next_free_replenish = Some(now + Duration::hours(BOOST_REPLENISH_COOLDOWN_HOURS));
        }
        Ok(())
    }

    /// Spend one paid/ad grant.
    pub fn grant_paid(&mut self, now: DateTime<Utc>) -> Result<(), BoostError> {
        if self.paid_grants_used >= BOOST_MAX_PAID_GRANTS {
            return Err(BoostError::PaidGrantQuotaExhausted);
        }
        self.extend(now);
        self.paid_grants_used += 1;
        Ok(())
    }

    pub fn grant(&mut self, kind: BoostKind, now: DateTime<Utc>) -> Result<(), BoostError> {
        match kind {
            BoostKind::Free => self.grant_free(now),
            BoostKind::Paid => self.grant_paid(now),
        }
    }

    /// Advance the machine to `now`: refill the free quota when its cooldown
    /// elapses (independent of whether a boost is running), and clear an
    /// expiry that has passed. The quota reset and the expiry clear both
    /// need to be persisted so a later session restore cannot resurrect
    /// stale state.
    pub fn tick(&mut self, now: DateTime<Utc>) -> BoostTickOutcome {
        let mut outcome = BoostTickOutcome::default();
        if let Some(at) = self.next_free_replenish {
            if now >= at {
                self.free_grants_remaining = BOOST_FREE_QUOTA;
                self.next_free_replenish = None;
                outcome.replenished = true;
            }
        }
        if let Some(e) = self.expires_at {
            if now >= e {
                self.expires_at = None;
                outcome.expired = true;
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostError {
    NoFreeGrantsAvailable,
    PaidGrantQuotaExhausted,
}

impl fmt::Display for BoostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostError::NoFreeGrantsAvailable => write!(f, "no free boosts available"),
            BoostError::PaidGrantQuotaExhausted => write!(f, "paid boost quota exhausted"),
        }
    }
}

impl std::error::Error for BoostError {}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Presentation layer asks for another boost grant.
#[derive(Event, Debug, Clone, Copy)]
pub struct BoostRequest {
    pub kind: BoostKind,
}

/// Outcome of a grant request, carrying the new state for the countdown UI.
#[derive(Event, Debug, Clone)]
pub struct BoostUpdated {
    pub result: Result<BoostState, BoostError>,
}

/// 1 Hz countdown. An expiry is flushed into earnings *before* it is
/// cleared, so the boosted tail of the interval is never accounted at 1x.
#[allow(clippy::too_many_arguments)]
pub fn boost_tick_system(
    tick: Res<TickCounter>,
    clock: Res<SessionClock>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    owned: Res<OwnedCells>,
    mut boost: ResMut<BoostState>,
    mut account: ResMut<OwnerAccount>,
    mut display: ResMut<DisplayEarnings>,
) {
    if !tick.0.is_multiple_of(BOOST_TICK_INTERVAL) {
        return;
    }
    let now = clock.now;
    let rate = owned.total_rate_per_sec();

    if boost.expires_at.is_some_and(|e| now >= e) {
        if let Err(e) =
            flush_earnings(store.0.as_ref(), &user.owner_id, &mut account, rate, &boost, now)
        {
            warn!("earnings flush at boost expiry failed: {e}");
        }
    }

    let outcome = boost.tick(now);
    if !outcome.dirty() {
        return;
    }
    if let Err(e) = store.0.set_boost_state(&user.owner_id, &boost) {
        warn!("boost state persist failed: {e}");
    }
    if outcome.expired {
        display.re_anchor(account.lifetime_earnings, rate, now);
        info!("boost expired");
    }
    if outcome.replenished {
        info!("free boost quota replenished");
    }
}

/// Applies grant requests. Earnings are flushed before the multiplier
/// changes so the accrual interval splits exactly at the grant instant.
#[allow(clippy::too_many_arguments)]
pub fn handle_boost_requests(
    mut requests: EventReader<BoostRequest>,
    mut updated: EventWriter<BoostUpdated>,
    clock: Res<SessionClock>,
    store: Res<StoreHandle>,
    user: Res<SessionUser>,
    owned: Res<OwnedCells>,
    mut boost: ResMut<BoostState>,
    mut account: ResMut<OwnerAccount>,
    mut display: ResMut<DisplayEarnings>,
) {
    for request in requests.read() {
        let now = clock.now;
        let rate = owned.total_rate_per_sec();
        if let Err(e) =
            flush_earnings(store.0.as_ref(), &user.owner_id, &mut account, rate, &boost, now)
        {
            warn!("pre-grant earnings flush failed: {e}");
        }

        let result = match boost.grant(request.kind, now) {
            Ok(()) => {
                if let Err(e) = store.0.set_boost_state(&user.owner_id, &boost) {
                    warn!("boost state persist failed: {e}");
                }
                display.re_anchor(account.lifetime_earnings, rate * boost.multiplier(now), now);
                info!(
                    "boost granted ({:?}), active for {} s",
                    request.kind,
                    boost.remaining_secs(now)
                );
                Ok(boost.clone())
            }
            Err(e) => Err(e),
        };
        updated.send(BoostUpdated { result });
    }
}

pub struct BoostPlugin;

impl Plugin for BoostPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<BoostState>()
            .add_event::<BoostRequest>()
            .add_event::<BoostUpdated>()
            .add_systems(
                FixedUpdate,
                (boost_tick_system, handle_boost_requests)
                    .chain()
                    .in_set(EngineSet::Sim),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_state_is_inactive() {
        let state = BoostState::default();
        assert!(!state.is_active(t0()));
        assert_eq!(state.multiplier(t0()), 1.0);
        assert_eq!(state.free_grants_remaining, BOOST_FREE_QUOTA);
    }

    #[test]
    fn test_four_free_grants_then_exhausted() {
        let mut state = BoostState::default();
        let now = t0();
        for _ in 0..4 {
            state.grant_free(now).unwrap();
        }
        assert_eq!(state.free_grants_remaining, 0);
        // 4 x 30 min of boosted time outstanding.
        assert_eq!(state.remaining_secs(now), 120 * 60);
        assert_eq!(
            state.grant_free(now),
            Err(BoostError::NoFreeGrantsAvailable)
        );
    }

    #[test]
    fn test_last_free_grant_arms_replenish_timer() {
        let mut state = BoostState {
            free_grants_remaining: 1,
            ..Default::default()
        };
        let now = t0();
        state.grant_free(now).unwrap();
        assert_eq!(state.free_grants_remaining, 0);
        assert_eq!(state.expires_at, Some(now + Duration::minutes(30)));
        assert_eq!(
            state.next_free_replenish,
            Some(now + Duration::hours(BOOST_REPLENISH_COOLDOWN_HOURS))
        );
    }

    #[test]
    fn test_exhaustion_does_not_rearm_running_timer() {
        let armed = t0() + Duration::hours(1);
        let mut state = BoostState {
            free_grants_remaining: 1,
            next_free_replenish: Some(armed),
            ..Default::default()
        };
        state.grant_free(t0() + Duration::hours(2)).unwrap();
        // The earlier timer stands.
        assert_eq!(state.next_free_replenish, Some(armed));
    }

    #[test]
    fn test_extension_stacks_on_active_boost() {
        let mut state = BoostState::default();
        let now = t0();
        state.grant_free(now).unwrap();
        // Second grant 10 minutes later extends from the current expiry.
        let later = now + Duration::minutes(10);
        state.grant_free(later).unwrap();
        assert_eq!(state.expires_at, Some(now + Duration::minutes(60)));
    }

    #[test]
    fn test_grant_on_expired_boost_starts_from_now() {
        let mut state = BoostState::default();
        let now = t0();
        state.grant_free(now).unwrap();
        // Well past expiry: the stale expiry is not the extension base.
        let later = now + Duration::hours(5);
        state.grant_free(later).unwrap();
        assert_eq!(state.expires_at, Some(later + Duration::minutes(30)));
    }

    #[test]
    fn test_ceiling_clamps_extension() {
        let now = t0();
        let mut state = BoostState {
            free_grants_remaining: 4,
            expires_at: Some(now + Duration::minutes(475)),
            ..Default::default()
        };
        state.grant_free(now).unwrap();
        // 475 + 30 would be 505; the ceiling allows only 480.
        assert_eq!(state.expires_at, Some(now + Duration::minutes(480)));
        assert_eq!(state.remaining_secs(now), 480 * 60);
    }

    #[test]
    fn test_paid_grants_capped() {
        let mut state = BoostState::default();
        let now = t0();
        for _ in 0..BOOST_MAX_PAID_GRANTS {
            state.grant_paid(now).unwrap();
        }
        assert_eq!(
            state.grant_paid(now),
            Err(BoostError::PaidGrantQuotaExhausted)
        );
        // Paid grants hit the same shared ceiling.
        assert!(state.remaining_secs(now) <= 480 * 60);
    }

    #[test]
    fn test_tick_clears_expiry() {
        let mut state = BoostState::default();
        let now = t0();
        state.grant_free(now).unwrap();
        let before = state.tick(now + Duration::minutes(29));
        assert!(!before.dirty());
        assert!(state.is_active(now + Duration::minutes(29)));

        let after = state.tick(now + Duration::minutes(30));
        assert!(after.expired);
        assert_eq!(state.expires_at, None);
        assert!(!state.is_active(now + Duration::minutes(30)));
    }

    #[test]
    fn test_tick_replenishes_quota_while_boost_active() {
        let now = t0();
        let mut state = BoostState {
            free_grants_remaining: 0,
            next_free_replenish: Some(now + Duration::hours(6)),
            // Expiry far out so the boost is still running at replenish time.
            expires_at: Some(now + Duration::hours(7)),
            ..Default::default()
        };
        let outcome = state.tick(now + Duration::hours(6));
        assert!(outcome.replenished);
        assert!(!outcome.expired);
        assert_eq!(state.free_grants_remaining, BOOST_FREE_QUOTA);
        assert_eq!(state.next_free_replenish, None);
        assert!(state.is_active(now + Duration::hours(6)));
    }

    #[test]
    fn test_window_since_survives_expiry() {
        let now = t0();
        let mut state = BoostState::default();
        state.grant_free(now).unwrap();
        state.tick(now + Duration::hours(1));
        // Expiry cleared, but a restore path asks for the window before
        // clearing; emulate by rebuilding the pre-clear state.
        let stale = BoostState {
            expires_at: Some(now + Duration::minutes(30)),
            ..BoostState::default()
        };
        let window = stale.window_since(now).unwrap();
        assert_eq!(window.start, now);
        assert_eq!(window.end, now + Duration::minutes(30));
    }
}
