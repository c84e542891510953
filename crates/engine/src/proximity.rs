//! Predicates built on grid addressing: containment, purchase/check-in
//! eligibility, and the once-per-day check-in rule.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::grid::{point_to_cell, CellId};

/// Fixed reference timezone for the check-in calendar-day rule. Every client
/// compares dates in this zone, so "a new day" flips at the same instant
/// worldwide.
pub const REFERENCE_TZ: Tz = chrono_tz::America::New_York;

/// True iff the point maps to exactly this cell. No partial-overlap
/// semantics: a point one grid line away is outside.
pub fn is_inside_cell(lat: f64, lon: f64, cell: CellId) -> bool {
    match point_to_cell(lat, lon) {
        Ok(id) => id == cell,
        Err(_) => false,
    }
}

/// True iff the point's cell is the target cell or one of its 8 neighbors
/// (Chebyshev distance <= 1). This is the eligibility rule for purchases and
/// check-ins.
pub fn is_adjacent_or_inside(lat: f64, lon: f64, cell: CellId) -> bool {
    match point_to_cell(lat, lon) {
        Ok(id) => id.chebyshev_distance(cell) <= 1,
        Err(_) => false,
    }
}

/// Calendar date of an instant in the reference timezone, as `YYYY-MM-DD`.
/// Used both for the client-side cooldown predicate and as the store's
/// check-in uniqueness key.
pub fn reference_day_key(t: DateTime<Utc>) -> String {
    t.with_timezone(&REFERENCE_TZ).format("%Y-%m-%d").to_string()
}

/// True if no prior check-in exists, or the prior check-in fell on a
/// different reference-timezone calendar day than `now`.
pub fn can_check_in_today(last_check_in: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_check_in {
        None => true,
        Some(last) => reference_day_key(last) != reference_day_key(now),
    }
}
