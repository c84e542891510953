//! Tunable constants for the claim/accrual/boost engine.
//!
//! The grid size and the rent rate table are calibration parameters, not
//! structural contracts; changing them rescales the economy without touching
//! any engine logic.

/// Angular edge length of one grid cell, in degrees.
///
/// Roughly a 10 m cell edge at mid-latitudes. Longitude-dependent
/// meter-per-degree distortion is deliberately ignored: cells narrow toward
/// the poles but stay addressable and disjoint everywhere.
pub const GRID_SIZE_DEG: f64 = 0.0001;

/// Approximate cell edge in meters, used to convert a view radius into a
/// cell-count range.
pub const METERS_PER_CELL: f64 = 10.0;

/// Requested view radii are clamped to this before enumeration.
pub const MAX_VISIBLE_RADIUS_M: f64 = 150.0;

/// Hard cap on the number of cells a single visibility query may return.
/// The neighborhood square shrinks to fit under this, discarding the
/// requested radius if necessary.
pub const MAX_VISIBLE_CELLS: usize = 500;

/// Purchase price of one unowned cell, in TB.
pub const CELL_PRICE_TB: i64 = 10;

/// Balance granted to a newly created owner account, in TB.
pub const STARTING_BALANCE_TB: i64 = 100;

/// TB awarded to the visitor for a successful check-in.
pub const CHECKIN_VISITOR_REWARD_TB: i64 = 5;

/// TB awarded to the cell owner when someone checks in on their cell.
pub const CHECKIN_OWNER_REWARD_TB: i64 = 1;

// ---------------------------------------------------------------------------
// Boost
// ---------------------------------------------------------------------------

/// Minutes of boost added per grant (free or paid).
pub const BOOST_INCREMENT_MIN: i64 = 30;

/// Ceiling on total outstanding boosted minutes. A grant can never push the
/// expiry past `now + BOOST_CEILING_MIN`.
pub const BOOST_CEILING_MIN: i64 = 480;

/// Size of the free grant quota.
pub const BOOST_FREE_QUOTA: u8 = 4;

/// Hours until the free quota refills, measured from the moment it hits zero.
pub const BOOST_REPLENISH_COOLDOWN_HOURS: i64 = 6;

/// Lifetime cap on paid/ad grants.
pub const BOOST_MAX_PAID_GRANTS: u8 = 12;

// ---------------------------------------------------------------------------
// Tick cadences
// ---------------------------------------------------------------------------
// The engine runs on a 10 Hz fixed tick. Cadences below are expressed in
// fixed ticks so that a single counter drives every periodic system.

/// Fixed-update rate driving the engine.
pub const FIXED_TICK_HZ: f64 = 10.0;

/// Boost countdown cadence: every 10 ticks (1 Hz).
pub const BOOST_TICK_INTERVAL: u64 = 10;

/// Earnings flush cadence: every 600 ticks (60 s).
pub const FLUSH_INTERVAL_TICKS: u64 = 600;

/// Store snapshot cadence: every 3000 ticks (5 min).
pub const SNAPSHOT_INTERVAL_TICKS: u64 = 3000;
