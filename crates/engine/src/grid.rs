use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{GRID_SIZE_DEG, MAX_VISIBLE_CELLS, MAX_VISIBLE_RADIUS_M, METERS_PER_CELL};

/// A WGS-84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Identity of one grid cell: the floored (lat, lon) / grid-size pair.
///
/// Two points map to the same `CellId` iff both floor divisions match, so a
/// cell's identity is a pure function of any point inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub x: i64,
    pub y: i64,
}

impl CellId {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Serialized form used as the store document key: `"{x}_{y}"`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    /// Chebyshev distance to another cell: max of the axis deltas.
    pub fn chebyshev_distance(&self, other: CellId) -> i64 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

impl FromStr for CellId {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once('_').ok_or(GridError::BadCellKey)?;
        let x = x.parse().map_err(|_| GridError::BadCellKey)?;
        let y = y.parse().map_err(|_| GridError::BadCellKey)?;
        Ok(CellId { x, y })
    }
}

/// Grid addressing failures. All of these degrade to an empty result at the
/// call site; none are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    /// A coordinate was NaN or infinite.
    NonFinite,
    /// Latitude outside +/-90 or longitude outside +/-180.
    OutOfRange,
    /// A cell key string did not parse as `"{x}_{y}"`.
    BadCellKey,
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::NonFinite => write!(f, "coordinate is not a finite number"),
            GridError::OutOfRange => write!(f, "coordinate outside valid lat/lon range"),
            GridError::BadCellKey => write!(f, "malformed cell key"),
        }
    }
}

impl std::error::Error for GridError {}

/// Maps a point to the cell containing it.
pub fn point_to_cell(lat: f64, lon: f64) -> Result<CellId, GridError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(GridError::NonFinite);
    }
    Ok(CellId {
        x: (lat / GRID_SIZE_DEG).floor() as i64,
        y: (lon / GRID_SIZE_DEG).floor() as i64,
    })
}

/// Centroid of a cell.
pub fn cell_center(id: CellId) -> LatLon {
    LatLon {
        lat: (id.x as f64 + 0.5) * GRID_SIZE_DEG,
        lon: (id.y as f64 + 0.5) * GRID_SIZE_DEG,
    }
}

/// The four corners of a cell's axis-aligned boundary rectangle, clockwise
/// starting at the southwest corner `(x * G, y * G)`.
pub fn cell_polygon(id: CellId) -> [LatLon; 4] {
    let south = id.x as f64 * GRID_SIZE_DEG;
    let west = id.y as f64 * GRID_SIZE_DEG;
    let north = (id.x + 1) as f64 * GRID_SIZE_DEG;
    let east = (id.y + 1) as f64 * GRID_SIZE_DEG;
    [
        LatLon::new(south, west),
        LatLon::new(north, west),
        LatLon::new(north, east),
        LatLon::new(south, east),
    ]
}

/// Enumerates the cells visible from a point within `radius_m` meters.
///
/// The radius is clamped to [`MAX_VISIBLE_RADIUS_M`] and converted to a
/// cell-count range by dividing by [`METERS_PER_CELL`] and rounding up. The
/// result is the full square neighborhood of that range (a square, not a
/// circle). If the square would exceed [`MAX_VISIBLE_CELLS`] entries, the
/// range shrinks to the largest square that fits under the cap and the
/// requested radius is discarded.
pub fn visible_cell_ids(lat: f64, lon: f64, radius_m: f64) -> Result<Vec<CellId>, GridError> {
    if !lat.is_finite() || !lon.is_finite() || !radius_m.is_finite() {
        return Err(GridError::NonFinite);
    }
    if lat.abs() > 90.0 || lon.abs() > 180.0 {
        return Err(GridError::OutOfRange);
    }

    let radius = radius_m.clamp(0.0, MAX_VISIBLE_RADIUS_M);
    let mut range = (radius / METERS_PER_CELL).ceil() as i64;
    while square_count(range) > MAX_VISIBLE_CELLS && range > 0 {
        range -= 1;
    }

    let center = point_to_cell(lat, lon)?;
    let mut out = Vec::with_capacity(square_count(range));
    for dx in -range..=range {
        for dy in -range..=range {
            out.push(CellId::new(center.x + dx, center.y + dy));
        }
    }
    Ok(out)
}

#[inline]
fn square_count(range: i64) -> usize {
    let side = 2 * range + 1;
    (side * side) as usize
}
