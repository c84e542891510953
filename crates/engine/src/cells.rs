use bevy::prelude::*;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::CellId;

/// Category assigned to a cell once, at purchase time, from a fixed weighted
/// draw. The category sets the cell's passive rent rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellCategory {
    #[default]
    Rock,
    Coal,
    Gold,
    Diamond,
}

impl CellCategory {
    /// Draw weight out of 100: 60 / 30 / 9 / 1.
    pub fn weight(self) -> u32 {
        match self {
            CellCategory::Rock => 60,
            CellCategory::Coal => 30,
            CellCategory::Gold => 9,
            CellCategory::Diamond => 1,
        }
    }

    /// Passive income rate in currency units per second. Each tier is a
    /// little under 2x the previous; diamond is 4x rock.
    pub fn rent_rate_per_sec(self) -> f64 {
        match self {
            CellCategory::Rock => 1.1e-9,
            CellCategory::Coal => 1.6e-9,
            CellCategory::Gold => 2.2e-9,
            CellCategory::Diamond => 4.4e-9,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CellCategory::Rock => "Rock",
            CellCategory::Coal => "Coal",
            CellCategory::Gold => "Gold",
            CellCategory::Diamond => "Diamond",
        }
    }

    /// Weighted draw over the 60/30/9/1 distribution.
    pub fn draw(rng: &mut impl Rng) -> CellCategory {
        match rng.gen_range(0..100u32) {
            0..=59 => CellCategory::Rock,
            60..=89 => CellCategory::Coal,
            90..=98 => CellCategory::Gold,
            _ => CellCategory::Diamond,
        }
    }
}

/// An owned grid cell. Unowned cells have no record anywhere; the document
/// is created lazily at purchase and never deleted or transferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub category: CellCategory,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// The session user's holdings, mirrored from the store at session start and
/// appended to on purchase.
#[derive(Resource, Debug, Clone, Default)]
pub struct OwnedCells {
    pub cells: Vec<Cell>,
}

impl OwnedCells {
    /// Summed base rent rate of all owned cells, before any boost
    /// multiplier.
    pub fn total_rate_per_sec(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| c.category.rent_rate_per_sec())
            .sum()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.iter().any(|c| c.id == id)
    }
}
