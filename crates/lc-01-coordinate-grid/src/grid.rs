//! The grid itself.

use crate::cell::CellStats;
use crate::{LAT_CELLS, LNG_CELLS};
use serde::{Deserialize, Serialize};
use shared_types::GeoPoint;
use std::collections::HashMap;
use thiserror::Error;

/// Integer-degree cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub lat: i16,
    pub lng: i16,
}

impl CellId {
    /// Locate a coordinate's cell by integer floor of each axis.
    pub fn from_point(point: GeoPoint) -> Option<CellId> {
        if !point.in_range() {
            return None;
        }
        Some(CellId {
            lat: point.lat.floor() as i16,
            lng: point.lng.floor() as i16,
        })
    }
}

/// Grid failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("coordinate out of range")]
    InvalidCoordinate,

    #[error("cell ({lat}, {lng}) saturated: {ops} ops in the last minute")]
    CoordinateSaturated { lat: i16, lng: i16, ops: usize },
}

/// The 181×361 activity index.
///
/// Cells are materialized lazily; an untouched planet costs nothing. The
/// per-minute cap is checked before every counted operation, so under
/// adversarial input the window length never exceeds the cap.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoordinateGrid {
    cells: HashMap<CellId, CellStats>,
    max_ops_per_minute: u32,
}

impl CoordinateGrid {
    pub fn new(max_ops_per_minute: u32) -> Self {
        Self {
            cells: HashMap::new(),
            max_ops_per_minute,
        }
    }

    /// Number of cells that have ever seen activity.
    pub fn active_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn stats(&self, cell: CellId) -> Option<&CellStats> {
        self.cells.get(&cell)
    }

    /// Admit one contract operation at `point`, updating the window and
    /// activity counters atomically.
    pub fn record_operation(&mut self, point: GeoPoint, now: f64) -> Result<CellId, GridError> {
        let cell_id = CellId::from_point(point).ok_or(GridError::InvalidCoordinate)?;
        let stats = self.cells.entry(cell_id).or_default();

        let in_window = stats.prune_window(now);
        if in_window >= self.max_ops_per_minute as usize {
            return Err(GridError::CoordinateSaturated {
                lat: cell_id.lat,
                lng: cell_id.lng,
                ops: in_window,
            });
        }

        stats.record_op(now);
        Ok(cell_id)
    }

    /// A contract became active in this cell.
    pub fn contract_opened(&mut self, point: GeoPoint, now: f64) -> Result<(), GridError> {
        let cell_id = self.record_operation(point, now)?;
        // Entry exists after record_operation.
        if let Some(stats) = self.cells.get_mut(&cell_id) {
            stats.active_contracts += 1;
        }
        Ok(())
    }

    /// A contract in this cell reached a terminal state.
    pub fn contract_closed(
        &mut self,
        point: GeoPoint,
        success: bool,
        duration_s: f64,
        now: f64,
    ) -> Result<(), GridError> {
        let cell_id = CellId::from_point(point).ok_or(GridError::InvalidCoordinate)?;
        let stats = self.cells.entry(cell_id).or_default();
        stats.active_contracts = stats.active_contracts.saturating_sub(1);
        stats.last_activity = now;
        stats.record_outcome(success, duration_s);
        Ok(())
    }

    /// Moving success rate for a cell, 0.5 for virgin territory.
    pub fn success_rate(&self, point: GeoPoint) -> f64 {
        CellId::from_point(point)
            .and_then(|id| self.cells.get(&id))
            .map(|s| s.ema_success_rate)
            .unwrap_or(0.5)
    }
}
