//! # LC-01 Coordinate Grid - Spatial Activity Index
//!
//! A fixed 181×361 cell index over integer latitude/longitude degrees,
//! tracking per-cell contract activity and enforcing a per-minute operation
//! cap so a single cell cannot be flooded.
//!
//! ## Responsibilities
//!
//! - Locate any WGS-84 coordinate in its 1°×1° cell (integer floor)
//! - Count active contracts, successes and failures per cell
//! - Enforce `max_coordinate_ops_per_minute` through a 60 s rolling window
//! - Maintain an exponential moving success rate (α = 0.1) for reputation
//! - Great-circle distances (haversine), rounded to meters

pub mod cell;
pub mod distance;
pub mod grid;

pub use cell::CellStats;
pub use distance::{haversine_m, EARTH_RADIUS_M};
pub use grid::{CellId, CoordinateGrid, GridError};

/// Latitude rows: −90 … 90 inclusive.
pub const LAT_CELLS: usize = 181;

/// Longitude columns: −180 … 180 inclusive.
pub const LNG_CELLS: usize = 361;

/// Rolling-window horizon for the operations cap.
pub const WINDOW_SECONDS: f64 = 60.0;

/// Smoothing factor of the per-cell success-rate moving average.
pub const SUCCESS_EMA_ALPHA: f64 = 0.1;
