//! The fixed global analysis grid.
//!
//! All diagnostics are computed on a single 2.5° cell-centred global grid:
//! latitudes -88.75..=88.75 and longitudes -178.75..=178.75, both in steps of
//! 2.5°. Inputs on any other grid must be regridded (see
//! [`Regridder`](crate::io::Regridder)) before entering the pipeline.
//!
//! The coordinate check is exact, not approximate. Every downstream masking
//! and cropping operation indexes cells by position, so a half-cell offset
//! would silently misalign regions rather than fail.

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::Field;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Grid spacing in degrees.
pub const GRID_STEP: f64 = 2.5;
/// Southernmost cell-centre latitude.
pub const LAT_FIRST: f64 = -88.75;
/// Westernmost cell-centre longitude.
pub const LON_FIRST: f64 = -178.75;
/// Number of latitude cells.
pub const NLAT: usize = 72;
/// Number of longitude cells.
pub const NLON: usize = 144;

/// Latitude coordinates of the fixed grid (ascending).
pub fn reference_lat() -> Array1<f64> {
    Array1::from_iter((0..NLAT).map(|i| LAT_FIRST + GRID_STEP * i as f64))
}

/// Longitude coordinates of the fixed grid (ascending).
pub fn reference_lon() -> Array1<f64> {
    Array1::from_iter((0..NLON).map(|i| LON_FIRST + GRID_STEP * i as f64))
}

/// Index of a latitude value on the fixed grid, or `None` if it is not a
/// cell centre.
pub fn lat_index(lat: f64) -> Option<usize> {
    let idx = ((lat - LAT_FIRST) / GRID_STEP).round() as isize;
    (0..NLAT as isize)
        .contains(&idx)
        .then_some(idx as usize)
        .filter(|&i| LAT_FIRST + GRID_STEP * i as f64 == lat)
}

/// Index of a longitude value on the fixed grid, or `None` if it is not a
/// cell centre.
pub fn lon_index(lon: f64) -> Option<usize> {
    let idx = ((lon - LON_FIRST) / GRID_STEP).round() as isize;
    (0..NLON as isize)
        .contains(&idx)
        .then_some(idx as usize)
        .filter(|&i| LON_FIRST + GRID_STEP * i as f64 == lon)
}

/// Target grid descriptor handed to the regridding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
}

impl GridSpec {
    /// The fixed 2.5° global grid.
    pub fn global() -> Self {
        Self {
            lat: reference_lat().to_vec(),
            lon: reference_lon().to_vec(),
        }
    }
}

/// Assert that a field's spatial coordinates exactly equal the fixed grid.
///
/// Returns [`DiagnosticError::GridMismatch`] naming the offending axis.
/// This guards every downstream cell-indexed operation (region masks, corner
/// crops) against silent misalignment.
pub fn validate_grid(field: &Field) -> DiagResult<()> {
    check_axis("lat", &field.lat, &reference_lat())?;
    check_axis("lon", &field.lon, &reference_lon())?;
    Ok(())
}

fn check_axis(axis: &'static str, actual: &Array1<f64>, expected: &Array1<f64>) -> DiagResult<()> {
    if actual.len() != expected.len() {
        return Err(DiagnosticError::GridMismatch {
            axis,
            detail: format!("expected {} cells, got {}", expected.len(), actual.len()),
        });
    }
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        if a != e {
            return Err(DiagnosticError::GridMismatch {
                axis,
                detail: format!("cell {} is {} (expected {})", i, a, e),
            });
        }
    }
    Ok(())
}
