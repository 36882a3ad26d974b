//! Synthetic fields and fixture collaborators for the test suite.
//!
//! Everything here works on the fixed 2.5° grid so tests exercise the same
//! cell-indexing paths as production data.

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::{Field, Metadata};
use crate::grid;
use crate::io::Regridder;
use crate::region::{CornerRegion, RegionMaskCatalog};
use chrono::NaiveDate;
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mid-month dates for `years` consecutive years starting at `start_year`.
pub fn monthly_time_axis(start_year: i32, years: usize) -> Vec<NaiveDate> {
    let mut time = Vec::with_capacity(years * 12);
    for y in 0..years as i32 {
        for m in 1..=12 {
            time.push(NaiveDate::from_ymd_opt(start_year + y, m, 15).expect("valid date"));
        }
    }
    time
}

/// A field on the fixed grid filled with one value.
pub fn uniform_field(value: f64, time: Vec<NaiveDate>) -> Field {
    field_from_fn(time, |_, _, _| value)
}

/// A field on the fixed grid with values from `f(time, lat, lon)` indices.
pub fn field_from_fn(time: Vec<NaiveDate>, f: impl Fn(usize, usize, usize) -> f64) -> Field {
    let nt = time.len();
    let values = Array3::from_shape_fn((nt, grid::NLAT, grid::NLON), |(t, i, j)| f(t, i, j));
    Field::new(
        values,
        time,
        grid::reference_lat(),
        grid::reference_lon(),
        Metadata::default(),
    )
}

/// A corner region built directly from points, bypassing the side file.
pub fn corner_region(label: &str, corners: [(f64, f64); 4]) -> CornerRegion {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "climdiag-corner-{}-{}-{}.txt",
        label,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let body: String = corners
        .iter()
        .map(|(lon, lat)| format!("{}, {}\n", lon, lat))
        .collect();
    std::fs::write(&path, body).expect("temp dir is writable");
    let region = CornerRegion::from_file(&path).expect("generated corner file is valid");
    let _ = std::fs::remove_file(&path);
    region
}

/// Rectangular region catalog on the fixed grid.
///
/// Ships two disjoint defaults loosely modelled on SREX shapes: `NEU`
/// (northern Europe) and `MED` (Mediterranean). The land/sea mask marks the
/// eastern hemisphere as land, which is wrong geography but exact and easy
/// to assert against.
#[derive(Debug, Clone)]
pub struct RectCatalog {
    regions: BTreeMap<String, Rect>,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    lat: (f64, f64),
    lon: (f64, f64),
}

impl Default for RectCatalog {
    fn default() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert(
            "NEU".to_string(),
            Rect {
                lat: (48.0, 75.0),
                lon: (-10.0, 40.0),
            },
        );
        regions.insert(
            "MED".to_string(),
            Rect {
                lat: (30.0, 45.0),
                lon: (-10.0, 40.0),
            },
        );
        Self { regions }
    }
}

impl RectCatalog {
    /// Add a rectangular region (`lat` and `lon` are inclusive bounds on
    /// cell centres).
    pub fn with_region(mut self, name: &str, lat: (f64, f64), lon: (f64, f64)) -> Self {
        self.regions.insert(name.to_string(), Rect { lat, lon });
        self
    }

    /// Add a region whose mask selects no cells at all.
    pub fn with_empty_region(self, name: &str) -> Self {
        self.with_region(name, (1.0, -1.0), (1.0, -1.0))
    }
}

impl RegionMaskCatalog for RectCatalog {
    fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    fn mask_of(&self, name: &str) -> DiagResult<Array2<bool>> {
        let rect = self
            .regions
            .get(name)
            .ok_or_else(|| DiagnosticError::UnknownRegion(name.to_string()))?;
        let lat = grid::reference_lat();
        let lon = grid::reference_lon();
        Ok(Array2::from_shape_fn(
            (grid::NLAT, grid::NLON),
            |(i, j)| {
                lat[i] >= rect.lat.0
                    && lat[i] <= rect.lat.1
                    && lon[j] >= rect.lon.0
                    && lon[j] <= rect.lon.1
            },
        ))
    }

    fn land_mask(&self) -> DiagResult<Array2<bool>> {
        let lon = grid::reference_lon();
        Ok(Array2::from_shape_fn((grid::NLAT, grid::NLON), |(_, j)| {
            lon[j] > 0.0
        }))
    }
}

/// Regridder stub that returns the input path untouched and counts calls.
///
/// Inputs in the test suite are already on the fixed grid, so the
/// interesting observable is whether the pipeline routed through the
/// collaborator at all.
#[derive(Debug, Default)]
pub struct IdentityRegridder {
    calls: AtomicUsize,
}

impl IdentityRegridder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Regridder for IdentityRegridder {
    fn remap_bilinear(&self, input: &Path, _target: &grid::GridSpec) -> DiagResult<PathBuf> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(input.to_path_buf())
    }
}
