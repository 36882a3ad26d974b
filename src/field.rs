//! Labeled gridded fields and the diagnostic output shapes.
//!
//! A [`Field`] is a time-resolved variable on the fixed global grid: a
//! `(time, lat, lon)` array with calendar time coordinates and physical
//! metadata. Temporal reduction produces either a [`FieldMap`] (a single
//! `(lat, lon)` map, for CLIM/STD/TREND and correlations) or a
//! [`FieldCycle`] (a `(month, lat, lon)` stack of twelve monthly maps).
//!
//! Missing values are `f64::NAN` in memory; the on-disk fill value is
//! carried in [`Metadata`] and applied by the storage collaborator. The
//! `encoding` bag is opaque to this crate and round-trips unchanged so a
//! store can write outputs with the input's packing.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical and storage metadata attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Declared physical unit, if any.
    pub units: Option<String>,
    pub long_name: Option<String>,
    pub standard_name: Option<String>,
    /// On-disk fill value replacing NaN on write.
    pub fill_value: Option<f64>,
    /// Opaque per-field encoding, preserved across transforms.
    pub encoding: BTreeMap<String, String>,
}

/// A time-resolved variable field on the fixed grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Data values, dims `(time, lat, lon)`.
    pub values: Array3<f64>,
    /// Calendar date of each timestep, same length as the time axis.
    pub time: Vec<NaiveDate>,
    /// Latitude cell centres (ascending).
    pub lat: Array1<f64>,
    /// Longitude cell centres (ascending).
    pub lon: Array1<f64>,
    pub meta: Metadata,
}

impl Field {
    /// Build a field, checking that coordinates match the data shape.
    ///
    /// # Panics
    ///
    /// Panics if a coordinate length disagrees with the corresponding axis.
    pub fn new(
        values: Array3<f64>,
        time: Vec<NaiveDate>,
        lat: Array1<f64>,
        lon: Array1<f64>,
        meta: Metadata,
    ) -> Self {
        let (nt, nlat, nlon) = values.dim();
        assert_eq!(time.len(), nt, "time coordinate length must match data");
        assert_eq!(lat.len(), nlat, "lat coordinate length must match data");
        assert_eq!(lon.len(), nlon, "lon coordinate length must match data");
        Self {
            values,
            time,
            lat,
            lon,
            meta,
        }
    }

    /// Number of timesteps.
    pub fn len_time(&self) -> usize {
        self.time.len()
    }

    /// Whether the first time slice contains at least one finite value.
    pub fn first_slice_has_data(&self) -> bool {
        if self.values.dim().0 == 0 {
            return false;
        }
        self.values
            .index_axis(ndarray::Axis(0), 0)
            .iter()
            .any(|v| v.is_finite())
    }
}

/// A time-collapsed `(lat, lon)` diagnostic map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    pub values: Array2<f64>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub meta: Metadata,
}

impl FieldMap {
    /// # Panics
    ///
    /// Panics if a coordinate length disagrees with the corresponding axis.
    pub fn new(values: Array2<f64>, lat: Array1<f64>, lon: Array1<f64>, meta: Metadata) -> Self {
        let (nlat, nlon) = values.dim();
        assert_eq!(lat.len(), nlat, "lat coordinate length must match data");
        assert_eq!(lon.len(), nlon, "lon coordinate length must match data");
        Self {
            values,
            lat,
            lon,
            meta,
        }
    }
}

/// A `(month, lat, lon)` monthly-cycle diagnostic.
///
/// The leading axis always has twelve entries, January..=December; a month
/// with no samples is NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCycle {
    pub values: Array3<f64>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub meta: Metadata,
}

impl FieldCycle {
    /// # Panics
    ///
    /// Panics if the leading axis is not 12 or a coordinate length disagrees
    /// with the corresponding axis.
    pub fn new(values: Array3<f64>, lat: Array1<f64>, lon: Array1<f64>, meta: Metadata) -> Self {
        let (nmonth, nlat, nlon) = values.dim();
        assert_eq!(nmonth, 12, "cycle fields have one entry per calendar month");
        assert_eq!(lat.len(), nlat, "lat coordinate length must match data");
        assert_eq!(lon.len(), nlon, "lon coordinate length must match data");
        Self {
            values,
            lat,
            lon,
            meta,
        }
    }
}

/// The output of the diagnostic pipeline.
///
/// A closed set of shapes so downstream code matches exhaustively instead of
/// inspecting array dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Still time-resolved (aggregation `none` or the per-variable half of a
    /// correlation).
    Series(Field),
    /// A single map (CLIM, STD, TREND, correlation).
    Map(FieldMap),
    /// Twelve monthly maps (CYC).
    Cycle(FieldCycle),
}

impl Diagnostic {
    pub fn meta(&self) -> &Metadata {
        match self {
            Diagnostic::Series(f) => &f.meta,
            Diagnostic::Map(m) => &m.meta,
            Diagnostic::Cycle(c) => &c.meta,
        }
    }

    pub fn as_series(&self) -> Option<&Field> {
        match self {
            Diagnostic::Series(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Diagnostic::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_cycle(&self) -> Option<&FieldCycle> {
        match self {
            Diagnostic::Cycle(c) => Some(c),
            _ => None,
        }
    }
}
