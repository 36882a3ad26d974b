//! Temporal reduction of a selected field into a diagnostic.
//!
//! Each aggregation kind collapses the time axis with its own missing-value
//! policy:
//!
//! - `CLIM`: mean of yearly means (not a flat mean over all timesteps, so
//!   uneven per-year timestep counts do not bias the result), strict NaN
//!   propagation at both stages;
//! - `STD`: per-cell least-squares detrend, then population standard
//!   deviation, strict;
//! - `TREND`: per-cell OLS slope against the 0-based step index, strict,
//!   with the unit rewritten to a per-year rate (one step represents one
//!   year of the input's temporal resolution);
//! - `CYC`: mean per calendar month, skip-missing, always twelve entries;
//! - `none` / `CORR`: pass-through (a correlation is reduced across two
//!   fields by the dispatcher, not per field).
//!
//! Per-cell reductions are cell-independent, so they are mapped over the
//! grid in parallel; the observable result does not depend on cell order.

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::{Diagnostic, Field, FieldCycle, FieldMap};
use crate::stats;
use chrono::Datelike;
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How the time axis is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Aggregation {
    /// Leave the time axis untouched.
    #[default]
    None,
    /// Climatological mean (mean of yearly means).
    Clim,
    /// Detrended interannual standard deviation.
    Std,
    /// Linear trend slope.
    Trend,
    /// Monthly cycle.
    Cyc,
    /// Cross-variable correlation; per-field this is a pass-through.
    Corr,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::None => "none",
            Aggregation::Clim => "CLIM",
            Aggregation::Std => "STD",
            Aggregation::Trend => "TREND",
            Aggregation::Cyc => "CYC",
            Aggregation::Corr => "CORR",
        }
    }
}

impl FromStr for Aggregation {
    type Err = DiagnosticError;

    fn from_str(s: &str) -> DiagResult<Self> {
        match s {
            "none" => Ok(Aggregation::None),
            "CLIM" => Ok(Aggregation::Clim),
            "STD" => Ok(Aggregation::Std),
            "TREND" => Ok(Aggregation::Trend),
            "CYC" => Ok(Aggregation::Cyc),
            "CORR" => Ok(Aggregation::Corr),
            other => Err(DiagnosticError::UnsupportedAggregation(other.to_string())),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapse a field's time axis according to the aggregation kind.
///
/// Unsupported aggregations cannot reach this point: they are rejected when
/// the [`Aggregation`] token is parsed.
pub fn reduce(field: Field, aggregation: Aggregation) -> Diagnostic {
    match aggregation {
        Aggregation::None | Aggregation::Corr => Diagnostic::Series(field),
        Aggregation::Clim => Diagnostic::Map(climatology(field)),
        Aggregation::Std => Diagnostic::Map(detrended_std(field)),
        Aggregation::Trend => Diagnostic::Map(trend(field)),
        Aggregation::Cyc => Diagnostic::Cycle(annual_cycle(field)),
    }
}

/// Map an independent 1-D series reduction over every grid cell.
///
/// The reducer sees the cell's full time series (NaN marks missing values)
/// and owns its missing-value policy. Cells are processed in parallel.
pub fn map_series<F>(values: &Array3<f64>, reducer: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let (nt, nlat, nlon) = values.dim();
    let flat: Vec<f64> = (0..nlat * nlon)
        .into_par_iter()
        .map(|k| {
            let (i, j) = (k / nlon, k % nlon);
            let series: Vec<f64> = (0..nt).map(|t| values[[t, i, j]]).collect();
            reducer(&series)
        })
        .collect();
    Array2::from_shape_vec((nlat, nlon), flat).expect("cell count matches grid shape")
}

/// Map an independent reduction over paired series from two fields.
///
/// Used for cross-variable statistics (per-cell correlation). Both arrays
/// must have the same shape.
///
/// # Panics
///
/// Panics if the array shapes differ.
pub fn map_series_pair<F>(a: &Array3<f64>, b: &Array3<f64>, reducer: F) -> Array2<f64>
where
    F: Fn(&[f64], &[f64]) -> f64 + Sync,
{
    assert_eq!(a.dim(), b.dim(), "paired fields must share a shape");
    let (nt, nlat, nlon) = a.dim();
    let flat: Vec<f64> = (0..nlat * nlon)
        .into_par_iter()
        .map(|k| {
            let (i, j) = (k / nlon, k % nlon);
            let series_a: Vec<f64> = (0..nt).map(|t| a[[t, i, j]]).collect();
            let series_b: Vec<f64> = (0..nt).map(|t| b[[t, i, j]]).collect();
            reducer(&series_a, &series_b)
        })
        .collect();
    Array2::from_shape_vec((nlat, nlon), flat).expect("cell count matches grid shape")
}

/// Mean over time as mean-of-yearly-means, strict missing propagation.
fn climatology(field: Field) -> FieldMap {
    let (_, nlat, nlon) = field.values.dim();
    let years = group_by_year(&field);

    let mut total = Array2::<f64>::zeros((nlat, nlon));
    for indices in years.values() {
        // NaN propagates through the sum, which is exactly the strict
        // policy: one missing timestep blanks that year's mean.
        let mut yearly = Array2::<f64>::zeros((nlat, nlon));
        for &t in indices {
            yearly += &field.values.index_axis(Axis(0), t);
        }
        yearly /= indices.len() as f64;
        total += &yearly;
    }
    if years.is_empty() {
        total.fill(f64::NAN);
    } else {
        total /= years.len() as f64;
    }
    FieldMap::new(total, field.lat, field.lon, field.meta)
}

fn group_by_year(field: &Field) -> BTreeMap<i32, Vec<usize>> {
    let mut years: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (t, date) in field.time.iter().enumerate() {
        years.entry(date.year()).or_default().push(t);
    }
    years
}

/// Detrended standard deviation per cell, strict missing propagation.
fn detrended_std(field: Field) -> FieldMap {
    let values = map_series(&field.values, stats::detrended_stddev);
    FieldMap::new(values, field.lat, field.lon, field.meta)
}

/// OLS trend slope per cell; the unit becomes a per-year rate.
fn trend(field: Field) -> FieldMap {
    let values = map_series(&field.values, stats::trend_slope);
    let mut meta = field.meta;
    meta.units = meta.units.map(|u| format!("{} year**-1", u));
    FieldMap::new(values, field.lat, field.lon, meta)
}

/// Mean per calendar month, skip-missing.
fn annual_cycle(field: Field) -> FieldCycle {
    let (nt, nlat, nlon) = field.values.dim();
    let mut by_month: [Vec<usize>; 12] = Default::default();
    for t in 0..nt {
        by_month[field.time[t].month0() as usize].push(t);
    }

    let mut values = Array3::<f64>::from_elem((12, nlat, nlon), f64::NAN);
    for (m, indices) in by_month.iter().enumerate() {
        if indices.is_empty() {
            continue;
        }
        let month_mean = map_series(&field.values, |series| {
            let sample: Vec<f64> = indices.iter().map(|&t| series[t]).collect();
            stats::mean_skipna(&sample)
        });
        values.index_axis_mut(Axis(0), m).assign(&month_mean);
    }
    FieldCycle::new(values, field.lat, field.lon, field.meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use is_close::is_close;

    #[test]
    fn aggregation_tokens_round_trip() {
        for agg in [
            Aggregation::None,
            Aggregation::Clim,
            Aggregation::Std,
            Aggregation::Trend,
            Aggregation::Cyc,
            Aggregation::Corr,
        ] {
            assert_eq!(agg.as_str().parse::<Aggregation>().unwrap(), agg);
        }
        assert!(matches!(
            "MEAN".parse::<Aggregation>(),
            Err(DiagnosticError::UnsupportedAggregation(t)) if t == "MEAN"
        ));
    }

    #[test]
    fn none_and_corr_pass_through() {
        let field = testdata::uniform_field(4.0, testdata::monthly_time_axis(2000, 1));
        for agg in [Aggregation::None, Aggregation::Corr] {
            let diag = reduce(field.clone(), agg);
            let series = diag.as_series().expect("pass-through keeps the series");
            assert_eq!(series.values, field.values);
        }
    }

    #[test]
    fn climatology_of_constant_field_is_that_constant() {
        let field = testdata::uniform_field(6.5, testdata::monthly_time_axis(2000, 3));
        let diag = reduce(field, Aggregation::Clim);
        let map = diag.as_map().unwrap();
        assert!(map.values.iter().all(|&v| is_close!(v, 6.5)));
    }

    #[test]
    fn climatology_weights_years_equally() {
        // year one has 12 samples of 1.0, year two a single sample of 4.0;
        // mean of yearly means is 2.5, a flat mean would give 1.23
        let mut time = testdata::monthly_time_axis(2000, 1);
        time.push(chrono::NaiveDate::from_ymd_opt(2001, 6, 15).unwrap());
        let field = testdata::field_from_fn(time, |t, _, _| if t < 12 { 1.0 } else { 4.0 });
        let diag = reduce(field, Aggregation::Clim);
        assert!(is_close!(diag.as_map().unwrap().values[[0, 0]], 2.5));
    }

    #[test]
    fn climatology_is_strict_about_missing_values() {
        // one missing January in 2000 blanks that year; 2001 survives
        let time = testdata::monthly_time_axis(2000, 2);
        let mut field = testdata::field_from_fn(time, |_, _, _| 1.0);
        field.values[[0, 3, 3]] = f64::NAN;
        let diag = reduce(field, Aggregation::Clim);
        let map = diag.as_map().unwrap();
        assert!(map.values[[3, 3]].is_nan());
        assert!(is_close!(map.values[[0, 0]], 1.0));
    }

    #[test]
    fn climatology_missing_everywhere_if_all_years_affected() {
        let time = testdata::monthly_time_axis(2000, 2);
        let mut field = testdata::field_from_fn(time, |_, _, _| 1.0);
        field.values[[0, 3, 3]] = f64::NAN; // 2000
        field.values[[12, 3, 3]] = f64::NAN; // 2001
        let diag = reduce(field, Aggregation::Clim);
        assert!(diag.as_map().unwrap().values[[3, 3]].is_nan());
    }

    #[test]
    fn trend_recovers_synthetic_slope_everywhere() {
        let time = testdata::monthly_time_axis(2000, 4);
        let field = testdata::field_from_fn(time, |t, _, _| 1.5 + 0.125 * t as f64);
        let diag = reduce(field, Aggregation::Trend);
        let map = diag.as_map().unwrap();
        for &v in map.values.iter() {
            assert!(is_close!(v, 0.125));
        }
    }

    #[test]
    fn trend_cell_with_missing_value_is_missing() {
        let time = testdata::monthly_time_axis(2000, 2);
        let mut field = testdata::field_from_fn(time, |t, _, _| t as f64);
        field.values[[5, 10, 10]] = f64::NAN;
        let diag = reduce(field, Aggregation::Trend);
        let map = diag.as_map().unwrap();
        assert!(map.values[[10, 10]].is_nan());
        assert!(is_close!(map.values[[10, 11]], 1.0));
    }

    #[test]
    fn trend_rewrites_the_unit_to_a_rate() {
        let mut field = testdata::uniform_field(1.0, testdata::monthly_time_axis(2000, 2));
        field.meta.units = Some("degC".to_string());
        let diag = reduce(field, Aggregation::Trend);
        assert_eq!(
            diag.meta().units.as_deref(),
            Some("degC year**-1")
        );
    }

    #[test]
    fn std_is_reduced_by_detrending() {
        let time = testdata::monthly_time_axis(2000, 10);
        let field = testdata::field_from_fn(time, |t, _, _| {
            let tf = t as f64;
            0.2 * tf + (tf * std::f64::consts::TAU / 12.0).sin()
        });
        let raw = stats::stddev(
            &(0..120)
                .map(|t| field.values[[t, 0, 0]])
                .collect::<Vec<_>>(),
        );
        let diag = reduce(field, Aggregation::Std);
        let detrended = diag.as_map().unwrap().values[[0, 0]];
        assert!(detrended < raw);
    }

    #[test]
    fn std_with_missing_value_is_missing() {
        let time = testdata::monthly_time_axis(2000, 2);
        let mut field = testdata::field_from_fn(time, |t, _, _| (t as f64).sin());
        field.values[[0, 7, 7]] = f64::NAN;
        let diag = reduce(field, Aggregation::Std);
        assert!(diag.as_map().unwrap().values[[7, 7]].is_nan());
    }

    #[test]
    fn cycle_has_twelve_monthly_means() {
        let time = testdata::monthly_time_axis(2000, 2);
        // value equals the calendar month number
        let field = testdata::field_from_fn(time, |t, _, _| (t % 12 + 1) as f64);
        let diag = reduce(field, Aggregation::Cyc);
        let cycle = diag.as_cycle().unwrap();
        assert_eq!(cycle.values.dim().0, 12);
        for m in 0..12 {
            assert!(is_close!(cycle.values[[m, 0, 0]], (m + 1) as f64));
        }
    }

    #[test]
    fn cycle_skips_missing_values() {
        let time = testdata::monthly_time_axis(2000, 2);
        let mut field = testdata::field_from_fn(time, |t, _, _| if t < 12 { 2.0 } else { 4.0 });
        // blank January of the first year; the second year's January remains
        field.values[[0, 0, 0]] = f64::NAN;
        let diag = reduce(field, Aggregation::Cyc);
        let cycle = diag.as_cycle().unwrap();
        assert!(is_close!(cycle.values[[0, 0, 0]], 4.0));
        assert!(is_close!(cycle.values[[0, 1, 1]], 3.0));
    }

    #[test]
    fn cycle_month_without_samples_is_missing() {
        // JJA-only input: September..May have no samples at all
        let time: Vec<_> = testdata::monthly_time_axis(2000, 1)
            .into_iter()
            .filter(|d| [6, 7, 8].contains(&chrono::Datelike::month(d)))
            .collect();
        let field = testdata::field_from_fn(time, |_, _, _| 1.0);
        let diag = reduce(field, Aggregation::Cyc);
        let cycle = diag.as_cycle().unwrap();
        assert!(cycle.values[[0, 0, 0]].is_nan());
        assert!(is_close!(cycle.values[[6, 0, 0]], 1.0));
    }

    #[test]
    fn map_series_pair_correlates_cells_independently() {
        let time = testdata::monthly_time_axis(2000, 1);
        let a = testdata::field_from_fn(time.clone(), |t, i, j| (t + i + j) as f64);
        let b = testdata::field_from_fn(time, |t, i, j| 2.0 * (t + i + j) as f64 + 1.0);
        let out = map_series_pair(&a.values, &b.values, crate::stats::pearson);
        for &v in out.iter() {
            assert!(is_close!(v, 1.0));
        }
    }

    #[test]
    #[should_panic(expected = "share a shape")]
    fn map_series_pair_rejects_mismatched_shapes() {
        let a = testdata::uniform_field(1.0, testdata::monthly_time_axis(2000, 1));
        let b = testdata::uniform_field(1.0, testdata::monthly_time_axis(2000, 2));
        map_series_pair(&a.values, &b.values, crate::stats::pearson);
    }

    #[test]
    fn map_series_matches_sequential_evaluation() {
        let time = testdata::monthly_time_axis(2000, 1);
        let field = testdata::field_from_fn(time, |t, i, j| (t * 31 + i * 7 + j) as f64);
        let parallel = map_series(&field.values, stats::mean_strict);
        for ((i, j), &v) in parallel.indexed_iter() {
            let series: Vec<f64> = (0..12).map(|t| field.values[[t, i, j]]).collect();
            assert_eq!(v, stats::mean_strict(&series));
        }
    }
}
