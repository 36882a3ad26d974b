//! Time, season, and region subsetting.
//!
//! The selector applies its steps in a fixed order: time window, then
//! season, then region, then ocean mask. Region masking must leave at least
//! one non-missing cell in the first time slice, otherwise the request is
//! considered misconfigured and fails with
//! [`EmptyRegion`](crate::errors::DiagnosticError::EmptyRegion).

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::Field;
use crate::grid;
use crate::region::{CornerRegion, Region, RegionMaskCatalog};
use crate::time::{Season, TimeWindow};
use ndarray::{s, Array2, Axis};

/// Apply the full selection chain to a field.
pub fn select(
    field: Field,
    window: Option<&TimeWindow>,
    season: Season,
    region: &Region,
    mask_ocean: bool,
    catalog: &dyn RegionMaskCatalog,
) -> DiagResult<Field> {
    let field = match window {
        Some(window) => select_time(field, window),
        None => field,
    };
    let field = select_season(field, season);
    let field = apply_region(field, region, catalog)?;
    if mask_ocean {
        apply_ocean_mask(field, catalog)
    } else {
        Ok(field)
    }
}

/// Keep only timesteps inside the inclusive window.
pub fn select_time(field: Field, window: &TimeWindow) -> Field {
    let keep: Vec<usize> = field
        .time
        .iter()
        .enumerate()
        .filter(|(_, date)| window.contains(**date))
        .map(|(i, _)| i)
        .collect();
    subset_time(field, &keep)
}

/// Keep only timesteps whose calendar month belongs to the season.
pub fn select_season(field: Field, season: Season) -> Field {
    if season.months().is_none() {
        return field;
    }
    let keep: Vec<usize> = field
        .time
        .iter()
        .enumerate()
        .filter(|(_, date)| season.contains(**date))
        .map(|(i, _)| i)
        .collect();
    subset_time(field, &keep)
}

fn subset_time(field: Field, keep: &[usize]) -> Field {
    if keep.len() == field.time.len() {
        return field;
    }
    let values = field.values.select(Axis(0), keep);
    let time = keep.iter().map(|&i| field.time[i]).collect();
    Field::new(values, time, field.lat, field.lon, field.meta)
}

/// Apply the spatial region restriction.
///
/// Named regions keep the global extent and fill non-selected cells with
/// missing values; corner regions crop to the bounding box plus a one-cell
/// margin. See [`Region`] for why the two behave differently.
pub fn apply_region(
    field: Field,
    region: &Region,
    catalog: &dyn RegionMaskCatalog,
) -> DiagResult<Field> {
    let field = match region {
        Region::Global => return Ok(field),
        Region::Named(names) => apply_named(field, names, catalog)?,
        Region::Corners(corners) => apply_corners(field, corners)?,
    };
    if !field.first_slice_has_data() {
        log::error!("All grid points masked! Wrong masking settings?");
        return Err(DiagnosticError::EmptyRegion);
    }
    Ok(field)
}

fn apply_named(
    mut field: Field,
    names: &[String],
    catalog: &dyn RegionMaskCatalog,
) -> DiagResult<Field> {
    let (_, nlat, nlon) = field.values.dim();
    let mut cover = Array2::<u32>::zeros((nlat, nlon));
    for name in names {
        let mask = catalog.mask_of(name)?;
        if mask.dim() != (nlat, nlon) {
            return Err(DiagnosticError::Error(format!(
                "mask for {} has shape {:?}, field is {:?}",
                name,
                mask.dim(),
                (nlat, nlon)
            )));
        }
        for (c, &m) in cover.iter_mut().zip(mask.iter()) {
            *c += m as u32;
        }
    }

    // A cell covered by two requested regions sits on a shared boundary and
    // would be double counted; keep only cells covered exactly once.
    for ((i, j), &count) in cover.indexed_iter() {
        if count != 1 {
            field.values.slice_mut(s![.., i, j]).fill(f64::NAN);
        }
    }
    Ok(field)
}

fn apply_corners(field: Field, corners: &CornerRegion) -> DiagResult<Field> {
    let bbox = corners.bounding_box();
    let lat_inside: Vec<usize> = field
        .lat
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= bbox.lat_min && v <= bbox.lat_max)
        .map(|(i, _)| i)
        .collect();
    let lon_inside: Vec<usize> = field
        .lon
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= bbox.lon_min && v <= bbox.lon_max)
        .map(|(i, _)| i)
        .collect();
    if lat_inside.is_empty() || lon_inside.is_empty() {
        log::error!("All grid points masked! Wrong masking settings?");
        return Err(DiagnosticError::EmptyRegion);
    }

    // Crop to the box plus a one-cell margin; the margin ring stays missing.
    let lat_lo = lat_inside[0].saturating_sub(1);
    let lat_hi = (lat_inside[lat_inside.len() - 1] + 2).min(field.lat.len());
    let lon_lo = lon_inside[0].saturating_sub(1);
    let lon_hi = (lon_inside[lon_inside.len() - 1] + 2).min(field.lon.len());

    let mut values = field
        .values
        .slice(s![.., lat_lo..lat_hi, lon_lo..lon_hi])
        .to_owned();
    let lat = field.lat.slice(s![lat_lo..lat_hi]).to_owned();
    let lon = field.lon.slice(s![lon_lo..lon_hi]).to_owned();

    for (i, &latv) in lat.iter().enumerate() {
        for (j, &lonv) in lon.iter().enumerate() {
            let inside = latv >= bbox.lat_min
                && latv <= bbox.lat_max
                && lonv >= bbox.lon_min
                && lonv <= bbox.lon_max;
            if !inside {
                values.slice_mut(s![.., i, j]).fill(f64::NAN);
            }
        }
    }

    Ok(Field::new(values, field.time, lat, lon, field.meta))
}

/// Keep land cells only, according to the catalog's land/sea mask.
///
/// Applied after region masking and independent of it. Works on cropped
/// fields by mapping cell coordinates back onto the fixed grid.
pub fn apply_ocean_mask(mut field: Field, catalog: &dyn RegionMaskCatalog) -> DiagResult<Field> {
    let land = catalog.land_mask()?;
    if land.dim() != (grid::NLAT, grid::NLON) {
        return Err(DiagnosticError::Error(format!(
            "land/sea mask has shape {:?}, expected {:?}",
            land.dim(),
            (grid::NLAT, grid::NLON)
        )));
    }
    let lat = field.lat.clone();
    let lon = field.lon.clone();
    for (i, &latv) in lat.iter().enumerate() {
        for (j, &lonv) in lon.iter().enumerate() {
            let cell = grid::lat_index(latv)
                .zip(grid::lon_index(lonv))
                .ok_or_else(|| {
                    DiagnosticError::Error(format!(
                        "cell ({}, {}) is not on the fixed grid",
                        latv, lonv
                    ))
                })?;
            if !land[[cell.0, cell.1]] {
                field.values.slice_mut(s![.., i, j]).fill(f64::NAN);
            }
        }
    }
    Ok(field)
}
