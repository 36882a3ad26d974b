//! Spatial regions and the region-mask catalog contract.
//!
//! Two non-global region kinds exist on purpose, with different
//! post-conditions:
//!
//! - [`Region::Named`] resolves against the mask catalog and keeps the full
//!   global extent, filling cells outside the selection with missing values.
//! - [`Region::Corners`] is an axis-aligned bounding box read from a
//!   four-corner side file; the result is cropped to the box plus a one-cell
//!   margin, with the margin ring missing.
//!
//! Do not unify the two: downstream consumers depend on the extent each one
//! produces.

use crate::errors::{DiagResult, DiagnosticError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lookup service for named region masks and the land/sea mask.
///
/// Implementations are read-only and safe to share across concurrent calls.
/// Masks are defined on the fixed 2.5° grid, `(lat, lon)` ordered.
pub trait RegionMaskCatalog {
    /// Whether `name` is a known region abbreviation.
    fn contains(&self, name: &str) -> bool;

    /// Cells belonging to the named region.
    fn mask_of(&self, name: &str) -> DiagResult<Array2<bool>>;

    /// Cells that are land.
    fn land_mask(&self) -> DiagResult<Array2<bool>>;
}

/// An axis-aligned bounding box loaded from a four-corner region file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerRegion {
    /// The four `(lon, lat)` corner points as given in the file.
    pub corners: [(f64, f64); 4],
    /// Label used in output file names (the file stem).
    label: String,
}

/// Bounding box of a corner region, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl CornerRegion {
    /// Load a corner region from a side file.
    ///
    /// The file must contain four lines with corners like `lon, lat`
    /// (comma or whitespace separated). A missing file is
    /// [`DiagnosticError::UnknownRegionFile`]; wrong shape or corners outside
    /// [-180, 180] x [-90, 90] is
    /// [`DiagnosticError::InvalidRegionGeometry`].
    pub fn from_file(path: &Path) -> DiagResult<Self> {
        if !path.is_file() {
            return Err(DiagnosticError::UnknownRegionFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let mut rows = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<f64> = line
                .replace(',', " ")
                .split_whitespace()
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed(path))?;
            if fields.len() != 2 {
                return Err(malformed(path));
            }
            rows.push((fields[0], fields[1]));
        }
        let corners: [(f64, f64); 4] = rows.try_into().map_err(|_| malformed(path))?;

        for &(lon, lat) in &corners {
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(DiagnosticError::InvalidRegionGeometry {
                    path: path.to_path_buf(),
                    reason: format!("corner ({}, {}) outside valid lon/lat range", lon, lat),
                });
            }
        }

        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "region".to_string());
        Ok(Self { corners, label })
    }

    /// The axis-aligned bounding box of the four corners.
    pub fn bounding_box(&self) -> BoundingBox {
        let lons = self.corners.iter().map(|c| c.0);
        let lats = self.corners.iter().map(|c| c.1);
        BoundingBox {
            lon_min: lons.clone().fold(f64::INFINITY, f64::min),
            lon_max: lons.fold(f64::NEG_INFINITY, f64::max),
            lat_min: lats.clone().fold(f64::INFINITY, f64::min),
            lat_max: lats.fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

fn malformed(path: &Path) -> DiagnosticError {
    DiagnosticError::InvalidRegionGeometry {
        path: path.to_path_buf(),
        reason: "should contain four lines with corners like: lon, lat".to_string(),
    }
}

/// Spatial restriction of a diagnostic request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    /// No spatial restriction.
    Global,
    /// Union of named catalog regions. A cell is kept iff exactly one of the
    /// requested regions covers it, so shared boundaries are not counted
    /// twice. Keeps the full global extent, masked cells missing.
    Named(Vec<String>),
    /// Bounding-box region from a corner file. Crops the extent to the box
    /// plus a one-cell margin.
    Corners(CornerRegion),
}

impl Region {
    /// Single named catalog region.
    pub fn named(name: impl Into<String>) -> Self {
        Region::Named(vec![name.into()])
    }

    /// Resolve a request token the way the invocation surface does: `GLOBAL`
    /// is global, a known catalog abbreviation is a named region, and any
    /// other token is read as `<region_dir>/<token>.txt` corner file.
    pub fn from_token(
        token: &str,
        catalog: &dyn RegionMaskCatalog,
        region_dir: &Path,
    ) -> DiagResult<Self> {
        if token == "GLOBAL" {
            return Ok(Region::Global);
        }
        if catalog.contains(token) {
            return Ok(Region::named(token));
        }
        let path: PathBuf = region_dir.join(format!("{}.txt", token));
        CornerRegion::from_file(&path).map(Region::Corners)
    }

    /// Token used in output file names: `GLOBAL`, region names joined by
    /// `-`, or the corner file stem.
    pub fn label(&self) -> String {
        match self {
            Region::Global => "GLOBAL".to_string(),
            Region::Named(names) => names.join("-"),
            Region::Corners(corners) => corners.label().to_string(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::RectCatalog;
    use std::io::Write;

    fn write_corner_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn corner_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corner_file(
            dir.path(),
            "alps.txt",
            "5.0, 43.0\n15.0, 43.0\n15.0, 48.0\n5.0, 48.0\n",
        );
        let region = CornerRegion::from_file(&path).unwrap();
        assert_eq!(region.label(), "alps");
        let bbox = region.bounding_box();
        assert_eq!(bbox.lon_min, 5.0);
        assert_eq!(bbox.lon_max, 15.0);
        assert_eq!(bbox.lat_min, 43.0);
        assert_eq!(bbox.lat_max, 48.0);
    }

    #[test]
    fn whitespace_separated_corners_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corner_file(dir.path(), "box.txt", "0 0\n10 0\n10 10\n0 10\n");
        assert!(CornerRegion::from_file(&path).is_ok());
    }

    #[test]
    fn missing_file_is_unknown_region_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CornerRegion::from_file(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, DiagnosticError::UnknownRegionFile(_)));
    }

    #[test]
    fn wrong_line_count_is_invalid_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corner_file(dir.path(), "tri.txt", "0 0\n10 0\n10 10\n");
        let err = CornerRegion::from_file(&path).unwrap_err();
        assert!(matches!(err, DiagnosticError::InvalidRegionGeometry { .. }));
    }

    #[test]
    fn out_of_range_corner_is_invalid_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_corner_file(dir.path(), "far.txt", "0 0\n200 0\n200 10\n0 10\n");
        let err = CornerRegion::from_file(&path).unwrap_err();
        match err {
            DiagnosticError::InvalidRegionGeometry { reason, .. } => {
                assert!(reason.contains("200"), "reason: {}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn token_resolution() {
        let dir = tempfile::tempdir().unwrap();
        write_corner_file(dir.path(), "custom.txt", "0 0\n10 0\n10 10\n0 10\n");
        let catalog = RectCatalog::default();

        assert_eq!(
            Region::from_token("GLOBAL", &catalog, dir.path()).unwrap(),
            Region::Global
        );
        assert_eq!(
            Region::from_token("NEU", &catalog, dir.path()).unwrap(),
            Region::named("NEU")
        );
        assert!(matches!(
            Region::from_token("custom", &catalog, dir.path()).unwrap(),
            Region::Corners(_)
        ));
        assert!(matches!(
            Region::from_token("missing", &catalog, dir.path()),
            Err(DiagnosticError::UnknownRegionFile(_))
        ));
    }

    #[test]
    fn labels() {
        assert_eq!(Region::Global.label(), "GLOBAL");
        assert_eq!(
            Region::Named(vec!["NEU".into(), "MED".into()]).label(),
            "NEU-MED"
        );
    }
}
