//! Deterministic naming and lookup of persisted diagnostics.
//!
//! A computed diagnostic is identified by its full request: input file,
//! variable, time window, season, aggregation, region, and ocean-mask flag.
//! [`CacheKey`] renders that identity into a file name, so identical
//! requests always resolve to the same path and the pipeline can reuse the
//! persisted result instead of recomputing.
//!
//! Entries are only ever created or replaced wholesale; there is no
//! in-place mutation. Concurrent writers of the same key race benignly
//! (last writer wins); a store that needs stronger guarantees should write
//! via atomic rename.

use crate::reduce::Aggregation;
use crate::region::Region;
use crate::time::{Season, TimeWindow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity of one diagnostic result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Input file stem (name without the `.nc` suffix).
    pub input_stem: String,
    pub variable: String,
    pub window: Option<TimeWindow>,
    pub season: Season,
    pub aggregation: Aggregation,
    /// Region label as rendered by [`Region::label`].
    pub region: String,
    pub mask_ocean: bool,
}

impl CacheKey {
    pub fn new(
        infile: &Path,
        variable: &str,
        window: Option<TimeWindow>,
        season: Season,
        aggregation: Aggregation,
        region: &Region,
        mask_ocean: bool,
    ) -> Self {
        let input_stem = infile
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            input_stem,
            variable: variable.to_string(),
            window,
            season,
            aggregation,
            region: region.label(),
            mask_ocean,
        }
    }

    /// Deterministic output file name for this key:
    /// `{stem}_{window}_{season}_{aggregation}_{region}[_land].nc`.
    pub fn file_name(&self) -> String {
        let window = self
            .window
            .map(|w| w.label())
            .unwrap_or_else(|| "all".to_string());
        let land = if self.mask_ocean { "_land" } else { "" };
        format!(
            "{}_{}_{}_{}_{}{}.nc",
            self.input_stem,
            window,
            self.season.as_str(),
            self.aggregation.as_str(),
            self.region,
            land
        )
    }
}

/// Maps cache keys to paths under a diagnostic output directory.
#[derive(Debug, Clone)]
pub struct DiagnosticCache {
    dir: PathBuf,
}

impl DiagnosticCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a diagnostic with this identity is persisted under.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(window: Option<TimeWindow>, mask_ocean: bool) -> CacheKey {
        CacheKey::new(
            Path::new("data/tas/tas_mon_ECEARTH_rcp45_r1i1p1_g025.nc"),
            "tas",
            window,
            Season::Jja,
            Aggregation::Clim,
            &Region::named("NEU"),
            mask_ocean,
        )
    }

    #[test]
    fn file_name_encodes_the_request() {
        let window = TimeWindow::parse("2000", "2001").unwrap();
        assert_eq!(
            key(Some(window), false).file_name(),
            "tas_mon_ECEARTH_rcp45_r1i1p1_g025_2000-2001_JJA_CLIM_NEU.nc"
        );
    }

    #[test]
    fn unset_window_renders_as_all() {
        assert_eq!(
            key(None, false).file_name(),
            "tas_mon_ECEARTH_rcp45_r1i1p1_g025_all_JJA_CLIM_NEU.nc"
        );
    }

    #[test]
    fn ocean_mask_is_part_of_the_identity() {
        assert_ne!(key(None, true).file_name(), key(None, false).file_name());
        assert!(key(None, true).file_name().ends_with("_land.nc"));
    }

    #[test]
    fn region_lists_join_with_dashes() {
        let key = CacheKey::new(
            Path::new("pr.nc"),
            "pr",
            None,
            Season::Ann,
            Aggregation::Std,
            &Region::Named(vec!["NEU".into(), "MED".into()]),
            false,
        );
        assert_eq!(key.file_name(), "pr_all_ANN_STD_NEU-MED.nc");
    }

    #[test]
    fn identical_requests_share_a_path() {
        let cache = DiagnosticCache::new("/diag");
        let a = cache.path_for(&key(None, false));
        let b = cache.path_for(&key(None, false));
        assert_eq!(a, b);
        assert_eq!(a, Path::new("/diag/tas_mon_ECEARTH_rcp45_r1i1p1_g025_all_JJA_CLIM_NEU.nc"));
    }
}
