//! The basic diagnostic pipeline and the derived-diagnostic dispatcher.
//!
//! [`Diagnostics::compute_basic`] runs one variable through grid
//! validation, unit standardization, selection, and temporal reduction,
//! with result caching on durable storage. [`Diagnostics::compute`] resolves a [`DiagnosticSpec`]
//! to either that basic pipeline, the net-radiation combination, or a
//! cross-variable correlation.
//!
//! The pipeline is fail-fast: nothing catches and retries, and a diagnostic
//! is either fully computed and persisted or not produced at all. A partial
//! diagnostic would be scientifically worse than none.

use crate::cache::{CacheKey, DiagnosticCache};
use crate::errors::{DiagResult, DiagnosticError};
use crate::field::{Diagnostic, Field, FieldMap, Metadata};
use crate::grid::{self, GridSpec};
use crate::io::{GridStore, Regridder};
use crate::reduce::{self, Aggregation};
use crate::region::{Region, RegionMaskCatalog};
use crate::select;
use crate::stats;
use crate::time::{Season, TimeWindow};
use crate::units;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fill value stamped on derived fields whose constituents carry none.
const DEFAULT_FILL_VALUE: f64 = 1e20;

/// Minimum number of timesteps for a meaningful correlation.
const MIN_CORR_SAMPLES: usize = 3;

/// The net-radiation constituents, in the required order:
/// downwelling/upwelling longwave, downwelling/upwelling shortwave.
const RNET_CONSTITUENTS: [&str; 4] = ["rlds", "rlus", "rsds", "rsus"];

/// Parameters shared by every diagnostic computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticParams {
    pub time_window: Option<TimeWindow>,
    pub season: Season,
    pub aggregation: Aggregation,
    pub region: Region,
    /// Keep land cells only.
    pub mask_ocean: bool,
    /// Recompute even when a persisted result exists.
    pub overwrite: bool,
    /// Remap the input onto the fixed grid before opening it.
    pub regrid: bool,
}

impl Default for DiagnosticParams {
    fn default() -> Self {
        Self {
            time_window: None,
            season: Season::Ann,
            aggregation: Aggregation::None,
            region: Region::Global,
            mask_ocean: false,
            overwrite: false,
            regrid: false,
        }
    }
}

/// What to compute: a basic variable, or a named derivation over basic
/// variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagnosticSpec {
    /// A basic variable, computed directly by the pipeline.
    Basic(String),
    /// A derived diagnostic combining basic variables, e.g.
    /// `rnet = [rlds, rlus, rsds, rsus]` or a two-variable correlation.
    Derived { name: String, variables: Vec<String> },
}

impl DiagnosticSpec {
    pub fn basic(name: impl Into<String>) -> Self {
        DiagnosticSpec::Basic(name.into())
    }

    pub fn derived(name: impl Into<String>, variables: &[&str]) -> Self {
        DiagnosticSpec::Derived {
            name: name.into(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Locates the file of a companion variable next to a reference file.
///
/// Model output conventionally stores each variable in a parallel directory
/// and file-name scheme, so the companion path is derived from the
/// reference path rather than passed in.
pub trait CompanionPathResolver {
    fn companion(&self, reference: &Path, from_var: &str, to_var: &str) -> PathBuf;
}

/// Default resolver: substitutes the variable token in the file name
/// (`{var}_` prefix segments) and in a `/{var}/` directory segment.
///
/// Substring substitution is inherently fragile: every `{var}_` occurrence
/// in the file name is rewritten, and a directory named exactly like the
/// variable is rewritten even when it is unrelated. Deployments whose path
/// layouts collide with variable tokens must supply their own resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSubstitution;

impl CompanionPathResolver for TokenSubstitution {
    fn companion(&self, reference: &Path, from_var: &str, to_var: &str) -> PathBuf {
        let file = reference
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
            .replace(&format!("{}_", from_var), &format!("{}_", to_var));
        match reference.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                let dir = format!("{}/", parent.display()).replace(
                    &format!("/{}/", from_var),
                    &format!("/{}/", to_var),
                );
                Path::new(&dir).join(file)
            }
            None => PathBuf::from(file),
        }
    }
}

static TOKEN_SUBSTITUTION: TokenSubstitution = TokenSubstitution;

/// Diagnostic computation service over a set of collaborators.
pub struct Diagnostics<'a> {
    store: &'a dyn GridStore,
    catalog: &'a dyn RegionMaskCatalog,
    regridder: Option<&'a dyn Regridder>,
    paths: &'a dyn CompanionPathResolver,
}

impl<'a> Diagnostics<'a> {
    pub fn new(store: &'a dyn GridStore, catalog: &'a dyn RegionMaskCatalog) -> Self {
        Self {
            store,
            catalog,
            regridder: None,
            paths: &TOKEN_SUBSTITUTION,
        }
    }

    /// Enable input regridding through the given collaborator.
    pub fn with_regridder(mut self, regridder: &'a dyn Regridder) -> Self {
        self.regridder = Some(regridder);
        self
    }

    /// Replace the companion-path strategy used for derived diagnostics.
    pub fn with_path_resolver(mut self, paths: &'a dyn CompanionPathResolver) -> Self {
        self.paths = paths;
        self
    }

    /// Compute a basic diagnostic for one variable.
    ///
    /// When `outfile` is given and already exists (and `overwrite` is
    /// unset), the persisted result is returned as-is: the deterministic
    /// file name is trusted to encode the request. Otherwise the input is
    /// optionally regridded, then validated, unit-standardized, selected,
    /// reduced, persisted, and returned. Failures propagate uncaught.
    pub fn compute_basic(
        &self,
        infile: &Path,
        varn: &str,
        outfile: Option<&Path>,
        params: &DiagnosticParams,
    ) -> DiagResult<Diagnostic> {
        if let Some(out) = outfile {
            if !params.overwrite && self.store.exists(out) {
                log::debug!("Diagnostic already exists & overwrite=False, skipping.");
                return self.store.read_diagnostic(out, varn);
            }
        }

        let infile = if params.regrid {
            let regridder = self.regridder.ok_or_else(|| {
                DiagnosticError::Error("regrid requested but no regridder configured".to_string())
            })?;
            regridder.remap_bilinear(infile, &GridSpec::global())?
        } else {
            infile.to_path_buf()
        };

        let mut field = self.store.read(&infile, varn)?;
        grid::validate_grid(&field)?;
        units::standardize_units(&mut field, varn)?;
        let field = select::select(
            field,
            params.time_window.as_ref(),
            params.season,
            &params.region,
            params.mask_ocean,
            self.catalog,
        )?;
        let diagnostic = reduce::reduce(field, params.aggregation);

        if let Some(out) = outfile {
            self.store.write(&diagnostic, varn, out)?;
        }
        Ok(diagnostic)
    }

    /// Compute a basic or derived diagnostic, persisting under `base_dir`
    /// with the deterministic file name derived from the request.
    pub fn compute(
        &self,
        infile: &Path,
        spec: &DiagnosticSpec,
        base_dir: &Path,
        params: &DiagnosticParams,
    ) -> DiagResult<Diagnostic> {
        let cache = DiagnosticCache::new(base_dir);
        match spec {
            DiagnosticSpec::Basic(varn) => {
                let outfile = cache.path_for(&self.key(infile, varn, params));
                self.compute_basic(infile, varn, Some(&outfile), params)
            }
            DiagnosticSpec::Derived { name, variables } if name == "rnet" => {
                self.compute_net_radiation(infile, variables, &cache, params)
            }
            DiagnosticSpec::Derived { name, variables }
                if params.aggregation == Aggregation::Corr =>
            {
                self.compute_correlation(infile, name, variables, &cache, params)
            }
            DiagnosticSpec::Derived { name, .. } => Err(DiagnosticError::InvalidDerivation(
                format!(
                    "no derivation rule for {} with time_aggregation={}",
                    name, params.aggregation
                ),
            )),
        }
    }

    fn key(&self, infile: &Path, varn: &str, params: &DiagnosticParams) -> CacheKey {
        CacheKey::new(
            infile,
            varn,
            params.time_window,
            params.season,
            params.aggregation,
            &params.region,
            params.mask_ocean,
        )
    }

    /// Net surface radiation: `(rlds - rlus) + (rsds - rsus)`, derived once
    /// upstream of all selection and aggregation, then run through the
    /// basic pipeline like any other variable.
    fn compute_net_radiation(
        &self,
        infile: &Path,
        variables: &[String],
        cache: &DiagnosticCache,
        params: &DiagnosticParams,
    ) -> DiagResult<Diagnostic> {
        if variables != &RNET_CONSTITUENTS {
            return Err(DiagnosticError::InvalidDerivation(format!(
                "rnet requires the constituents {:?}, got {:?}",
                RNET_CONSTITUENTS, variables
            )));
        }

        let tmpfile = cache.dir().join(
            infile
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
                .replace(&variables[0], "rnet"),
        );
        self.calculate_net_radiation(infile, variables, &tmpfile, "rnet")?;

        let outfile = cache.path_for(&self.key(&tmpfile, "rnet", params));
        self.compute_basic(&tmpfile, "rnet", Some(&outfile), params)
    }

    fn calculate_net_radiation(
        &self,
        infile: &Path,
        variables: &[String],
        outname: &Path,
        diagn: &str,
    ) -> DiagResult<()> {
        let rlds = self.store.read(infile, &variables[0])?;
        let mut rest = Vec::with_capacity(3);
        for varn in &variables[1..] {
            let path = self.paths.companion(infile, &variables[0], varn);
            let field = self.store.read(&path, varn)?;
            if field.values.dim() != rlds.values.dim() {
                return Err(DiagnosticError::Error(format!(
                    "constituent {} has shape {:?}, {} has {:?}",
                    varn,
                    field.values.dim(),
                    variables[0],
                    rlds.values.dim()
                )));
            }
            rest.push(field);
        }
        let (rlus, rsds, rsus) = (&rest[0], &rest[1], &rest[2]);

        let values = (&rlds.values - &rlus.values) + (&rsds.values - &rsus.values);
        let meta = Metadata {
            units: rlds.meta.units.clone(),
            long_name: Some("Surface Downwelling Net Radiation".to_string()),
            standard_name: Some("surface_downwelling_net_flux_in_air".to_string()),
            fill_value: Some(rlds.meta.fill_value.unwrap_or(DEFAULT_FILL_VALUE)),
            encoding: rlds.meta.encoding.clone(),
        };
        let field = Field::new(values, rlds.time.clone(), rlds.lat.clone(), rlds.lon.clone(), meta);
        self.store.write(&Diagnostic::Series(field), diagn, outname)
    }

    /// Per-cell Pearson correlation of two basic diagnostics over time.
    fn compute_correlation(
        &self,
        infile: &Path,
        name: &str,
        variables: &[String],
        cache: &DiagnosticCache,
        params: &DiagnosticParams,
    ) -> DiagResult<Diagnostic> {
        if variables.len() != 2 {
            return Err(DiagnosticError::InvalidDerivation(
                "can only correlate two variables".to_string(),
            ));
        }
        if variables[0] == variables[1] {
            return Err(DiagnosticError::InvalidDerivation(
                "can not correlate same variables".to_string(),
            ));
        }

        let outfile1 = cache.path_for(&self.key(infile, &variables[0], params));
        let d1 = self.compute_basic(infile, &variables[0], Some(&outfile1), params)?;

        let infile2 = self.paths.companion(infile, &variables[0], &variables[1]);
        let outfile2 = cache.path_for(&self.key(&infile2, &variables[1], params));
        let d2 = self.compute_basic(&infile2, &variables[1], Some(&outfile2), params)?;

        let (f1, f2) = match (&d1, &d2) {
            (Diagnostic::Series(f1), Diagnostic::Series(f2)) => (f1, f2),
            _ => {
                return Err(DiagnosticError::InvalidDerivation(
                    "correlation inputs must still be time-resolved".to_string(),
                ))
            }
        };
        if f1.time != f2.time {
            return Err(DiagnosticError::InvalidDerivation(format!(
                "time axes of {} and {} differ",
                variables[0], variables[1]
            )));
        }
        if f1.len_time() < MIN_CORR_SAMPLES {
            return Err(DiagnosticError::InvalidDerivation(format!(
                "correlation needs at least {} timesteps, got {}",
                MIN_CORR_SAMPLES,
                f1.len_time()
            )));
        }

        let values = reduce::map_series_pair(&f1.values, &f2.values, stats::pearson);
        let meta = Metadata {
            units: Some("1".to_string()),
            ..Metadata::default()
        };
        let map = FieldMap::new(values, f1.lat.clone(), f1.lon.clone(), meta);
        let diagnostic = Diagnostic::Map(map);

        // Reuse the first variable's output-name template with the
        // diagnostic's name substituted in.
        let outfile3 = outfile1.with_file_name(
            outfile1
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
                .replacen(&format!("{}_", variables[0]), &format!("{}_", name), 1),
        );
        self.store.write(&diagnostic, name, &outfile3)?;
        Ok(diagnostic)
    }
}
