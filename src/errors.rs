use std::path::PathBuf;
use thiserror::Error;

/// Error type for invalid diagnostic requests and failed computations.
///
/// Every variant carries the offending token (variable, unit, region, season)
/// so a misconfigured request can be diagnosed from the message alone.
#[derive(Error, Debug)]
pub enum DiagnosticError {
    #[error("{0}")]
    Error(String),
    #[error("{axis} coordinates do not match the fixed 2.5 degree global grid: {detail}")]
    GridMismatch { axis: &'static str, detail: String },
    #[error("Unit {unit} not covered for {variable}")]
    UnsupportedUnit { unit: String, variable: String },
    #[error("{0} is not a valid regionfile")]
    UnknownRegionFile(PathBuf),
    #[error("Wrong region geometry in {path}: {reason}")]
    InvalidRegionGeometry { path: PathBuf, reason: String },
    #[error("{0} is not a known region")]
    UnknownRegion(String),
    #[error("All grid points masked! Wrong masking settings?")]
    EmptyRegion,
    #[error("season={0} is not supported")]
    UnsupportedSeason(String),
    #[error("time_aggregation={0} is not supported")]
    UnsupportedAggregation(String),
    #[error("invalid derivation spec: {0}")]
    InvalidDerivation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type for `Result<T, DiagnosticError>`.
pub type DiagResult<T> = Result<T, DiagnosticError>;
