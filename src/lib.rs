//! Standardized climate diagnostics from gridded model and observation
//! output.
//!
//! The pipeline takes one variable field on the fixed 2.5° global grid and
//! produces a reduced diagnostic (climatology, trend, detrended
//! variability, monthly cycle, or cross-variable correlation) restricted
//! to a time window, meteorological season, and spatial region, with units
//! normalized to fixed conventions. See [`diagnostics`] for the public
//! operations and [`io`] for the collaborator contracts.

pub mod cache;
pub mod diagnostics;
pub mod errors;
pub mod field;
pub mod grid;
pub mod io;
pub mod reduce;
pub mod region;
pub mod select;
pub mod stats;
pub mod testdata;
pub mod time;
pub mod units;
