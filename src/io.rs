//! Storage and regridding collaborator contracts.
//!
//! The diagnostic core never touches file formats directly. A [`GridStore`]
//! reads variable fields and round-trips diagnostics (including coordinate
//! metadata, attributes, and the opaque encoding bag); a [`Regridder`]
//! remaps an input file onto the fixed grid before the pipeline opens it.
//!
//! [`MemoryStore`] is a process-local implementation used by the test suite
//! and by single-process pipelines that do not need durable output.

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::{Diagnostic, Field};
use crate::grid::GridSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Durable storage for fields and computed diagnostics.
pub trait GridStore {
    /// Read a time-resolved variable field.
    fn read(&self, path: &Path, varn: &str) -> DiagResult<Field>;

    /// Read a previously persisted diagnostic of any shape.
    fn read_diagnostic(&self, path: &Path, varn: &str) -> DiagResult<Diagnostic>;

    /// Persist a diagnostic, replacing any existing entry wholesale.
    fn write(&self, diagnostic: &Diagnostic, varn: &str, path: &Path) -> DiagResult<()>;

    /// Whether a diagnostic already exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// Bilinear remapping of an input file onto a target grid.
pub trait Regridder {
    /// Remap `input` onto `target`, returning the path of the remapped file.
    /// The output must be on the exact target grid, float64 precision.
    fn remap_bilinear(&self, input: &Path, target: &GridSpec) -> DiagResult<PathBuf>;
}

/// In-memory [`GridStore`] keyed by path.
///
/// Entries are whole diagnostics tagged with their variable name; writes
/// replace entries wholesale, mirroring the cache lifecycle on durable
/// storage. The write counter lets tests observe whether a result was
/// recomputed or served from cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PathBuf, (String, Diagnostic)>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an input field.
    pub fn insert_field(&self, path: impl Into<PathBuf>, varn: &str, field: Field) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(path.into(), (varn.to_string(), Diagnostic::Series(field)));
    }

    /// Number of writes performed through [`GridStore::write`].
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn fetch(&self, path: &Path, varn: &str) -> DiagResult<Diagnostic> {
        let entries = self.entries.lock().expect("store lock poisoned");
        let (stored_varn, diagnostic) = entries
            .get(path)
            .ok_or_else(|| DiagnosticError::Error(format!("no entry at {}", path.display())))?;
        if stored_varn != varn {
            return Err(DiagnosticError::Error(format!(
                "entry at {} holds {}, requested {}",
                path.display(),
                stored_varn,
                varn
            )));
        }
        Ok(diagnostic.clone())
    }
}

impl GridStore for MemoryStore {
    fn read(&self, path: &Path, varn: &str) -> DiagResult<Field> {
        match self.fetch(path, varn)? {
            Diagnostic::Series(field) => Ok(field),
            _ => Err(DiagnosticError::Error(format!(
                "entry at {} is not time-resolved",
                path.display()
            ))),
        }
    }

    fn read_diagnostic(&self, path: &Path, varn: &str) -> DiagResult<Diagnostic> {
        self.fetch(path, varn)
    }

    fn write(&self, diagnostic: &Diagnostic, varn: &str, path: &Path) -> DiagResult<()> {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(path.to_path_buf(), (varn.to_string(), diagnostic.clone()));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;

    #[test]
    fn store_round_trip() {
        let store = MemoryStore::new();
        let field = testdata::uniform_field(3.0, testdata::monthly_time_axis(2000, 1));
        store.insert_field("in/tas.nc", "tas", field.clone());

        assert!(store.exists(Path::new("in/tas.nc")));
        assert!(!store.exists(Path::new("in/pr.nc")));

        let back = store.read(Path::new("in/tas.nc"), "tas").unwrap();
        assert_eq!(back.values, field.values);
        assert_eq!(back.time, field.time);
    }

    #[test]
    fn variable_mismatch_is_an_error() {
        let store = MemoryStore::new();
        let field = testdata::uniform_field(3.0, testdata::monthly_time_axis(2000, 1));
        store.insert_field("in/tas.nc", "tas", field);
        assert!(store.read(Path::new("in/tas.nc"), "pr").is_err());
    }

    #[test]
    fn writes_replace_and_are_counted() {
        let store = MemoryStore::new();
        let field = testdata::uniform_field(1.0, testdata::monthly_time_axis(2000, 1));
        let diag = Diagnostic::Series(field);
        store.write(&diag, "tas", Path::new("out.nc")).unwrap();
        store.write(&diag, "tas", Path::new("out.nc")).unwrap();
        assert_eq!(store.write_count(), 2);
        assert!(store.exists(Path::new("out.nc")));
    }

    #[test]
    fn reading_a_map_as_a_field_fails() {
        let store = MemoryStore::new();
        let field = testdata::uniform_field(1.0, testdata::monthly_time_axis(2000, 1));
        let map = crate::field::FieldMap::new(
            field.values.index_axis(ndarray::Axis(0), 0).to_owned(),
            field.lat.clone(),
            field.lon.clone(),
            field.meta.clone(),
        );
        store
            .write(&Diagnostic::Map(map), "tas", Path::new("clim.nc"))
            .unwrap();
        assert!(store.read(Path::new("clim.nc"), "tas").is_err());
        assert!(store
            .read_diagnostic(Path::new("clim.nc"), "tas")
            .unwrap()
            .as_map()
            .is_some());
    }
}
