//! Load-once store of canonical tables.
//!
//! A table is a pure function of the source bytes, so it is cached per
//! (path, modification time, length) and shared behind an `Arc`. Failed
//! loads are never cached.

use crate::aggregate::apply_filter;
use crate::error::LoadError;
use crate::loader::load_raw;
use crate::normalize::{normalize, QualityReport};
use crate::schema::Schema;
use crate::types::{CanonicalTable, FilterPredicate, FilteredView};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// A normalized source and how it was read.
#[derive(Debug)]
pub struct Dataset {
    pub source: PathBuf,
    pub encoding: &'static str,
    pub delimiter: u8,
    pub table: CanonicalTable,
    pub quality: QualityReport,
}

impl Dataset {
    pub fn view(&self, predicate: &FilterPredicate) -> FilteredView<'_> {
        apply_filter(&self.table, predicate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SourceKey {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
}

pub struct Repository {
    schema: Schema,
    cache: HashMap<SourceKey, Arc<Dataset>>,
    current: Option<Arc<Dataset>>,
}

impl Repository {
    pub fn new(schema: Schema) -> Self {
        Repository {
            schema,
            cache: HashMap::new(),
            current: None,
        }
    }

    /// Load and normalize `path`, or return the cached table if the file
    /// has not changed. The result becomes the current dataset.
    pub fn load(&mut self, path: &Path) -> Result<Arc<Dataset>, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(io_err)?;
        let key = SourceKey {
            path: fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
            modified: meta.modified().ok(),
            len: meta.len(),
        };

        if let Some(dataset) = self.cache.get(&key) {
            debug!(path = %path.display(), "canonical table served from cache");
            self.current = Some(Arc::clone(dataset));
            return Ok(Arc::clone(dataset));
        }

        let raw = load_raw(path)?;
        let (table, quality) = normalize(&raw, &self.schema);
        let dataset = Arc::new(Dataset {
            source: path.to_path_buf(),
            encoding: raw.encoding,
            delimiter: raw.delimiter,
            table,
            quality,
        });
        self.cache.insert(key, Arc::clone(&dataset));
        self.current = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn current(&self) -> Option<Arc<Dataset>> {
        self.current.clone()
    }

    pub fn cached_sources(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn second_load_hits_cache() {
        let file = csv_file("Région;Total interventions\nBretagne;10\n");
        let mut repo = Repository::new(Schema::default());
        let first = repo.load(file.path()).unwrap();
        let second = repo.load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.cached_sources(), 1);
        assert!(Arc::ptr_eq(&repo.current().unwrap(), &first));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let file = csv_file("one column only\nvalue\n");
        let mut repo = Repository::new(Schema::default());
        let err = repo.load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));
        assert_eq!(repo.cached_sources(), 0);
        assert!(repo.current().is_none());
    }

    #[test]
    fn view_applies_predicate() {
        let file = csv_file("Région;Total interventions\nBretagne;10\nCorse;5\n");
        let mut repo = Repository::new(Schema::default());
        let dataset = repo.load(file.path()).unwrap();
        let p = FilterPredicate::from_selection(Some("Corse"), None, None);
        let view = dataset.view(&p);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].counts.total_interventions, 5.0);
    }
}
