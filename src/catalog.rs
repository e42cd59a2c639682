//! Importable files waiting in the upload directory.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    cache::TtlCache,
    error::{ImportError, Result},
};

const IMPORTABLE_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

pub struct FileCatalog {
    dir: PathBuf,
    cache: TtlCache<PathBuf, Arc<Vec<CatalogEntry>>>,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>, cache: TtlCache<PathBuf, Arc<Vec<CatalogEntry>>>) -> Self {
        FileCatalog {
            dir: dir.into(),
            cache,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Importable files sorted by name. Served from cache while fresh.
    pub fn list(&self) -> Result<Arc<Vec<CatalogEntry>>> {
        self.cache
            .get_or_try_insert_with(self.dir.clone(), || self.scan().map(Arc::new))
    }

    pub fn refresh(&self) {
        self.cache.invalidate(&self.dir);
    }

    /// Turns a file reference into a path: an existing path is used as is,
    /// otherwise the name is looked up in the catalog.
    pub fn resolve(&self, file_ref: &str) -> Result<PathBuf> {
        let direct = Path::new(file_ref);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        self.list()?
            .iter()
            .find(|entry| entry.name == file_ref)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| ImportError::FileNotFound {
                path: self.dir.join(file_ref),
            })
    }

    fn scan(&self) -> Result<Vec<CatalogEntry>> {
        let io_error = |source| ImportError::Io {
            path: self.dir.clone(),
            source,
        };
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(err)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error)?;
            let path = entry.path();
            let importable = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMPORTABLE_EXTENSIONS
                        .iter()
                        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                });
            if !importable {
                continue;
            }
            let metadata = entry.metadata().map_err(io_error)?;
            if !metadata.is_file() {
                continue;
            }
            files.push(CatalogEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}
