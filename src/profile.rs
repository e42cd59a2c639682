//! Mapping profiles: which source column feeds each canonical field.
//!
//! A profile is either saved by an administrator (one YAML file per profile
//! in a [`ProfileStore`]) or synthesized from the synonym dictionary when no
//! saved profile matches a file. Candidate lists are resolved in candidate
//! order, so a dictionary's declared priority beats the file's column order.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Duration;
use heck::ToSnakeCase;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cache::TtlCache,
    error::{ImportError, Result},
    fingerprint::HeaderFingerprint,
    synonyms::SynonymDictionary,
};

pub const DEFAULT_PROFILE_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAssignment {
    /// Exactly this header spelling.
    Column(String),
    /// The first of these spellings that the file contains.
    Candidates(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    #[serde(flatten)]
    pub source: FieldAssignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<HeaderFingerprint>,
    pub fields: Vec<FieldMapping>,
}

/// Column assignments for one header set, computed once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnResolution {
    pub resolved: Vec<(String, usize)>,
    pub unresolved: Vec<String>,
}

impl ColumnResolution {
    pub fn column_for(&self, field: &str) -> Option<usize> {
        self.resolved
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, idx)| *idx)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSelector {
    /// Saved profile for the file's fingerprint, else the dictionary.
    #[default]
    Auto,
    /// This saved profile when it exists, else as [`ProfileSelector::Auto`].
    Explicit(String),
}

impl ProfileSelector {
    pub fn from_option(id: Option<&str>) -> Self {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ProfileSelector::Explicit(id.to_string()),
            None => ProfileSelector::Auto,
        }
    }

    pub fn explicit_id(&self) -> Option<&str> {
        match self {
            ProfileSelector::Auto => None,
            ProfileSelector::Explicit(id) => Some(id),
        }
    }
}

impl MappingProfile {
    /// A profile whose every field accepts all of its dictionary spellings.
    pub fn synthesize(dictionary: &SynonymDictionary) -> Self {
        let fields = dictionary
            .entries()
            .iter()
            .map(|entry| FieldMapping {
                field: entry.name.clone(),
                source: FieldAssignment::Candidates(entry.synonyms.clone()),
            })
            .collect();
        MappingProfile {
            id: DEFAULT_PROFILE_ID.to_string(),
            name: Some("Synonym dictionary".to_string()),
            fingerprint: None,
            fields,
        }
    }

    /// Freezes a resolution into a saved per-dealer profile bound to `headers`.
    pub fn from_resolution(
        id: &str,
        name: Option<String>,
        headers: &[String],
        resolution: &ColumnResolution,
    ) -> Self {
        let fields = resolution
            .resolved
            .iter()
            .filter_map(|(field, idx)| {
                headers.get(*idx).map(|header| FieldMapping {
                    field: field.clone(),
                    source: FieldAssignment::Column(header.clone()),
                })
            })
            .collect();
        MappingProfile {
            id: id.to_string(),
            name,
            fingerprint: Some(HeaderFingerprint::compute(headers)),
            fields,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.id == DEFAULT_PROFILE_ID && self.fingerprint.is_none()
    }

    pub fn mapping(&self, field: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|mapping| mapping.field == field)
    }

    pub fn assign_column(&self, field: &str, headers: &[String]) -> Option<usize> {
        self.mapping(field)
            .and_then(|mapping| position_for(&mapping.source, headers))
    }

    pub fn resolve_columns(&self, headers: &[String]) -> ColumnResolution {
        let mut resolution = ColumnResolution::default();
        for mapping in &self.fields {
            match position_for(&mapping.source, headers) {
                Some(idx) => resolution.resolved.push((mapping.field.clone(), idx)),
                None => resolution.unresolved.push(mapping.field.clone()),
            }
        }
        resolution
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ImportError::Profile {
                id: self.id.clone(),
                message: "profile id cannot be empty".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for mapping in &self.fields {
            if mapping.field.trim().is_empty() {
                return Err(ImportError::Profile {
                    id: self.id.clone(),
                    message: "field name cannot be empty".to_string(),
                });
            }
            if !seen.insert(mapping.field.as_str()) {
                return Err(ImportError::Profile {
                    id: self.id.clone(),
                    message: format!("field '{}' is mapped more than once", mapping.field),
                });
            }
        }
        Ok(())
    }
}

fn position_for(source: &FieldAssignment, headers: &[String]) -> Option<usize> {
    match source {
        FieldAssignment::Column(name) => headers.iter().position(|h| h == name),
        FieldAssignment::Candidates(candidates) => candidates
            .iter()
            .find_map(|candidate| headers.iter().position(|h| h == candidate)),
    }
}

/// Saved profiles, one `<id>.yaml` file each, under a single directory.
pub struct ProfileStore {
    dir: PathBuf,
    catalog: TtlCache<PathBuf, Arc<Vec<MappingProfile>>>,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        ProfileStore {
            dir: dir.into(),
            catalog: TtlCache::with_system_clock(ttl),
        }
    }

    pub fn with_cache(
        dir: impl Into<PathBuf>,
        catalog: TtlCache<PathBuf, Arc<Vec<MappingProfile>>>,
    ) -> Self {
        ProfileStore {
            dir: dir.into(),
            catalog,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let stem = id.to_snake_case();
        if stem.is_empty() {
            return Err(ImportError::Profile {
                id: id.to_string(),
                message: "id needs at least one letter or digit to name its file".into(),
            });
        }
        Ok(self.dir.join(format!("{stem}.yaml")))
    }

    /// Writes `profile` to `<snake_case id>.yaml`. Resaving the same id
    /// replaces the file; a different id that maps to the same file name is
    /// refused.
    pub fn save(&self, profile: &MappingProfile) -> Result<PathBuf> {
        profile.validate()?;
        let path = self.path_for(&profile.id)?;
        if path.is_file() {
            let existing = Self::load_file(&path)?;
            if existing.id != profile.id {
                return Err(ImportError::Profile {
                    id: profile.id.clone(),
                    message: format!(
                        "{} already holds profile '{}'",
                        path.display(),
                        existing.id
                    ),
                });
            }
        }
        fs::create_dir_all(&self.dir).map_err(|source| ImportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| ImportError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::to_writer(file, profile)?;
        self.catalog.invalidate(&self.dir);
        debug!("Saved mapping profile '{}' to {:?}", profile.id, path);
        Ok(path)
    }

    pub fn load_file(path: &Path) -> Result<MappingProfile> {
        let file = File::open(path).map_err(|err| ImportError::from_open(path, err))?;
        let profile: MappingProfile = serde_yaml::from_reader(BufReader::new(file))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Every saved profile, sorted by id. A missing directory holds none.
    pub fn list(&self) -> Result<Arc<Vec<MappingProfile>>> {
        self.catalog
            .get_or_try_insert_with(self.dir.clone(), || self.scan().map(Arc::new))
    }

    fn scan(&self) -> Result<Vec<MappingProfile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ImportError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };
        let mut profiles = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ImportError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
            if is_yaml {
                profiles.push(Self::load_file(&path)?);
            }
        }
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    pub fn find(&self, id: &str) -> Result<Option<MappingProfile>> {
        Ok(self.list()?.iter().find(|p| p.id == id).cloned())
    }

    pub fn get(&self, id: &str) -> Result<MappingProfile> {
        self.find(id)?.ok_or_else(|| ImportError::ProfileNotFound { id: id.to_string() })
    }

    pub fn find_by_fingerprint(
        &self,
        fingerprint: &HeaderFingerprint,
    ) -> Result<Option<MappingProfile>> {
        Ok(self
            .list()?
            .iter()
            .find(|p| p.fingerprint.as_ref() == Some(fingerprint))
            .cloned())
    }
}

/// Chooses the profile for a file: explicit id, then fingerprint, then the
/// dictionary.
pub struct ProfileResolver<'a> {
    dictionary: &'a SynonymDictionary,
    store: Option<&'a ProfileStore>,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(dictionary: &'a SynonymDictionary, store: Option<&'a ProfileStore>) -> Self {
        ProfileResolver { dictionary, store }
    }

    pub fn resolve(
        &self,
        fingerprint: &HeaderFingerprint,
        explicit_id: Option<&str>,
    ) -> Result<MappingProfile> {
        if let Some(store) = self.store {
            if let Some(id) = explicit_id {
                match store.find(id)? {
                    Some(profile) => {
                        debug!("Using explicitly selected profile '{id}'");
                        return Ok(profile);
                    }
                    None => warn!("Mapping profile '{id}' not found; matching by fingerprint"),
                }
            }
            if let Some(profile) = store.find_by_fingerprint(fingerprint)? {
                debug!(
                    "Profile '{}' matches fingerprint {}",
                    profile.id,
                    fingerprint.short()
                );
                return Ok(profile);
            }
        } else if let Some(id) = explicit_id {
            warn!("No profile directory configured; ignoring profile '{id}'");
        }
        debug!(
            "No saved profile for fingerprint {}; using the synonym dictionary",
            fingerprint.short()
        );
        Ok(MappingProfile::synthesize(self.dictionary))
    }

    pub fn resolve_selector(
        &self,
        fingerprint: &HeaderFingerprint,
        selector: &ProfileSelector,
    ) -> Result<MappingProfile> {
        self.resolve(fingerprint, selector.explicit_id())
    }
}
