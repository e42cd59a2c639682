//! Batch import of dealer feeds into a [`RecordStore`].
//!
//! The importer keeps nothing between calls. [`BatchImporter::start_session`]
//! hands the caller an [`ImportSession`] token; every
//! [`BatchImporter::process_batch`] call re-reads the header, re-resolves the
//! profile and works on one window of rows. Progress lives with the caller,
//! which advances the offset until the session reports completion.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    fingerprint::HeaderFingerprint,
    mapper::RowMapper,
    profile::{ColumnResolution, MappingProfile, ProfileResolver, ProfileSelector, ProfileStore},
    reader::{FileInfo, FileReader, ReaderOptions},
    record::VehicleRecord,
    store::{RecordId, RecordStore, StoreResult},
    synonyms::{KEY_FIELD, SynonymDictionary},
};

static VIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-HJ-NPR-Z0-9]{17}$").expect("valid VIN pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    SessionStarted,
    Processing,
    Completed,
}

impl ImportState {
    pub fn of(session: Option<&ImportSession>) -> Self {
        session.map_or(ImportState::Idle, ImportSession::state)
    }
}

/// Caller-held progress for one file + profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: Uuid,
    pub file: PathBuf,
    pub selector: ProfileSelector,
    pub profile_id: String,
    pub fingerprint: HeaderFingerprint,
    pub total_rows: usize,
    pub offset: usize,
    pub batches: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
}

impl ImportSession {
    pub fn state(&self) -> ImportState {
        if self.is_complete() {
            ImportState::Completed
        } else if self.batches == 0 {
            ImportState::SessionStarted
        } else {
            ImportState::Processing
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total_rows
    }

    pub fn remaining(&self) -> usize {
        self.total_rows.saturating_sub(self.offset)
    }

    /// Folds a batch outcome into the token. A batch that read nothing means
    /// the file ended early, which also completes the session.
    pub fn advance(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.added += outcome.added;
        self.updated += outcome.updated;
        self.skipped += outcome.skipped;
        if outcome.processed == 0 {
            self.offset = self.offset.max(self.total_rows);
        } else {
            self.offset = outcome.offset + outcome.processed;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub offset: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub processed: usize,
    /// Canonical fields with no matching column in this file.
    pub unresolved: Vec<String>,
}

impl BatchOutcome {
    pub fn next_offset(&self) -> usize {
        self.offset + self.processed
    }
}

/// Everything the importer derives from a file before touching rows.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub headers: Vec<String>,
    pub fingerprint: HeaderFingerprint,
    pub profile: MappingProfile,
    pub resolution: ColumnResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Created(RecordId),
    Updated(RecordId),
}

pub struct BatchImporter<S> {
    store: S,
    dictionary: Arc<SynonymDictionary>,
    profiles: Option<ProfileStore>,
    reader_options: ReaderOptions,
}

impl<S: RecordStore> BatchImporter<S> {
    pub fn new(store: S) -> Self {
        BatchImporter {
            store,
            dictionary: Arc::new(SynonymDictionary::default_dictionary().clone()),
            profiles: None,
            reader_options: ReaderOptions::default(),
        }
    }

    pub fn with_dictionary(mut self, dictionary: Arc<SynonymDictionary>) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileStore) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_reader_options(mut self, options: ReaderOptions) -> Self {
        self.reader_options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn dictionary(&self) -> &SynonymDictionary {
        &self.dictionary
    }

    pub fn profiles(&self) -> Option<&ProfileStore> {
        self.profiles.as_ref()
    }

    fn reader(&self, file: &Path) -> FileReader {
        FileReader::new(file, self.reader_options)
    }

    fn resolve_with(&self, reader: &FileReader, selector: &ProfileSelector) -> Result<ResolvedFile> {
        let headers = reader.read_header()?;
        let fingerprint = HeaderFingerprint::compute(&headers);
        let profile = ProfileResolver::new(&self.dictionary, self.profiles.as_ref())
            .resolve_selector(&fingerprint, selector)?;
        let resolution = profile.resolve_columns(&headers);
        Ok(ResolvedFile {
            headers,
            fingerprint,
            profile,
            resolution,
        })
    }

    /// Header, fingerprint, profile and column assignments for `file`.
    pub fn resolve(&self, file: &Path, selector: &ProfileSelector) -> Result<ResolvedFile> {
        self.resolve_with(&self.reader(file), selector)
    }

    pub fn file_info(&self, file: &Path) -> Result<FileInfo> {
        self.reader(file).file_info()
    }

    pub fn start_session(&self, file: &Path, selector: &ProfileSelector) -> Result<ImportSession> {
        let reader = self.reader(file);
        let resolved = self.resolve_with(&reader, selector)?;
        let total_rows = reader.row_count()?;
        info!(
            "Import of {:?}: {} data row(s), profile '{}', fingerprint {}, {} of {} field(s) resolved",
            file,
            total_rows,
            resolved.profile.id,
            resolved.fingerprint.short(),
            resolved.resolution.resolved.len(),
            resolved.profile.fields.len()
        );
        Ok(ImportSession {
            id: Uuid::new_v4(),
            file: file.to_path_buf(),
            selector: selector.clone(),
            profile_id: resolved.profile.id,
            fingerprint: resolved.fingerprint,
            total_rows,
            offset: 0,
            batches: 0,
            added: 0,
            updated: 0,
            skipped: 0,
            started_at: Utc::now(),
        })
    }

    /// Imports up to `limit` data rows starting at data-row `offset`.
    ///
    /// Row-level storage rejections are counted as skipped. Only a missing
    /// or unreadable file, or a store that is unavailable, fails the call;
    /// retrying the same window is safe because upserts are keyed by VIN.
    pub fn process_batch(
        &self,
        file: &Path,
        offset: usize,
        limit: usize,
        selector: &ProfileSelector,
    ) -> Result<BatchOutcome> {
        let reader = self.reader(file);
        let resolved = self.resolve_with(&reader, selector)?;
        let mapper = RowMapper::new(&resolved.profile, &resolved.headers);
        if !mapper.unresolved().is_empty() {
            debug!(
                "{} field(s) have no column in {:?}: {}",
                mapper.unresolved().len(),
                file,
                mapper.unresolved().join(", ")
            );
        }

        let rows = reader.read_batch(offset, limit)?;
        let mut outcome = BatchOutcome {
            offset,
            unresolved: mapper.unresolved().to_vec(),
            ..BatchOutcome::default()
        };
        for (idx, row) in rows.iter().enumerate() {
            let record = mapper.map_row(row);
            match self.upsert(&record) {
                Ok(Upsert::Created(id)) => {
                    debug!("Created record {id} for data row {}", offset + idx + 1);
                    outcome.added += 1;
                }
                Ok(Upsert::Updated(id)) => {
                    debug!("Updated record {id} for data row {}", offset + idx + 1);
                    outcome.updated += 1;
                }
                Err(err) if err.is_row_level() => {
                    warn!("Skipping data row {}: {err}", offset + idx + 1);
                    outcome.skipped += 1;
                }
                Err(err) => return Err(err.into()),
            }
            outcome.processed += 1;
        }
        self.store.flush()?;

        info!(
            "Batch at offset {} of {:?}: {} added, {} updated, {} skipped",
            offset, file, outcome.added, outcome.updated, outcome.skipped
        );
        Ok(outcome)
    }

    fn upsert(&self, record: &VehicleRecord) -> StoreResult<Upsert> {
        let title = record.display_title();
        let existing = match record.vin() {
            Some(vin) => {
                if !VIN_PATTERN.is_match(vin) {
                    debug!("VIN '{vin}' does not look like a 17-character VIN");
                }
                self.store.find_by_key(KEY_FIELD, vin)?
            }
            None => None,
        };

        let action = match existing {
            Some(found) => {
                self.store.update(found.id, &title)?;
                Upsert::Updated(found.id)
            }
            None => Upsert::Created(self.store.create(&title)?),
        };
        let id = match action {
            Upsert::Created(id) | Upsert::Updated(id) => id,
        };

        let written = self.write_fields(id, record);
        if let (Err(err), Upsert::Created(id)) = (&written, action) {
            warn!(
                "Record {id} was created for VIN {:?} but its fields were not written ({err}); reconcile or remove it",
                record.vin().unwrap_or("")
            );
        }
        written.map(|()| action)
    }

    fn write_fields(&self, id: RecordId, record: &VehicleRecord) -> StoreResult<()> {
        let attributes = record.attributes();
        if !attributes.is_empty() {
            self.store.set_attributes(id, &attributes)?;
        }
        let categories = record.categories();
        if !categories.is_empty() {
            self.store.set_categories(id, &categories)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicBool, Ordering},
    };

    use super::*;
    use crate::{
        record::AttributeValue,
        store::{MemoryStore, RecordFilter, StoreError, StoredRecord},
    };

    fn write_feed(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).expect("write feed");
        path
    }

    #[test]
    fn scenario_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(
            &dir,
            "feed.csv",
            "Year,Make,Model,VIN\n2020,Ford,Escape,1FMCU0F70LUB12345\n",
        );
        let importer = BatchImporter::new(MemoryStore::new());
        let selector = ProfileSelector::Auto;

        let session = importer.start_session(&feed, &selector).unwrap();
        assert_eq!(session.total_rows, 1);
        assert_eq!(session.state(), ImportState::SessionStarted);

        let first = importer.process_batch(&feed, 0, 10, &selector).unwrap();
        assert_eq!((first.added, first.updated, first.processed), (1, 0, 1));

        let second = importer.process_batch(&feed, 0, 10, &selector).unwrap();
        assert_eq!((second.added, second.updated), (0, 1));
        assert_eq!(importer.store().len(), 1);

        let stored = importer
            .store()
            .find_by_key("vin", "1FMCU0F70LUB12345")
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "2020 Ford Escape");
        assert_eq!(stored.categories["year"], "2020");
        assert_eq!(stored.categories["model"], "Escape");
        assert!(!stored.categories.contains_key("trim"));
    }

    #[test]
    fn blank_vin_rows_always_create() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(&dir, "feed.csv", "VIN,Make\n,Ford\n,Ford\n");
        let importer = BatchImporter::new(MemoryStore::new());
        let outcome = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(outcome.added, 2);
        let again = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(again.added, 2);
        assert_eq!(importer.store().len(), 4);
    }

    #[test]
    fn session_advances_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(&dir, "feed.csv", "VIN\nA\nB\nC\n");
        let importer = BatchImporter::new(MemoryStore::new());
        let mut session = importer
            .start_session(&feed, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(ImportState::of(None), ImportState::Idle);
        while !session.is_complete() {
            let outcome = importer
                .process_batch(&feed, session.offset, 2, &session.selector)
                .unwrap();
            session.advance(&outcome);
            if !session.is_complete() {
                assert_eq!(session.state(), ImportState::Processing);
            }
        }
        assert_eq!(session.batches, 2);
        assert_eq!(session.added, 3);
        assert_eq!(ImportState::of(Some(&session)), ImportState::Completed);
    }

    #[test]
    fn empty_feed_session_is_already_complete() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(&dir, "feed.csv", "VIN,Make\n");
        let importer = BatchImporter::new(MemoryStore::new());
        let session = importer
            .start_session(&feed, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(session.total_rows, 0);
        assert_eq!(session.state(), ImportState::Completed);
    }

    #[test]
    fn missing_file_aborts_start() {
        let importer = BatchImporter::new(MemoryStore::new());
        let err = importer
            .start_session(Path::new("/no/such/feed.csv"), &ProfileSelector::Auto)
            .unwrap_err();
        assert!(err.is_file_not_found());
        assert!(importer.store().is_empty());
    }

    /// Rejects creates for one title and attribute writes that fill one
    /// field. Can be switched offline.
    struct FlakyStore {
        inner: MemoryStore,
        reject_title: &'static str,
        reject_attribute: &'static str,
        offline: AtomicBool,
    }

    impl RecordStore for FlakyStore {
        fn find_by_key(&self, field: &str, value: &str) -> StoreResult<Option<StoredRecord>> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable {
                    message: "database offline".into(),
                });
            }
            self.inner.find_by_key(field, value)
        }

        fn create(&self, title: &str) -> StoreResult<RecordId> {
            if title == self.reject_title {
                return Err(StoreError::Rejected {
                    reason: "title blocked".into(),
                });
            }
            self.inner.create(title)
        }

        fn update(&self, id: RecordId, title: &str) -> StoreResult<()> {
            self.inner.update(id, title)
        }

        fn set_attributes(
            &self,
            id: RecordId,
            attributes: &BTreeMap<String, AttributeValue>,
        ) -> StoreResult<()> {
            let blocked = attributes
                .get(self.reject_attribute)
                .is_some_and(|value| *value != AttributeValue::from(""));
            if blocked {
                return Err(StoreError::Rejected {
                    reason: format!("{} not accepted", self.reject_attribute),
                });
            }
            self.inner.set_attributes(id, attributes)
        }

        fn set_categories(
            &self,
            id: RecordId,
            categories: &BTreeMap<String, String>,
        ) -> StoreResult<()> {
            self.inner.set_categories(id, categories)
        }

        fn list_all(&self, filter: Option<&RecordFilter>) -> StoreResult<Vec<StoredRecord>> {
            self.inner.list_all(filter)
        }
    }

    #[test]
    fn rejected_rows_are_skipped_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(
            &dir,
            "feed.csv",
            "VIN,Make,Model\nV1,Ford,Focus\nV2,Bad,Row\nV3,Kia,Rio\n",
        );
        let importer = BatchImporter::new(FlakyStore {
            inner: MemoryStore::new(),
            reject_title: "Bad Row",
            reject_attribute: "",
            offline: AtomicBool::new(false),
        });
        let outcome = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.processed, 3);
    }

    #[test]
    fn rejected_attributes_leave_a_reconcilable_record() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(
            &dir,
            "feed.csv",
            "VIN,Make,Model,Exterior Color\nV1,Ford,Focus,Red\nV2,Kia,Rio,\n",
        );
        let importer = BatchImporter::new(FlakyStore {
            inner: MemoryStore::new(),
            reject_title: "",
            reject_attribute: "exterior_color",
            offline: AtomicBool::new(false),
        });
        let outcome = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.skipped, 1);

        let stored = importer.store().inner.list_all(None).unwrap();
        assert_eq!(stored.len(), 2);
        let orphan = stored
            .iter()
            .find(|r| r.title == "Ford Focus")
            .expect("created record is kept under its id");
        assert!(orphan.attributes.is_empty());
        assert!(orphan.categories.is_empty());
        assert!(importer.store().find_by_key("vin", "V1").unwrap().is_none());
        assert!(importer.store().find_by_key("vin", "V2").unwrap().is_some());
    }

    #[test]
    fn unavailable_store_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(&dir, "feed.csv", "VIN\nV1\n");
        let importer = BatchImporter::new(FlakyStore {
            inner: MemoryStore::new(),
            reject_title: "",
            reject_attribute: "",
            offline: AtomicBool::new(true),
        });
        let err = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn unresolved_fields_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let feed = write_feed(&dir, "feed.csv", "VIN,Mystery Column\nV1,x\n");
        let importer = BatchImporter::new(MemoryStore::new());
        let outcome = importer
            .process_batch(&feed, 0, 10, &ProfileSelector::Auto)
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert!(outcome.unresolved.iter().any(|f| f == "make"));
        assert!(!outcome.unresolved.iter().any(|f| f == "vin"));
    }
}
