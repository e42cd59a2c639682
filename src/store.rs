//! Record storage collaborator.
//!
//! The importer talks to storage only through [`RecordStore`]. Two
//! implementations ship with the crate: [`MemoryStore`] and
//! [`JsonFileStore`], which keeps a [`MemoryStore`] and persists it as one
//! JSON document on [`RecordStore::flush`].

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    record::AttributeValue,
    synonyms::{FieldType, SynonymDictionary},
};

pub type RecordId = u64;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(RecordId),

    #[error("Record rejected: {reason}")]
    Rejected { reason: String },

    #[error("Record store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Record store I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record store data error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Failures confined to one record; the importer skips the row and
    /// carries on. Anything else aborts the batch.
    pub fn is_row_level(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Looks `field` up among categories first, then text attributes.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.categories
            .get(field)
            .map(String::as_str)
            .or_else(|| self.attributes.get(field).and_then(AttributeValue::as_text))
    }
}

/// Exact-match filter on one category or text attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub field: String,
    pub value: String,
}

impl RecordFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        RecordFilter {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        record.value(&self.field) == Some(self.value.as_str())
    }
}

pub trait RecordStore {
    /// First record, in ascending id order, whose `field` equals `value`.
    fn find_by_key(&self, field: &str, value: &str) -> StoreResult<Option<StoredRecord>>;
    fn create(&self, title: &str) -> StoreResult<RecordId>;
    fn update(&self, id: RecordId, title: &str) -> StoreResult<()>;
    /// Merges `attributes` onto the record; fields not named are untouched.
    fn set_attributes(
        &self,
        id: RecordId,
        attributes: &BTreeMap<String, AttributeValue>,
    ) -> StoreResult<()>;
    fn set_categories(&self, id: RecordId, categories: &BTreeMap<String, String>)
    -> StoreResult<()>;
    fn list_all(&self, filter: Option<&RecordFilter>) -> StoreResult<Vec<StoredRecord>>;
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Storage-side reading of a raw feed value according to its field type.
pub fn interpret(field_type: FieldType, raw: &str) -> AttributeValue {
    match field_type {
        FieldType::Number => AttributeValue::Text(normalize_number(raw)),
        FieldType::MultiSelect => AttributeValue::List(split_list(raw)),
        FieldType::Text | FieldType::Textarea | FieldType::Group => {
            AttributeValue::Text(raw.to_string())
        }
    }
}

/// Strips currency symbols, thousands separators and padding. Values that
/// still do not parse as a number are kept verbatim.
pub fn normalize_number(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '$' | ',' | ' ' | '_'))
        .collect();
    match Decimal::from_str(&cleaned) {
        Ok(value) => value.normalize().to_string(),
        Err(_) => raw.to_string(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    let separator = if raw.contains('|') { '|' } else { ',' };
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: RecordId,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Default)]
struct Book {
    next_id: RecordId,
    records: BTreeMap<RecordId, StoredRecord>,
}

impl Book {
    fn record_mut(&mut self, id: RecordId) -> StoreResult<&mut StoredRecord> {
        self.records.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    book: Mutex<Book>,
    dictionary: Option<Arc<SynonymDictionary>>,
}

impl MemoryStore {
    /// Stores every value exactly as the importer passes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets numbers and multi-select lists using the dictionary's field types.
    pub fn interpreting(dictionary: Arc<SynonymDictionary>) -> Self {
        MemoryStore {
            book: Mutex::new(Book::default()),
            dictionary: Some(dictionary),
        }
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn from_snapshot(snapshot: Snapshot, dictionary: Option<Arc<SynonymDictionary>>) -> Self {
        let max_id = snapshot.records.iter().map(|r| r.id).max().unwrap_or(0);
        let records = snapshot
            .records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        MemoryStore {
            book: Mutex::new(Book {
                next_id: snapshot.next_id.max(max_id),
                records,
            }),
            dictionary,
        }
    }

    fn snapshot(&self) -> Snapshot {
        let book = self.book();
        Snapshot {
            next_id: book.next_id,
            records: book.records.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.book().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.book().records.get(&id).cloned()
    }

    fn stored_value(&self, field: &str, value: &AttributeValue) -> AttributeValue {
        match (&self.dictionary, value) {
            (Some(dictionary), AttributeValue::Text(raw)) => {
                interpret(dictionary.field_type(field), raw)
            }
            _ => value.clone(),
        }
    }
}

impl RecordStore for MemoryStore {
    fn find_by_key(&self, field: &str, value: &str) -> StoreResult<Option<StoredRecord>> {
        let book = self.book();
        Ok(book
            .records
            .values()
            .find(|record| record.value(field) == Some(value))
            .cloned())
    }

    fn create(&self, title: &str) -> StoreResult<RecordId> {
        let mut book = self.book();
        book.next_id += 1;
        let id = book.next_id;
        let now = Utc::now();
        book.records.insert(
            id,
            StoredRecord {
                id,
                title: title.to_string(),
                attributes: BTreeMap::new(),
                categories: BTreeMap::new(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn update(&self, id: RecordId, title: &str) -> StoreResult<()> {
        let mut book = self.book();
        let record = book.record_mut(id)?;
        record.title = title.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    fn set_attributes(
        &self,
        id: RecordId,
        attributes: &BTreeMap<String, AttributeValue>,
    ) -> StoreResult<()> {
        let stored: Vec<(String, AttributeValue)> = attributes
            .iter()
            .map(|(field, value)| (field.clone(), self.stored_value(field, value)))
            .collect();
        let mut book = self.book();
        let record = book.record_mut(id)?;
        record.attributes.extend(stored);
        record.updated_at = Utc::now();
        Ok(())
    }

    fn set_categories(
        &self,
        id: RecordId,
        categories: &BTreeMap<String, String>,
    ) -> StoreResult<()> {
        let mut book = self.book();
        let record = book.record_mut(id)?;
        for (name, value) in categories {
            record.categories.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn list_all(&self, filter: Option<&RecordFilter>) -> StoreResult<Vec<StoredRecord>> {
        let book = self.book();
        Ok(book
            .records
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(record)))
            .cloned()
            .collect())
    }
}

/// A [`MemoryStore`] loaded from, and flushed back to, a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>, dictionary: Option<Arc<SynonymDictionary>>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(
            "Opened record store {:?} with {} record(s)",
            path,
            snapshot.records.len()
        );
        Ok(JsonFileStore {
            memory: MemoryStore::from_snapshot(snapshot, dictionary),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for JsonFileStore {
    fn find_by_key(&self, field: &str, value: &str) -> StoreResult<Option<StoredRecord>> {
        self.memory.find_by_key(field, value)
    }

    fn create(&self, title: &str) -> StoreResult<RecordId> {
        self.memory.create(title)
    }

    fn update(&self, id: RecordId, title: &str) -> StoreResult<()> {
        self.memory.update(id, title)
    }

    fn set_attributes(
        &self,
        id: RecordId,
        attributes: &BTreeMap<String, AttributeValue>,
    ) -> StoreResult<()> {
        self.memory.set_attributes(id, attributes)
    }

    fn set_categories(
        &self,
        id: RecordId,
        categories: &BTreeMap<String, String>,
    ) -> StoreResult<()> {
        self.memory.set_categories(id, categories)
    }

    fn list_all(&self, filter: Option<&RecordFilter>) -> StoreResult<Vec<StoredRecord>> {
        self.memory.list_all(filter)
    }

    /// Writes to a sibling temp file and renames it over the store.
    fn flush(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let staging = self.path.with_extension("json.tmp");
        {
            let file = File::create(&staging).map_err(|e| self.io_error(e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.memory.snapshot())?;
            writer.flush().map_err(|e| self.io_error(e))?;
        }
        fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Flushed {} record(s) to {:?}", self.len(), self.path);
        Ok(())
    }
}
