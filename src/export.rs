//! JSON and CSV export of stored vehicle records.
//!
//! Each record is flattened to one object: `id`, `title`, the categories
//! and the attributes, keys sorted. A CSV value is quoted only when it
//! contains a comma, a double quote or a line feed.

use std::{collections::BTreeMap, io::Write, str::FromStr};

use clap::ValueEnum;
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ImportError, Result},
    store::{RecordFilter, RecordStore, StoredRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ImportError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ImportError::Config {
                message: format!("Unknown export format '{other}' (expected json or csv)"),
            }),
        }
    }
}

pub type FlatRecord = BTreeMap<String, String>;

pub fn flatten(record: &StoredRecord) -> FlatRecord {
    let mut flat = FlatRecord::new();
    flat.insert("id".to_string(), record.id.to_string());
    flat.insert("title".to_string(), record.title.clone());
    for (name, value) in &record.categories {
        flat.insert(name.clone(), value.clone());
    }
    for (name, value) in &record.attributes {
        flat.insert(name.clone(), value.to_display_string());
    }
    flat
}

pub struct Exporter<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> Exporter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Exporter { store }
    }

    pub fn export_all<W: Write>(&self, format: ExportFormat, writer: W) -> Result<usize> {
        self.export_filtered(None, format, writer)
    }

    pub fn export_filtered<W: Write>(
        &self,
        filter: Option<&RecordFilter>,
        format: ExportFormat,
        writer: W,
    ) -> Result<usize> {
        let records = self.store.list_all(filter)?;
        let flat = records.iter().map(flatten).collect::<Vec<_>>();
        export_records(&flat, format, writer)?;
        info!("Exported {} record(s) as {:?}", flat.len(), format);
        Ok(flat.len())
    }
}

pub fn export_records<W: Write>(records: &[FlatRecord], format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(records, writer),
        ExportFormat::Csv => write_csv(records, writer),
    }
}

fn write_json<W: Write>(records: &[FlatRecord], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n").map_err(stream_error)?;
    writer.flush().map_err(stream_error)
}

/// Header is the key set of the first record; later records are written in
/// that key order with blanks for keys they lack.
fn write_csv<W: Write>(records: &[FlatRecord], mut writer: W) -> Result<()> {
    let Some(first) = records.first() else {
        return writer.flush().map_err(stream_error);
    };
    let keys = first.keys().collect::<Vec<_>>();
    writeln!(writer, "{}", keys.iter().map(|k| quote_csv(k)).join(",")).map_err(stream_error)?;
    for record in records {
        let line = keys
            .iter()
            .map(|key| quote_csv(record.get(*key).map(String::as_str).unwrap_or("")))
            .join(",");
        writeln!(writer, "{line}").map_err(stream_error)?;
    }
    writer.flush().map_err(stream_error)
}

pub fn quote_csv(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    if value.contains([',', '"', '\n']) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

fn stream_error(source: std::io::Error) -> ImportError {
    ImportError::Io {
        path: "<export>".into(),
        source,
    }
}
