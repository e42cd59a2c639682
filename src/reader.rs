//! Delimited-file access for feed imports.
//!
//! Row 0 is always the header. [`FileReader::read_all`] and
//! [`FileReader::read_window`] return it as element 0; [`FileReader::read_batch`]
//! counts offsets in data rows only. Rows are passed through with whatever
//! number of cells they carry.

use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use log::debug;
use serde::Serialize;

use crate::{
    error::{ImportError, Result},
    fingerprint::HeaderFingerprint,
    io_utils,
};

pub type Row = Vec<String>;

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl ReaderOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub headers: Vec<String>,
    pub fingerprint: HeaderFingerprint,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Clone)]
pub struct FileReader {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, options: ReaderOptions) -> Self {
        let path = path.into();
        let delimiter = io_utils::resolve_input_delimiter(&path, options.delimiter);
        FileReader {
            path,
            delimiter,
            encoding: options.encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    fn rows(&self) -> Result<impl Iterator<Item = Result<Row>> + '_> {
        let reader =
            io_utils::open_csv_reader_from_path(&self.path, self.delimiter, self.encoding)?;
        Ok(reader.into_records().map(move |record| {
            record
                .map(|r| io_utils::record_to_row(&r))
                .map_err(|err| ImportError::from_csv(&self.path, err))
        }))
    }

    /// Returns row 0, or an empty header set for an empty file.
    pub fn read_header(&self) -> Result<Vec<String>> {
        match self.rows()?.next() {
            Some(row) => row,
            None => Ok(Vec::new()),
        }
    }

    pub fn read_all(&self) -> Result<Vec<Row>> {
        self.rows()?.collect()
    }

    /// Header followed by page `page` (1-indexed) of `page_size` data rows.
    /// `page == 0` disables pagination and returns every row.
    pub fn read_window(&self, page: usize, page_size: usize) -> Result<Vec<Row>> {
        if page == 0 {
            return self.read_all();
        }
        let mut rows = self.rows()?;
        let mut window = Vec::with_capacity(page_size.saturating_add(1).min(1024));
        match rows.next() {
            Some(header) => window.push(header?),
            None => return Ok(window),
        }
        let skip = (page - 1).saturating_mul(page_size);
        for row in rows.skip(skip).take(page_size) {
            window.push(row?);
        }
        Ok(window)
    }

    /// Up to `limit` data rows starting at data-row index `offset`.
    pub fn read_batch(&self, offset: usize, limit: usize) -> Result<Vec<Row>> {
        let mut batch = Vec::with_capacity(limit.min(1024));
        for row in self.rows()?.skip(1).skip(offset).take(limit) {
            batch.push(row?);
        }
        debug!(
            "Read {} row(s) at offset {} from {:?}",
            batch.len(),
            offset,
            self.path
        );
        Ok(batch)
    }

    /// Number of data rows: total rows minus the header.
    pub fn row_count(&self) -> Result<usize> {
        let mut total = 0usize;
        for row in self.rows()? {
            row?;
            total += 1;
        }
        Ok(total.saturating_sub(1))
    }

    pub fn file_info(&self) -> Result<FileInfo> {
        let headers = self.read_header()?;
        let fingerprint = HeaderFingerprint::compute(&headers);
        let row_count = self.row_count()?;
        Ok(FileInfo {
            column_count: headers.len(),
            headers,
            fingerprint,
            row_count,
        })
    }
}
