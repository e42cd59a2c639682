//! I/O utilities for reading dealer feeds and writing exports.
//!
//! - **Delimiter resolution**: `.tsv` → tab, anything else → comma, with a
//!   manual override for pipe/semicolon feeds.
//! - **Encoding**: input is transcoded to UTF-8 through `encoding_rs_io`,
//!   which also strips a leading byte-order mark.
//! - **Reader construction**: readers never treat row 0 as special and are
//!   flexible about row length; header handling lives in [`crate::reader`].
//! - **stdout**: the `-` path convention routes exports to standard output.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::{ImportError, Result};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes()).ok_or_else(|| {
            ImportError::Encoding {
                label: value.to_string(),
            }
        }),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Opens `path` as a UTF-8 byte stream regardless of its source encoding.
pub fn open_decoded(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|err| ImportError::from_open(path, err))?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_sniffing(true)
        .build(BufReader::new(file));
    Ok(Box::new(decoder))
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Reader<Box<dyn Read>>> {
    Ok(open_csv_reader(open_decoded(path, encoding)?, delimiter))
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => {
            let file = File::create(p).map_err(|source| ImportError::Io {
                path: p.to_path_buf(),
                source,
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}

pub fn record_to_row(record: &csv::StringRecord) -> Vec<String> {
    record.iter().map(|field| field.to_string()).collect()
}
