// Delimited-text tables with an explicit encoding

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use georef_resolve::Table;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown encoding label, or bytes that are not valid in the declared
    /// encoding.
    #[error("{path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("{path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decode `bytes` with the WHATWG encoding named by `label`. Malformed input
/// is an error, never a silent replacement. A leading UTF-8 BOM is dropped.
pub fn decode(bytes: &[u8], label: &str) -> Result<String, String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| format!("unknown encoding '{label}'"))?;
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| format!("content is not valid {}", encoding.name()))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text.into_owned(),
    })
}

/// Read a header + rows table from `path`.
pub fn read_table(path: &Path, encoding: &str, delimiter: u8) -> Result<Table, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_table_from_bytes(path, &bytes, encoding, delimiter)
}

/// Parse already-read bytes; `path` only labels errors.
pub fn read_table_from_bytes(path: &Path, bytes: &[u8], encoding: &str, delimiter: u8) -> Result<Table, IoError> {
    let content = decode(bytes, encoding).map_err(|message| IoError::Decode {
        path: path.to_path_buf(),
        message,
    })?;
    let csv_err = |message: String| IoError::Csv {
        path: path.to_path_buf(),
        message,
    };

    // Rows may be short when trailing empty cells were omitted by the exporter.
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_err(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(csv_err("no header row".into()));
    }
    if let Some(first) = headers.first_mut() {
        // A UTF-8 BOM read as windows-1252.
        const MISDECODED_BOM: &str = "\u{ef}\u{bb}\u{bf}";
        if first.starts_with(MISDECODED_BOM) {
            warn!(path = %path.display(), encoding, "header starts with a byte order mark; the file is probably utf-8");
            first.drain(..MISDECODED_BOM.len());
        }
    }

    let width = headers.len();
    let mut table = Table::new(headers);
    for result in reader.records() {
        let record = result.map_err(|e| csv_err(e.to_string()))?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() > width {
            if row[width..].iter().any(|c| !c.trim().is_empty()) {
                let line = record.position().map_or(0, |p| p.line());
                return Err(csv_err(format!(
                    "line {line} has {} fields, header has {width}; check the delimiter",
                    row.len()
                )));
            }
            row.truncate(width);
        }
        row.resize(width, String::new());
        table.push_row(row);
    }

    debug!(path = %path.display(), rows = table.len(), columns = width, "table read");
    Ok(table)
}

/// Write `table` as UTF-8 delimited text.
pub fn write_table(path: &Path, table: &Table, delimiter: u8) -> Result<(), IoError> {
    let write_err = |e: ::csv::Error| {
        let source = match e.into_kind() {
            ::csv::ErrorKind::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, format!("{other:?}")),
        };
        IoError::Write {
            path: path.to_path_buf(),
            source,
        }
    };

    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(write_err)?;
    writer.write_record(&table.headers).map_err(write_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(write_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), rows = table.len(), "table written");
    Ok(())
}

/// Write a text artifact (the JSON report).
pub fn write_text(path: &Path, contents: &str) -> Result<(), IoError> {
    std::fs::write(path, contents).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
