//! Export-file ingestion. The dashboard emits UTF-8 most of the time but
//! falls back to CP932 output on some tenants, so decoding tries exactly
//! those two encodings in order. No sniffing beyond that.

use std::fmt;
use std::path::{Path, PathBuf};

use encoding_rs::{SHIFT_JIS, UTF_8};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Ordered rows of ordered string cells. Ragged rows are preserved exactly
/// as the file contained them.
pub type RowMatrix = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
    Utf8,
    ShiftJis,
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::Utf8 => f.write_str("utf-8"),
            SourceEncoding::ShiftJis => f.write_str("shift_jis"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read export {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("export {path} is not decodable as utf-8 or shift_jis")]
    Undecodable { path: PathBuf },
    #[error("malformed delimited data in {path}: {source}")]
    Malformed { path: PathBuf, source: csv::Error },
}

#[derive(Debug, Clone)]
pub struct ParsedExport {
    pub rows: RowMatrix,
    pub encoding: SourceEncoding,
}

impl ParsedExport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell_count(&self) -> u64 {
        self.rows.iter().map(|row| row.len() as u64).sum()
    }
}

/// Parse one export file into a row matrix. Zero rows is a valid result,
/// distinct from any error.
pub fn parse_export(path: &Path) -> Result<ParsedExport, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (text, encoding) = decode(&bytes).ok_or_else(|| {
        warn!(path = %path.display(), "export not decodable in either supported encoding");
        IngestError::Undecodable {
            path: path.to_path_buf(),
        }
    })?;
    let rows = parse_rows(&text).map_err(|source| IngestError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), %encoding, rows = rows.len(), "parsed export");
    Ok(ParsedExport { rows, encoding })
}

/// Strict primary decode; the secondary is only attempted after the primary
/// rejects the bytes.
fn decode(bytes: &[u8]) -> Option<(String, SourceEncoding)> {
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return Some((text.into_owned(), SourceEncoding::Utf8));
    }
    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| (text.into_owned(), SourceEncoding::ShiftJis))
}

fn parse_rows(text: &str) -> Result<RowMatrix, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
