//! CSV loading: file bytes → [`SourceDocument`]s.
//!
//! A header row is required. Each row becomes one document whose text is
//! one `header: value` line per column, both sides trimmed. With
//! `loader.rows_per_document > 1`, consecutive rows are grouped into one
//! document, rows separated by a blank line.
//!
//! The file fingerprint is the SHA-256 of the raw bytes, so re-uploading
//! the same file can be detected without parsing it again.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use crate::config::LoaderConfig;
use crate::models::{Metadata, SourceDocument, META_ROW, META_SOURCE};

/// Metadata key holding the number of rows grouped into a document.
pub const META_ROW_COUNT: &str = "row_count";

/// The parsed contents of one input file.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    /// SHA-256 of the raw file bytes, hex encoded.
    pub fingerprint: String,
    pub documents: Vec<SourceDocument>,
}

/// SHA-256 of `bytes`, hex encoded.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint a file without parsing it.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(fingerprint_bytes(&bytes))
}

/// Read and parse a CSV file into source documents.
///
/// Fails on unreadable files, empty files, malformed CSV, a configured
/// `source_column` missing from the header, and files with no data rows.
pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<LoadedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        bail!("file is empty");
    }

    let fingerprint = fingerprint_bytes(&bytes);
    let documents = parse_csv(&bytes, &path.display().to_string(), &fingerprint, config)?;

    tracing::debug!(
        path = %path.display(),
        documents = documents.len(),
        "Loaded CSV file"
    );

    Ok(LoadedFile {
        path: path.to_path_buf(),
        fingerprint,
        documents,
    })
}

fn parse_csv(
    bytes: &[u8],
    source: &str,
    fingerprint: &str,
    config: &LoaderConfig,
) -> Result<Vec<SourceDocument>> {
    if !config.delimiter.is_ascii() || config.rows_per_document == 0 {
        bail!("invalid loader configuration");
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let source_idx = match &config.source_column {
        Some(col) => Some(
            headers
                .iter()
                .position(|h| h == col)
                .with_context(|| format!("source column '{}' not found in header", col))?,
        ),
        None => None,
    };

    let mut rows: Vec<(String, Option<String>)> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV at data row {}", i))?;
        let text = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| format!("{}: {}", h, v.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let row_source = source_idx.and_then(|idx| record.get(idx)).map(|v| v.trim().to_string());
        rows.push((text, row_source));
    }

    if rows.is_empty() {
        bail!("file has a header but no data rows");
    }

    let short = &fingerprint[..12.min(fingerprint.len())];
    let documents = rows
        .chunks(config.rows_per_document)
        .enumerate()
        .map(|(group, members)| {
            let first_row = group * config.rows_per_document;
            let text = members
                .iter()
                .map(|(t, _)| t.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            let mut metadata = Metadata::new();
            let doc_source = members[0].1.clone().unwrap_or_else(|| source.to_string());
            metadata.insert(META_SOURCE.to_string(), doc_source);
            metadata.insert(META_ROW.to_string(), first_row.to_string());
            metadata.insert(META_ROW_COUNT.to_string(), members.len().to_string());

            SourceDocument {
                id: format!("{}:{}", short, first_row),
                text,
                metadata,
            }
        })
        .collect();

    Ok(documents)
}
