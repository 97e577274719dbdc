//! Catalog and failure documents
//!
//! The catalog lists every unique entry. The failure document lists the
//! queries that were still failing after the retry pass and exists only when
//! there are any.

use crate::catalog::Entry;
use crate::config::OutputConfig;
use crate::harvest::CandidateQuery;
use crate::HarvestError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadata {
    pub source: String,
    pub generated_at: String,
    pub total_companies: usize,
}

/// The harvested catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub metadata: CatalogMetadata,
    pub companies: Vec<Entry>,
}

impl CatalogDocument {
    pub fn new(source: &str, entries: &[Entry]) -> Self {
        Self {
            metadata: CatalogMetadata {
                source: source.to_string(),
                generated_at: Utc::now().to_rfc3339(),
                total_companies: entries.len(),
            },
            companies: entries.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMetadata {
    pub source: String,
    pub generated_at: String,
    pub total_failed: usize,
}

/// Queries that never resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDocument {
    pub metadata: FailureMetadata,
    pub failed_inputs: Vec<String>,
}

impl FailureDocument {
    pub fn new(source: &str, failed: &BTreeSet<CandidateQuery>) -> Self {
        Self {
            metadata: FailureMetadata {
                source: source.to_string(),
                generated_at: Utc::now().to_rfc3339(),
                total_failed: failed.len(),
            },
            failed_inputs: failed.iter().map(|q| q.as_str().to_string()).collect(),
        }
    }
}

/// Paths written by [`write_documents`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDocuments {
    pub catalog: PathBuf,
    pub failures: Option<PathBuf>,
}

/// Writes the catalog and, when failures remain, the failure document
///
/// A failure document left over from an earlier run is removed when there
/// are no failures this time.
///
/// # Arguments
///
/// * `output` - Output paths from the configuration
/// * `source` - Source label for the metadata
/// * `entries` - Final unique entries
/// * `failed` - Queries still failing
pub fn write_documents(
    output: &OutputConfig,
    source: &str,
    entries: &[Entry],
    failed: &BTreeSet<CandidateQuery>,
) -> Result<WrittenDocuments, HarvestError> {
    let catalog_path = PathBuf::from(&output.catalog_path);
    write_json(&catalog_path, &CatalogDocument::new(source, entries))?;
    tracing::info!(
        "Wrote {} entries to {}",
        entries.len(),
        catalog_path.display()
    );

    let failed_path = PathBuf::from(&output.failed_path);
    let failures = if failed.is_empty() {
        if failed_path.exists() {
            fs::remove_file(&failed_path)?;
            tracing::debug!("Removed stale {}", failed_path.display());
        }
        None
    } else {
        write_json(&failed_path, &FailureDocument::new(source, failed))?;
        tracing::warn!(
            "Wrote {} failed queries to {}",
            failed.len(),
            failed_path.display()
        );
        Some(failed_path)
    };

    Ok(WrittenDocuments {
        catalog: catalog_path,
        failures,
    })
}

fn write_json<T: Serialize>(path: &Path, document: &T) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(document)?;
    fs::write(path, json).map_err(|e| {
        HarvestError::Output(format!("Failed to write {}: {}", path.display(), e))
    })
}
