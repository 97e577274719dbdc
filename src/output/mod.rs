//! Output module for harvest results and reports
//!
//! This module handles:
//! - Writing the catalog and failure documents as JSON
//! - Reporting stored progress

mod document;
pub mod stats;

pub use document::{
    write_documents, CatalogDocument, CatalogMetadata, FailureDocument, FailureMetadata,
    WrittenDocuments,
};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
