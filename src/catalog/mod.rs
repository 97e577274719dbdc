//! Catalog module for harvested records
//!
//! This module handles:
//! - The canonical `Entry` type and its uniqueness rules
//! - Raw records as returned by the remote endpoint
//! - Source-specific conventions that map raw records to entries
//! - The deduplicating aggregator

mod aggregator;
mod convention;

pub use aggregator::{AddOutcome, Aggregator};
pub use convention::RecordConvention;

use serde::{Deserialize, Serialize};

/// A harvested record
///
/// Two entries are the same entity when code, alternate code and name are
/// all equal, regardless of which query surfaced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub code: String,
    #[serde(rename = "altCode")]
    pub alt_code: Option<String>,
    pub name: String,
}

impl Entry {
    /// Creates a canonical entry
    ///
    /// All fields are trimmed and an empty alternate code becomes `None`.
    pub fn new(code: &str, alt_code: Option<&str>, name: &str) -> Self {
        Self {
            code: code.trim().to_string(),
            alt_code: alt_code
                .map(str::trim)
                .filter(|alt| !alt.is_empty())
                .map(str::to_string),
            name: name.trim().to_string(),
        }
    }

    /// Returns true if the entry carries both a code and a name
    pub fn is_complete(&self) -> bool {
        !self.code.is_empty() && !self.name.is_empty()
    }
}

/// One record of a search response, before any convention is applied
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    /// A combined string such as `"BHP - BHP Group"`
    Text(String),

    /// A JSON object with source-specific field names
    Fields(serde_json::Map<String, serde_json::Value>),

    /// Anything else; never maps to an entry
    Other(serde_json::Value),
}

impl RawRecord {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    /// Builds an object record from field/value pairs
    pub fn fields<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect(),
        )
    }

    /// Reads a field as trimmed text; numbers are rendered as text
    pub(crate) fn field(&self, name: &str) -> Option<String> {
        let Self::Fields(map) = self else {
            return None;
        };

        match map.get(name)? {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
