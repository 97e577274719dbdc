//! Source-specific record conventions
//!
//! Each registry encodes its search results differently. A convention turns
//! one raw record into a canonical entry, or rejects it.

use crate::catalog::{Entry, RawRecord};
use serde::Deserialize;

/// How the raw records of one source map to entries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordConvention {
    /// String records `"CODE<separator>Name"`, split once
    #[serde(rename_all = "kebab-case")]
    Delimited {
        #[serde(default = "default_delimiter")]
        separator: String,
    },

    /// Object records whose code field holds `"CODE<separator>ALT"`
    #[serde(rename_all = "kebab-case")]
    Compound {
        #[serde(default = "default_value_field")]
        code_field: String,
        #[serde(default = "default_text_field")]
        name_field: String,
        #[serde(default = "default_compound_separator")]
        separator: String,
        /// Prefix stripped from the alternate code
        #[serde(default)]
        alt_prefix: Option<String>,
    },

    /// Object records where a subtext, when present, is the primary code
    /// and the value becomes the alternate code
    #[serde(rename_all = "kebab-case")]
    Positional {
        #[serde(default = "default_value_field")]
        value_field: String,
        #[serde(default = "default_subtext_field")]
        subtext_field: String,
        #[serde(default = "default_text_field")]
        name_field: String,
    },

    /// Object records with separate code, name and alternate-code fields
    #[serde(rename_all = "kebab-case")]
    Plain {
        #[serde(default = "default_code_field")]
        code_field: String,
        #[serde(default = "default_name_field")]
        name_field: String,
        #[serde(default = "default_alt_field")]
        alt_field: String,
    },
}

impl Default for RecordConvention {
    fn default() -> Self {
        Self::Delimited {
            separator: default_delimiter(),
        }
    }
}

impl RecordConvention {
    /// Maps a raw record to a canonical entry
    ///
    /// Returns `None` when the record does not fit the convention or lacks a
    /// code or a name.
    pub fn to_entry(&self, record: &RawRecord) -> Option<Entry> {
        let entry = match self {
            Self::Delimited { separator } => {
                let RawRecord::Text(text) = record else {
                    return None;
                };
                let (code, name) = text.split_once(separator.as_str())?;
                Entry::new(code, None, name)
            }

            Self::Compound {
                code_field,
                name_field,
                separator,
                alt_prefix,
            } => {
                let raw_code = record.field(code_field).unwrap_or_default();
                let name = record.field(name_field).unwrap_or_default();
                match raw_code.split_once(separator.as_str()) {
                    Some((code, alt)) => {
                        let alt = alt.trim();
                        let alt = alt_prefix
                            .as_deref()
                            .and_then(|prefix| alt.strip_prefix(prefix))
                            .unwrap_or(alt);
                        Entry::new(code, Some(alt), &name)
                    }
                    None => Entry::new(&raw_code, None, &name),
                }
            }

            Self::Positional {
                value_field,
                subtext_field,
                name_field,
            } => {
                let value = record.field(value_field).unwrap_or_default();
                let name = record.field(name_field).unwrap_or_default();
                match record.field(subtext_field).filter(|s| !s.is_empty()) {
                    Some(subtext) => Entry::new(&subtext, Some(&value), &name),
                    None => Entry::new(&value, None, &name),
                }
            }

            Self::Plain {
                code_field,
                name_field,
                alt_field,
            } => {
                let code = record.field(code_field).unwrap_or_default();
                let name = record.field(name_field).unwrap_or_default();
                let alt = record.field(alt_field);
                Entry::new(&code, alt.as_deref(), &name)
            }
        };

        entry.is_complete().then_some(entry)
    }
}

fn default_delimiter() -> String {
    " - ".to_string()
}

fn default_compound_separator() -> String {
    ":".to_string()
}

fn default_value_field() -> String {
    "Value".to_string()
}

fn default_text_field() -> String {
    "Text".to_string()
}

fn default_subtext_field() -> String {
    "Subtext".to_string()
}

fn default_code_field() -> String {
    "code".to_string()
}

fn default_name_field() -> String {
    "name".to_string()
}

fn default_alt_field() -> String {
    "altCode".to_string()
}
