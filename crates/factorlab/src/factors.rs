//! Normalization of the `key_factors` field of extracted paper information.
//!
//! The extraction service is an LLM behind an HTTP endpoint and its output is
//! not schema-validated, so `key_factors` shows up in one of several shapes:
//! a list of factor objects, that same list JSON-encoded into a string, or a
//! plain `{name: description}` mapping. The shape is decoded once into
//! [`KeyFactors`] and then normalized into a [`FactorListing`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_FACTOR_NAME: &str = "unknown factor";
pub const MISSING_DESCRIPTION: &str = "no description";
pub const UNCATEGORIZED: &str = "uncategorized";
pub const MAPPED_FACTOR_TYPE: &str = "extracted factor";

/// Shown when `key_factors` was present but could not be read as a list.
pub const FORMAT_ERROR_MARKER: &str = "key factors format error";
/// Shown when `key_factors` was missing or null.
pub const NOTHING_EXTRACTED_MARKER: &str = "no key factors extracted";

/// Wire shape of `key_factors`, decoded once at the response boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyFactors {
    Sequence(Vec<Value>),
    EncodedText(String),
    Mapping(Map<String, Value>),
    Absent,
}

impl KeyFactors {
    /// Classifies the raw field. Numbers and booleans carry no factors and
    /// are treated like a missing field.
    pub fn decode(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(items)) => KeyFactors::Sequence(items.clone()),
            Some(Value::String(text)) => KeyFactors::EncodedText(text.clone()),
            Some(Value::Object(map)) => KeyFactors::Mapping(map.clone()),
            Some(Value::Null) | Some(Value::Bool(_)) | Some(Value::Number(_)) | None => {
                KeyFactors::Absent
            }
        }
    }

    pub fn normalize(&self) -> FactorListing {
        match self {
            KeyFactors::Sequence(items) => FactorListing::Factors(from_sequence(items)),
            KeyFactors::EncodedText(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => FactorListing::Factors(from_sequence(&items)),
                Ok(_) => FactorListing::FormatError { raw: None },
                Err(e) => {
                    log::warn!("key_factors text is not valid JSON: {}", e);
                    FactorListing::FormatError {
                        raw: Some(text.clone()),
                    }
                }
            },
            KeyFactors::Mapping(map) => FactorListing::Factors(
                map.iter()
                    .map(|(key, value)| Factor {
                        name: key.clone(),
                        description: match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                        kind: MAPPED_FACTOR_TYPE.to_string(),
                    })
                    .collect(),
            ),
            KeyFactors::Absent => FactorListing::NothingExtracted,
        }
    }
}

/// A single normalized factor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Display-ready result of normalizing `key_factors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorListing {
    Factors(Vec<Factor>),
    /// Present but unreadable. `raw` holds the text when JSON parsing failed.
    FormatError { raw: Option<String> },
    NothingExtracted,
}

impl FactorListing {
    pub fn factors(&self) -> &[Factor] {
        match self {
            FactorListing::Factors(factors) => factors,
            _ => &[],
        }
    }

    pub fn marker(&self) -> Option<&'static str> {
        match self {
            FactorListing::Factors(_) => None,
            FactorListing::FormatError { .. } => Some(FORMAT_ERROR_MARKER),
            FactorListing::NothingExtracted => Some(NOTHING_EXTRACTED_MARKER),
        }
    }
}

impl fmt::Display for FactorListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorListing::Factors(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "{}. {} [{}]: {}",
                        i + 1,
                        factor.name,
                        factor.kind,
                        factor.description
                    )?;
                }
                Ok(())
            }
            FactorListing::FormatError { raw: Some(raw) } => {
                write!(f, "{}\n{}", FORMAT_ERROR_MARKER, raw)
            }
            FactorListing::FormatError { raw: None } => write!(f, "{}", FORMAT_ERROR_MARKER),
            FactorListing::NothingExtracted => write!(f, "{}", NOTHING_EXTRACTED_MARKER),
        }
    }
}

fn from_sequence(items: &[Value]) -> Vec<Factor> {
    items
        .iter()
        .map(|item| Factor {
            name: truthy_field(item, "name").unwrap_or_else(|| UNKNOWN_FACTOR_NAME.to_string()),
            description: truthy_field(item, "description")
                .unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
            kind: truthy_field(item, "type").unwrap_or_else(|| UNCATEGORIZED.to_string()),
        })
        .collect()
}

/// Text of `item[key]`, or `None` when the value is missing or falsy
/// (null, false, zero, empty string).
fn truthy_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
