//! Request and response payloads of the research backend.
//!
//! Every POST response carries a top-level `success` flag; when it is false
//! (or missing, which is how the server reports HTTP 500s) the `error` field
//! holds the message to show the user.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::factors::KeyFactors;

const UNKNOWN_ERROR: &str = "unknown error";

/// A response whose payload is only valid when the server reported success.
pub trait Envelope {
    type Payload;

    /// Returns the payload, or the server's error message on a business failure.
    fn into_payload(self) -> Result<Self::Payload, String>;
}

fn rejection(error: Option<String>) -> String {
    error
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn missing(field: &str) -> String {
    format!("response did not include {}", field)
}

// ============================================================================
// Upload
// ============================================================================

/// A PDF read from disk, ready to be posted as multipart field `file`.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub markdown_content: Option<String>,
    #[serde(default)]
    pub markdown_file: Option<String>,
    #[serde(default)]
    pub original_file: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Markdown conversion of an uploaded paper.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedDocument {
    pub markdown_content: String,
    pub markdown_file: Option<String>,
    pub original_file: Option<String>,
    pub model_used: Option<String>,
}

impl Envelope for UploadResponse {
    type Payload = ConvertedDocument;

    fn into_payload(self) -> Result<ConvertedDocument, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        let markdown_content = self
            .markdown_content
            .ok_or_else(|| missing("markdown_content"))?;
        Ok(ConvertedDocument {
            markdown_content,
            markdown_file: self.markdown_file,
            original_file: self.original_file,
            model_used: self.model_used,
        })
    }
}

// ============================================================================
// Extract
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest<'a> {
    pub markdown_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub extracted_info: Option<Value>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub info: ExtractedInfo,
    pub model_used: Option<String>,
}

impl Envelope for ExtractResponse {
    type Payload = Extraction;

    fn into_payload(self) -> Result<Extraction, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        let value = self
            .extracted_info
            .ok_or_else(|| missing("extracted_info"))?;
        let info = ExtractedInfo::from_value(value)?;
        Ok(Extraction {
            info,
            model_used: self.model_used,
        })
    }
}

/// `datasets` section of the extracted information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub primary: Option<String>,
    pub time_range: Option<String>,
    pub frequency: Option<String>,
}

/// `solution` section of the extracted information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolutionSummary {
    pub method: Option<String>,
    pub algorithm: Option<String>,
    pub strategy: Option<String>,
}

/// Structured information extracted from a paper.
///
/// The server-provided object is kept verbatim so it can be sent back to the
/// code generator unchanged; the known sections are decoded alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedInfo {
    pub datasets: DatasetSummary,
    pub core_problem: Option<String>,
    pub solution: SolutionSummary,
    pub key_factors: KeyFactors,
    raw: Map<String, Value>,
}

impl ExtractedInfo {
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(format!(
                "extracted_info must be an object, got {}",
                json_kind(&other)
            )),
        }
    }

    pub fn from_map(raw: Map<String, Value>) -> Self {
        let section = |name: &str, key: &str| raw.get(name).and_then(|s| text(s.get(key)));

        Self {
            datasets: DatasetSummary {
                primary: section("datasets", "primary"),
                time_range: section("datasets", "time_range"),
                frequency: section("datasets", "frequency"),
            },
            core_problem: text(raw.get("core_problem")),
            solution: SolutionSummary {
                method: section("solution", "method"),
                algorithm: section("solution", "algorithm"),
                strategy: section("solution", "strategy"),
            },
            key_factors: KeyFactors::decode(raw.get("key_factors")),
            raw,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Labelled values of the known sections that are present, in display
    /// order.
    pub fn summary(&self) -> Vec<(&'static str, &str)> {
        [
            ("Dataset", &self.datasets.primary),
            ("Time range", &self.datasets.time_range),
            ("Frequency", &self.datasets.frequency),
            ("Core problem", &self.core_problem),
            ("Method", &self.solution.method),
            ("Algorithm", &self.solution.algorithm),
            ("Strategy", &self.solution.strategy),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| (label, v)))
        .collect()
    }
}

impl Serialize for ExtractedInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Generate
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub extracted_info: &'a ExtractedInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub factor_code: Option<String>,
    #[serde(default)]
    pub code_file: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCode {
    pub factor_code: String,
    pub code_file: Option<String>,
    pub model_used: Option<String>,
}

impl Envelope for GenerateResponse {
    type Payload = GeneratedCode;

    fn into_payload(self) -> Result<GeneratedCode, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        let factor_code = self.factor_code.ok_or_else(|| missing("factor_code"))?;
        Ok(GeneratedCode {
            factor_code,
            code_file: self.code_file,
            model_used: self.model_used,
        })
    }
}

// ============================================================================
// Datasets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetsResponse {
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

// ============================================================================
// Backtest
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BacktestRequest<'a> {
    pub factor_code: &'a str,
    pub dataset: &'a str,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub results: Option<BacktestResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope for BacktestResponse {
    type Payload = BacktestResult;

    fn into_payload(self) -> Result<BacktestResult, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        let results = self.results.ok_or_else(|| missing("results"))?;
        // The backtest service reports computation failures inside `results`.
        if let Some(error) = results.error {
            return Err(rejection(Some(error)));
        }
        if results.cumulative_returns.is_none() {
            return Err(missing("cumulative_returns"));
        }
        Ok(results)
    }
}

/// One of the six return buckets a backtest reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Q1,
    Q2,
    Q3,
    Q4,
    Q5,
    #[serde(rename = "long_short")]
    LongShort,
}

impl Strategy {
    /// Fixed rendering order.
    pub const ALL: [Strategy; 6] = [
        Strategy::Q1,
        Strategy::Q2,
        Strategy::Q3,
        Strategy::Q4,
        Strategy::Q5,
        Strategy::LongShort,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Strategy::Q1 => "Q1",
            Strategy::Q2 => "Q2",
            Strategy::Q3 => "Q3",
            Strategy::Q4 => "Q4",
            Strategy::Q5 => "Q5",
            Strategy::LongShort => "long_short",
        }
    }

    /// Key used by the stats table of older backtest services.
    fn stats_key(&self) -> &'static str {
        match self {
            Strategy::Q1 => "Q1_return",
            Strategy::Q2 => "Q2_return",
            Strategy::Q3 => "Q3_return",
            Strategy::Q4 => "Q4_return",
            Strategy::Q5 => "Q5_return",
            Strategy::LongShort => "long_short",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Q1 => "Q1 (lowest)",
            Strategy::Q2 => "Q2",
            Strategy::Q3 => "Q3",
            Strategy::Q4 => "Q4",
            Strategy::Q5 => "Q5 (highest)",
            Strategy::LongShort => "Long-Short",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Summary statistics of one strategy, already scaled for percentage display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    #[serde(default)]
    pub annual_return: Option<f64>,
    #[serde(default)]
    pub annual_volatility: Option<f64>,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub max_drawdown: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_return: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceTable(HashMap<String, PerformanceStats>);

impl PerformanceTable {
    /// Looks the strategy up by its label, falling back to the `Q1_return` style key.
    pub fn get(&self, strategy: Strategy) -> Option<&PerformanceStats> {
        self.0
            .get(strategy.key())
            .or_else(|| self.0.get(strategy.stats_key()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, PerformanceStats)> for PerformanceTable {
    fn from_iter<I: IntoIterator<Item = (String, PerformanceStats)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Cumulative return ratios per strategy against a shared date axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeReturns {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(rename = "Q1", default)]
    pub q1: Vec<f64>,
    #[serde(rename = "Q2", default)]
    pub q2: Vec<f64>,
    #[serde(rename = "Q3", default)]
    pub q3: Vec<f64>,
    #[serde(rename = "Q4", default)]
    pub q4: Vec<f64>,
    #[serde(rename = "Q5", default)]
    pub q5: Vec<f64>,
    #[serde(default)]
    pub long_short: Vec<f64>,
}

impl CumulativeReturns {
    pub fn series(&self, strategy: Strategy) -> &[f64] {
        match strategy {
            Strategy::Q1 => &self.q1,
            Strategy::Q2 => &self.q2,
            Strategy::Q3 => &self.q3,
            Strategy::Q4 => &self.q4,
            Strategy::Q5 => &self.q5,
            Strategy::LongShort => &self.long_short,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub performance_stats: PerformanceTable,
    #[serde(default)]
    pub cumulative_returns: Option<CumulativeReturns>,
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub models: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A model offered by the backend, grouped by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub provider: String,
    pub id: String,
    pub name: String,
}

impl ModelInfo {
    /// Providers describe models either as bare ids or as objects with
    /// `id`/`model_id` and an optional `name`.
    fn from_value(provider: &str, value: &Value) -> Option<Self> {
        let (id, name) = match value {
            Value::String(id) => (id.clone(), id.clone()),
            Value::Object(obj) => {
                let id = text(obj.get("id")).or_else(|| text(obj.get("model_id")))?;
                let name = text(obj.get("name")).unwrap_or_else(|| id.clone());
                (id, name)
            }
            _ => return None,
        };
        Some(Self {
            provider: provider.to_string(),
            id,
            name,
        })
    }
}

impl Envelope for ModelsResponse {
    type Payload = Vec<ModelInfo>;

    fn into_payload(self) -> Result<Vec<ModelInfo>, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        Ok(self
            .models
            .iter()
            .flat_map(|(provider, models)| {
                models
                    .iter()
                    .filter_map(move |m| ModelInfo::from_value(provider, m))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestModelRequest<'a> {
    pub model_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestModelResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProbe {
    pub model_id: String,
    pub reply: String,
}

impl Envelope for TestModelResponse {
    type Payload = ModelProbe;

    fn into_payload(self) -> Result<ModelProbe, String> {
        if !self.success {
            return Err(rejection(self.error));
        }
        Ok(ModelProbe {
            model_id: self.model_id.unwrap_or_default(),
            reply: self.response.unwrap_or_default(),
        })
    }
}
