use chrono::NaiveDate;
use serde::Serialize;

use crate::api::{BacktestResult, DatasetEntry, ExtractedInfo};

/// Outputs of the steps that have succeeded so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub document_content: Option<String>,
    pub extracted_info: Option<ExtractedInfo>,
    pub generated_code: Option<String>,
    pub backtest: Option<BacktestResult>,
    pub artifacts: StepArtifacts,
}

/// File names and models the server reported for each step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepArtifacts {
    pub original_file: Option<String>,
    pub markdown_file: Option<String>,
    pub code_file: Option<String>,
    pub upload_model: Option<String>,
    pub extract_model: Option<String>,
    pub generate_model: Option<String>,
}

/// Dataset and optional date range for the backtest step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacktestSelection {
    pub dataset: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl BacktestSelection {
    /// The chosen dataset id, treating a blank selection as none.
    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref().filter(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetOption {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl DatasetOption {
    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty()
    }
}

pub const DATASET_PLACEHOLDER: &str = "Select a dataset";

/// Selectable dataset list, always led by an empty placeholder entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetChoices {
    options: Vec<DatasetOption>,
}

impl Default for DatasetChoices {
    fn default() -> Self {
        Self::from_entries(Vec::new())
    }
}

impl DatasetChoices {
    pub fn from_entries(entries: Vec<DatasetEntry>) -> Self {
        let placeholder = DatasetOption {
            id: String::new(),
            name: DATASET_PLACEHOLDER.to_string(),
            description: String::new(),
        };
        let options = std::iter::once(placeholder)
            .chain(entries.into_iter().map(|e| DatasetOption {
                id: e.id,
                name: e.name,
                description: e.description,
            }))
            .collect();
        Self { options }
    }

    pub fn options(&self) -> &[DatasetOption] {
        &self.options
    }

    /// Entries other than the placeholder.
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetOption> {
        self.options.iter().filter(|o| !o.is_placeholder())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.datasets().any(|o| o.id == id)
    }
}
