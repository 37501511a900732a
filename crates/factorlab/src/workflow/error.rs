use thiserror::Error;

use super::step::Step;
use crate::api::BackendError;
use crate::chart::ChartError;

/// A missing prerequisite, caught before any request is sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    #[error("Please select a PDF file first")]
    NoFileSelected,

    #[error("Only PDF files are supported")]
    NotPdf,

    #[error("Please upload a paper first")]
    NoDocument,

    #[error("Please extract the paper's key information first")]
    NoExtractedInfo,

    #[error("Please generate factor code first")]
    NoFactorCode,

    #[error("Please select a dataset")]
    NoDataset,

    #[error("Open the code editor before saving an edit")]
    EditorClosed,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{0}")]
    Precondition(#[from] Precondition),

    #[error("{} is already running", .0.action())]
    StepBusy(Step),

    /// The request failed before a response envelope was read.
    #[error("{} failed: {source}", .step.action())]
    Transport {
        step: Step,
        #[source]
        source: BackendError,
    },

    /// The server answered with `success: false`.
    #[error("{} failed: {message}", .step.action())]
    Rejected { step: Step, message: String },

    #[error("{} failed: {source}", Step::Backtest.action())]
    Chart {
        #[from]
        source: ChartError,
    },

    /// A request outside the four steps (model catalog) failed.
    #[error("{action} failed: {message}")]
    Service {
        action: &'static str,
        message: String,
    },
}

impl WorkflowError {
    /// The step whose status this error moved to `error`, if any.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            WorkflowError::Transport { step, .. } | WorkflowError::Rejected { step, .. } => {
                Some(*step)
            }
            WorkflowError::Chart { .. } => Some(Step::Backtest),
            _ => None,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkflowError::Precondition(_))
    }
}
