use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Upload,
    Extract,
    Generate,
    Backtest,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Upload, Step::Extract, Step::Generate, Step::Backtest];

    pub fn index(self) -> usize {
        match self {
            Step::Upload => 0,
            Step::Extract => 1,
            Step::Generate => 2,
            Step::Backtest => 3,
        }
    }

    /// Action name used in "<action> failed: <message>" alerts.
    pub fn action(self) -> &'static str {
        match self {
            Step::Upload => "Upload",
            Step::Extract => "Extraction",
            Step::Generate => "Code generation",
            Step::Backtest => "Backtest",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Upload => "Upload paper",
            Step::Extract => "Extract key information",
            Step::Generate => "Generate factor code",
            Step::Backtest => "Run backtest",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Upload => write!(f, "upload"),
            Step::Extract => write!(f, "extract"),
            Step::Generate => write!(f, "generate"),
            Step::Backtest => write!(f, "backtest"),
        }
    }
}

/// Status of a step's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Error,
}

impl StepStatus {
    pub const ALL: [StepStatus; 4] = [
        StepStatus::Pending,
        StepStatus::Processing,
        StepStatus::Success,
        StepStatus::Error,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Success => "completed",
            StepStatus::Error => "failed",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            StepStatus::Pending => "status-pending",
            StepStatus::Processing => "status-processing",
            StepStatus::Success => "status-success",
            StepStatus::Error => "status-error",
        }
    }

    /// Success and error are only reachable from processing; re-applying the
    /// current status is always allowed.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        match next {
            _ if next == self => true,
            StepStatus::Processing => true,
            StepStatus::Success | StepStatus::Error => self == StepStatus::Processing,
            StepStatus::Pending => false,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
