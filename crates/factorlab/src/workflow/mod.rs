//! Step sequencing, status display and control gating for the research
//! workflow.

pub mod controller;
pub mod error;
pub mod gate;
pub mod progress;
pub mod state;
pub mod status;
pub mod step;

pub use controller::{
    BacktestReport, WorkflowController, BACKTEST_FILE_NAME, CODE_FILE_NAME, DOCUMENT_FILE_NAME,
};
pub use error::{Precondition, WorkflowError};
pub use gate::{Control, StepGate};
pub use progress::{BroadcastReporter, NoopReporter, TimedEvent, WorkflowEvent, WorkflowReporter};
pub use state::{
    BacktestSelection, DatasetChoices, DatasetOption, PipelineState, StepArtifacts,
    DATASET_PLACEHOLDER,
};
pub use status::{StatusBadge, StatusIndicator, TransitionError};
pub use step::{Step, StepStatus};
