pub mod api;
pub mod chart;
pub mod config;
pub mod error;
pub mod factors;
pub mod workflow;

pub use api::{BackendError, FactorBackend, HttpBackend};
pub use config::{load_config, resolve_config, ClientConfig};
pub use error::{ConfigError, FactorLabError, Result, StorageError};
pub use factors::{Factor, FactorListing, KeyFactors};
pub use workflow::{
    BacktestReport, Step, StepStatus, WorkflowController, WorkflowError, WorkflowEvent,
    WorkflowReporter,
};
