//! Events the workflow emits for whatever front end is showing it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::gate::Control;
use super::state::DatasetChoices;
use super::step::{Step, StepStatus};
use crate::api::ExtractedInfo;
use crate::chart::{ChartInstance, StatsTable};
use crate::factors::FactorListing;

/// A visible change in the workflow.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StatusChanged {
        step: Step,
        status: StepStatus,
    },
    /// Show (`active`) or hide the step's loading affordance.
    Loading {
        step: Step,
        active: bool,
    },
    ControlsEnabled {
        controls: Vec<Control>,
    },
    /// A message the user has to see.
    Alert {
        message: String,
    },
    DocumentLoaded {
        content: String,
    },
    FactorsExtracted {
        info: ExtractedInfo,
        listing: FactorListing,
    },
    CodeRendered {
        code: String,
    },
    DatasetsLoaded {
        choices: DatasetChoices,
    },
    BacktestRendered {
        chart: ChartInstance,
        stats: StatsTable,
    },
}

pub trait WorkflowReporter: Send + Sync {
    fn report(&self, event: WorkflowEvent);
}

/// No-op reporter for unit tests.
pub struct NoopReporter;

impl WorkflowReporter for NoopReporter {
    fn report(&self, _event: WorkflowEvent) {}
}

impl<R: WorkflowReporter + ?Sized> WorkflowReporter for Arc<R> {
    fn report(&self, event: WorkflowEvent) {
        (**self).report(event)
    }
}

/// An event stamped with the time it was reported.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub event: WorkflowEvent,
    pub timestamp: DateTime<Utc>,
}

/// Fans workflow events out to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastReporter {
    sender: Arc<broadcast::Sender<TimedEvent>>,
}

impl BroadcastReporter {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastReporter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl WorkflowReporter for BroadcastReporter {
    fn report(&self, event: WorkflowEvent) {
        // No active receivers is fine
        let _ = self.sender.send(TimedEvent {
            event,
            timestamp: Utc::now(),
        });
    }
}
