//! Per-step status badges.

use serde::Serialize;

use super::step::{Step, StepStatus};

const BADGE_CLASS: &str = "status-badge";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub step: Step,
    pub from: StepStatus,
    pub to: StepStatus,
}

/// Visual state of one step: a label and a class list holding exactly one
/// status class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    status: StepStatus,
    classes: Vec<&'static str>,
}

impl StatusBadge {
    fn new() -> Self {
        Self {
            status: StepStatus::Pending,
            classes: vec![BADGE_CLASS, StepStatus::Pending.css_class()],
        }
    }

    fn apply(&mut self, status: StepStatus) {
        self.classes
            .retain(|class| !StepStatus::ALL.iter().any(|s| s.css_class() == *class));
        self.classes.push(status.css_class());
        self.status = status;
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn label(&self) -> &'static str {
        self.status.label()
    }

    pub fn classes(&self) -> &[&'static str] {
        &self.classes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    badges: [StatusBadge; 4],
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub fn new() -> Self {
        Self {
            badges: std::array::from_fn(|_| StatusBadge::new()),
        }
    }

    pub fn set_status(&mut self, step: Step, status: StepStatus) -> Result<(), TransitionError> {
        let badge = &mut self.badges[step.index()];
        if !badge.status.can_transition_to(status) {
            return Err(TransitionError {
                step,
                from: badge.status,
                to: status,
            });
        }
        badge.apply(status);
        Ok(())
    }

    pub fn badge(&self, step: Step) -> &StatusBadge {
        &self.badges[step.index()]
    }

    pub fn status(&self, step: Step) -> StepStatus {
        self.badges[step.index()].status
    }
}
