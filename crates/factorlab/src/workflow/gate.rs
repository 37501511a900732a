//! Which controls are usable given the steps that have succeeded.

use std::collections::BTreeSet;

use serde::Serialize;

use super::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    FileInput,
    UploadButton,
    ExtractButton,
    GenerateButton,
    EditCodeButton,
    BacktestButton,
    DatasetSelect,
    StartDate,
    EndDate,
}

impl Control {
    /// The control that triggers `step`.
    pub fn trigger(step: Step) -> Control {
        match step {
            Step::Upload => Control::UploadButton,
            Step::Extract => Control::ExtractButton,
            Step::Generate => Control::GenerateButton,
            Step::Backtest => Control::BacktestButton,
        }
    }
}

/// Enabled-control set. Controls are only ever unlocked; a later failure
/// does not disable what an earlier success enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGate {
    enabled: BTreeSet<Control>,
}

impl Default for StepGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StepGate {
    pub fn new() -> Self {
        Self {
            enabled: [Control::FileInput, Control::UploadButton]
                .into_iter()
                .collect(),
        }
    }

    fn unlocked_by(step: Step) -> &'static [Control] {
        match step {
            Step::Upload => &[Control::ExtractButton],
            Step::Extract => &[Control::GenerateButton],
            Step::Generate => &[
                Control::EditCodeButton,
                Control::BacktestButton,
                Control::DatasetSelect,
                Control::StartDate,
                Control::EndDate,
            ],
            Step::Backtest => &[],
        }
    }

    /// Enables the controls that follow a successful `step` and returns the
    /// ones that were not already enabled.
    pub fn unlock_after(&mut self, step: Step) -> Vec<Control> {
        Self::unlocked_by(step)
            .iter()
            .copied()
            .filter(|control| self.enabled.insert(*control))
            .collect()
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        self.enabled.contains(&control)
    }

    pub fn can_run(&self, step: Step) -> bool {
        self.is_enabled(Control::trigger(step))
    }

    pub fn enabled(&self) -> impl Iterator<Item = Control> + '_ {
        self.enabled.iter().copied()
    }
}
