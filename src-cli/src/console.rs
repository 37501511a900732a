//! Prints workflow events to the terminal.

use factorlab::chart::{render_lines, StatsTable};
use factorlab::workflow::{StepStatus, WorkflowEvent, WorkflowReporter};

/// Chart height in terminal rows.
const CHART_HEIGHT: u16 = 24;

/// Lines of converted markdown echoed after upload.
const DOCUMENT_PREVIEW_LINES: usize = 12;

pub struct ConsoleReporter {
    width: u16,
}

impl ConsoleReporter {
    pub fn new(width: u16) -> Self {
        Self { width }
    }

    fn print_stats(&self, stats: &StatsTable) {
        if stats.is_empty() {
            println!("(no performance statistics)");
            return;
        }
        for line in render_lines(stats.widget(), self.width, stats.height()) {
            println!("{}", line);
        }
    }
}

impl WorkflowReporter for ConsoleReporter {
    fn report(&self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::StatusChanged { step, status } => {
                let marker = match status {
                    StepStatus::Pending => " ",
                    StepStatus::Processing => ">",
                    StepStatus::Success => "+",
                    StepStatus::Error => "!",
                };
                println!("[{}] {} {}", marker, step.title(), status.label());
            }
            WorkflowEvent::Loading { step, active } => {
                log::debug!("{} loading: {}", step, active);
            }
            WorkflowEvent::ControlsEnabled { controls } => {
                log::debug!("Enabled controls: {:?}", controls);
            }
            WorkflowEvent::Alert { message } => {
                eprintln!("error: {}", message);
            }
            WorkflowEvent::DocumentLoaded { content } => {
                println!();
                for line in content.lines().take(DOCUMENT_PREVIEW_LINES) {
                    println!("    {}", line);
                }
                let total = content.lines().count();
                if total > DOCUMENT_PREVIEW_LINES {
                    println!("    ... ({} more lines)", total - DOCUMENT_PREVIEW_LINES);
                }
                println!();
            }
            WorkflowEvent::FactorsExtracted { info, listing } => {
                println!();
                for (label, value) in info.summary() {
                    println!("{:>16}: {}", label, value);
                }
                println!("{:>16}:", "Key factors");
                match listing.marker() {
                    Some(marker) => println!("    ({})", marker),
                    None => {
                        for line in listing.to_string().lines() {
                            println!("    {}", line);
                        }
                    }
                }
                println!();
            }
            WorkflowEvent::CodeRendered { code } => {
                println!();
                for line in code.lines() {
                    println!("    {}", line);
                }
                println!();
            }
            WorkflowEvent::DatasetsLoaded { choices } => {
                log::debug!("{} datasets available", choices.datasets().count());
            }
            WorkflowEvent::BacktestRendered { chart, stats } => {
                println!();
                for line in render_lines(chart.widget(), self.width, CHART_HEIGHT) {
                    println!("{}", line);
                }
                println!();
                self.print_stats(&stats);
            }
        }
    }
}
