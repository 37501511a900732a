use log::debug;
use ratatui::layout::Constraint;
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::widgets::{Axis, Block, Chart, Dataset, GraphType};
use thiserror::Error;

use crate::api::{CumulativeReturns, Strategy};

const SERIES_COLORS: [Color; 6] = [
    Color::Red,
    Color::Yellow,
    Color::Green,
    Color::Cyan,
    Color::Blue,
    Color::Magenta,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartError {
    #[error("series {strategy} has {actual} points but there are {expected} dates")]
    LengthMismatch {
        strategy: Strategy,
        expected: usize,
        actual: usize,
    },
}

/// Converts a return ratio to a percentage value (0.123 -> 12.3).
pub fn to_percent(ratio: f64) -> f64 {
    ratio * 100.0
}

/// Formats a percentage value with one decimal place.
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}

/// One plotted line: `(date index, percent)` points.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub strategy: Strategy,
    pub points: Vec<(f64, f64)>,
}

/// A rendered cumulative-return chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartInstance {
    id: u64,
    dates: Vec<String>,
    series: Vec<ChartSeries>,
}

impl ChartInstance {
    fn build(id: u64, returns: &CumulativeReturns) -> Result<Self, ChartError> {
        let expected = returns.dates.len();
        let mut series = Vec::with_capacity(Strategy::ALL.len());

        for strategy in Strategy::ALL {
            let values = returns.series(strategy);
            if values.len() != expected {
                return Err(ChartError::LengthMismatch {
                    strategy,
                    expected,
                    actual: values.len(),
                });
            }
            series.push(ChartSeries {
                strategy,
                points: values
                    .iter()
                    .enumerate()
                    .map(|(i, ratio)| (i as f64, to_percent(*ratio)))
                    .collect(),
            });
        }

        Ok(Self {
            id,
            dates: returns.dates.clone(),
            series,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn series(&self) -> &[ChartSeries] {
        &self.series
    }

    pub fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.dates.len().max(2) - 1) as f64]
    }

    /// Percent range over all series, padded so lines don't sit on the frame.
    pub fn y_bounds(&self) -> [f64; 2] {
        let (min, max) = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|(_, y)| *y))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
                (lo.min(y), hi.max(y))
            });

        if !min.is_finite() || !max.is_finite() {
            return [-1.0, 1.0];
        }
        if (max - min).abs() < f64::EPSILON {
            return [min - 1.0, max + 1.0];
        }
        let pad = (max - min) * 0.05;
        [min - pad, max + pad]
    }

    fn x_labels(&self) -> Vec<String> {
        match self.dates.len() {
            0 => vec![],
            1 => vec![self.dates[0].clone()],
            n => vec![
                self.dates[0].clone(),
                self.dates[n / 2].clone(),
                self.dates[n - 1].clone(),
            ],
        }
    }

    fn y_labels(&self) -> Vec<String> {
        let [lo, hi] = self.y_bounds();
        vec![
            format_percent(lo),
            format_percent((lo + hi) / 2.0),
            format_percent(hi),
        ]
    }

    pub fn widget(&self) -> Chart<'_> {
        let datasets: Vec<Dataset<'_>> = self
            .series
            .iter()
            .zip(SERIES_COLORS)
            .map(|(series, color)| {
                Dataset::default()
                    .name(series.strategy.label())
                    .marker(Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(color))
                    .data(&series.points)
            })
            .collect();

        // Six legend rows need more than the default quarter of the height.
        Chart::new(datasets)
            .block(Block::bordered().title("Cumulative returns"))
            .hidden_legend_constraints((Constraint::Ratio(1, 3), Constraint::Ratio(1, 2)))
            .x_axis(
                Axis::default()
                    .title("Date")
                    .style(Style::default().fg(Color::Gray))
                    .labels(self.x_labels())
                    .bounds(self.x_bounds()),
            )
            .y_axis(
                Axis::default()
                    .title("Return")
                    .style(Style::default().fg(Color::Gray))
                    .labels(self.y_labels())
                    .bounds(self.y_bounds()),
            )
    }
}

/// Owns the single chart instance of the backtest view.
#[derive(Debug, Default)]
pub struct ChartRenderer {
    current: Option<ChartInstance>,
    next_id: u64,
}

impl ChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current chart with one built from `returns`.
    ///
    /// The previous instance is destroyed first, so on error no chart is
    /// attached. The input data is only read.
    pub fn render(&mut self, returns: &CumulativeReturns) -> Result<&ChartInstance, ChartError> {
        self.destroy();

        self.next_id += 1;
        let chart = ChartInstance::build(self.next_id, returns)?;
        debug!(
            "Rendered chart #{} with {} dates",
            chart.id,
            chart.dates.len()
        );
        Ok(self.current.insert(chart))
    }

    pub fn destroy(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!("Destroyed chart #{}", previous.id);
        }
    }

    pub fn current(&self) -> Option<&ChartInstance> {
        self.current.as_ref()
    }

    /// Number of attached chart instances, either 0 or 1.
    pub fn attached(&self) -> usize {
        usize::from(self.current.is_some())
    }
}
