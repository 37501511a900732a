//! Performance statistics table shown next to the chart.

use ratatui::layout::Constraint;
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Row, Table};

use crate::api::{PerformanceStats, PerformanceTable, Strategy};

const MISSING: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub strategy: Strategy,
    pub stats: PerformanceStats,
}

impl StatsRow {
    fn cells(&self, with_extras: bool) -> Vec<String> {
        let s = &self.stats;
        let mut cells = vec![
            self.strategy.label().to_string(),
            percent_cell(s.annual_return),
            percent_cell(s.annual_volatility),
            ratio_cell(s.sharpe_ratio),
            percent_cell(s.max_drawdown),
        ];
        if with_extras {
            cells.push(percent_cell(s.win_rate));
            cells.push(percent_cell(s.total_return));
        }
        cells
    }
}

/// Stats in fixed strategy order; strategies the server omitted are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    rows: Vec<StatsRow>,
}

impl StatsTable {
    pub fn from_results(table: &PerformanceTable) -> Self {
        let rows = Strategy::ALL
            .iter()
            .filter_map(|strategy| {
                table.get(*strategy).map(|stats| StatsRow {
                    strategy: *strategy,
                    stats: stats.clone(),
                })
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[StatsRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Win rate and total return are only shown when the server sent them.
    fn has_extras(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.stats.win_rate.is_some() || r.stats.total_return.is_some())
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec![
            "Strategy",
            "Annual return",
            "Annual vol",
            "Sharpe",
            "Max drawdown",
        ];
        if self.has_extras() {
            headers.extend(["Win rate", "Total return"]);
        }
        headers
    }

    pub fn cell_rows(&self) -> Vec<Vec<String>> {
        let extras = self.has_extras();
        self.rows.iter().map(|r| r.cells(extras)).collect()
    }

    /// Rows needed to draw the table including border and header.
    pub fn height(&self) -> u16 {
        self.rows.len() as u16 + 3
    }

    pub fn widget(&self) -> Table<'static> {
        let headers = self.headers();
        let widths: Vec<Constraint> = headers
            .iter()
            .enumerate()
            .map(|(i, _)| {
                if i == 0 {
                    Constraint::Length(14)
                } else {
                    Constraint::Length(13)
                }
            })
            .collect();

        let header = Row::new(headers).style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row<'static>> = self.cell_rows().into_iter().map(Row::new).collect();

        Table::new(rows, widths)
            .header(header)
            .block(Block::bordered().title("Performance"))
    }
}

fn percent_cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v))
        .unwrap_or_else(|| MISSING.to_string())
}

fn ratio_cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| MISSING.to_string())
}
