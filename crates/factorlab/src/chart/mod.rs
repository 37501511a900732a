//! Backtest presentation: the cumulative-return chart and the stats table.

pub mod renderer;
pub mod stats;

pub use renderer::{format_percent, to_percent, ChartError, ChartInstance, ChartRenderer, ChartSeries};
pub use stats::{StatsRow, StatsTable};

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::widgets::Widget;

/// Draws a widget into an off-screen buffer and returns its rows as text.
pub fn render_lines<W: Widget>(widget: W, width: u16, height: u16) -> Vec<String> {
    let area = Rect::new(0, 0, width, height);
    let mut buffer = Buffer::empty(area);
    widget.render(area, &mut buffer);

    (0..height)
        .map(|y| {
            let line: String = (0..width).map(|x| buffer[(x, y)].symbol()).collect();
            line.trim_end().to_string()
        })
        .collect()
}
