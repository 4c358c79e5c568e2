//! Layout calculations for the TUI

use ratatui::prelude::*;

/// Height of the event log panel, borders included
const LOG_HEIGHT: u16 = 8;

/// Layout areas for the UI
pub struct LayoutAreas {
    pub header: Rect,
    pub main: Rect,
    pub log: Option<Rect>,
    pub statusbar: Rect,
}

/// Calculate layout areas based on terminal size
pub fn calculate_layout(area: Rect, show_log: bool) -> LayoutAreas {
    let log_height = if show_log { LOG_HEIGHT } else { 0 };

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),          // Header
            Constraint::Min(4),             // Packages or prompt
            Constraint::Length(log_height), // Event log
            Constraint::Length(1),          // Status bar
        ])
        .split(area);

    LayoutAreas {
        header: vertical[0],
        main: vertical[1],
        log: show_log.then_some(vertical[2]),
        statusbar: vertical[3],
    }
}
