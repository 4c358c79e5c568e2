//! UI rendering modules

mod events;
mod layout;
mod packages;
mod prompt;
mod statusbar;

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use stevedore_api::RunPhase;

use crate::app::App;
use crate::theme;

/// Render the entire UI
pub fn render(frame: &mut Frame, app: &App) {
    let areas = layout::calculate_layout(frame.area(), app.show_log);

    render_header(frame, app, areas.header);
    if app.phase == RunPhase::AwaitingConfirmation {
        prompt::render(frame, app, areas.main);
    } else {
        packages::render(frame, app, areas.main);
    }
    if let Some(log) = areas.log {
        events::render(frame, app, log);
    }
    statusbar::render(frame, app, areas.statusbar);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let header = Line::from(vec![
        Span::styled(" stevedore ", theme::header_style()),
        Span::raw("│ bundle "),
        Span::styled(app.bundle.clone(), Style::default().add_modifier(Modifier::BOLD)),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}
