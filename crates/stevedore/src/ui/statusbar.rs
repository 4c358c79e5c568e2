//! Status bar widget

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use stevedore_api::RunPhase;

use crate::app::App;
use crate::theme;

/// Render the status bar
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let keybindings = match app.phase {
        RunPhase::AwaitingConfirmation => "[y] Deploy  [n] Cancel  [l] Log  [q] Quit",
        RunPhase::Running => "[l] Log  [q] Quit",
        RunPhase::Finished | RunPhase::FatalAborted => "",
    };

    let progress = app.progress();
    let completed = app.snapshot.as_ref().map_or(0, |s| s.completed());

    let status_line = Line::from(vec![
        Span::styled(
            format!("● {}", app.phase),
            Style::default().fg(theme::phase_color(app.phase)),
        ),
        Span::raw(format!("  │  {completed}/{} complete  │  ", progress.len())),
        Span::styled(keybindings, Style::default().fg(Color::DarkGray)),
    ]);

    frame.render_widget(Paragraph::new(status_line), area);
}
