//! Pre-deploy view: bundle definition and confirmation prompt

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::app::App;
use crate::theme;

/// Render the bundle definition with the confirmation prompt
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let [table_area, prompt_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(area);

    let header = Row::new(vec![
        Cell::from("#"),
        Cell::from("Package"),
        Cell::from("Source"),
        Cell::from("Components"),
    ])
    .style(theme::header_style())
    .height(1);

    let rows: Vec<Row> = app
        .packages
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Row::new(vec![
                Cell::from((i + 1).to_string()),
                Cell::from(row.name.clone()),
                Cell::from(row.source.clone()),
                Cell::from(row.components.to_string()),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Percentage(25),
        Constraint::Percentage(55),
        Constraint::Length(10),
    ];

    let count = app.packages.len();
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(format!(" Bundle {} ({count} packages) ", app.bundle))
            .borders(Borders::ALL)
            .border_style(theme::active_border_style()),
    );
    frame.render_widget(table, table_area);

    let prompt = Paragraph::new(Span::styled(
        " Deploy this bundle? (y/n)",
        theme::prompt_style(),
    ));
    frame.render_widget(prompt, prompt_area);
}
