//! Deploy view: one box per package

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use stevedore_api::{PackageProgress, PackageState};

use crate::app::App;
use crate::theme;

/// Rows taken by one package box
const BOX_HEIGHT: u16 = 4;

/// Render every package that fits, keeping the deploying one in view
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let progress = app.progress();
    let visible = usize::from((area.height / BOX_HEIGHT).max(1));
    let focus = progress
        .iter()
        .position(|p| p.state == PackageState::Deploying)
        .or_else(|| progress.iter().position(|p| p.state == PackageState::Failed))
        .unwrap_or(0);
    let start = window_start(progress.len(), visible, focus);

    let mut y = area.y;
    for package in progress.iter().skip(start).take(visible) {
        let height = BOX_HEIGHT.min(area.bottom().saturating_sub(y));
        if height < 3 {
            break;
        }
        render_package(frame, package, app.tick, Rect::new(area.x, y, area.width, height));
        y += height;
    }
}

/// First package index shown when `visible` boxes fit
fn window_start(count: usize, visible: usize, focus: usize) -> usize {
    if count <= visible {
        return 0;
    }
    focus
        .saturating_sub(visible.saturating_sub(1))
        .min(count - visible)
}

fn render_package(frame: &mut Frame, package: &PackageProgress, tick: u64, area: Rect) {
    let border_style = if package.state == PackageState::Deploying {
        theme::active_border_style()
    } else {
        theme::inactive_border_style()
    };
    let block = Block::default().borders(Borders::ALL).border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [text_area, gauge_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(inner);

    let status = match package.state {
        PackageState::Pending => "waiting",
        PackageState::Deploying => "deploying ...",
        PackageState::Complete => "deployed",
        PackageState::Failed => "failed",
    };
    let color = theme::state_color(package.state);
    let line = Line::from(vec![
        Span::styled(theme::glyph_symbol(package.glyph, tick), Style::default().fg(color)),
        Span::raw(format!(" Package {} {status}", package.name)),
    ]);
    frame.render_widget(Paragraph::new(line), text_area);

    let ratio = package.fraction.clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(format!("{:.0}%", ratio * 100.0));
    frame.render_widget(gauge, gauge_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_api::{CoordinatorEvent, DeploymentSnapshot, Glyph};

    use crate::app::PackageRow;
    use crate::ui::test_support::render_to_string;

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(3, 5, 2), 0);
        assert_eq!(window_start(10, 3, 0), 0);
        assert_eq!(window_start(10, 3, 1), 0);
        assert_eq!(window_start(10, 3, 4), 2);
        assert_eq!(window_start(10, 3, 9), 7);
    }

    fn progress(name: &str, state: PackageState, fraction: f64, glyph: Glyph) -> PackageProgress {
        PackageProgress {
            name: name.to_string(),
            state,
            fraction,
            glyph,
        }
    }

    #[test]
    fn test_renders_package_boxes() {
        let rows = ["podinfo", "nginx"]
            .iter()
            .map(|name| PackageRow {
                name: (*name).to_string(),
                source: String::new(),
                components: 1,
            })
            .collect();
        let mut app = App::new("demo", rows, None, true);
        app.show_log = false;
        app.handle_coordinator_event(CoordinatorEvent::Snapshot {
            snapshot: DeploymentSnapshot {
                bundle: "demo".to_string(),
                packages: vec![
                    progress("podinfo", PackageState::Complete, 1.0, Glyph::Success),
                    progress("nginx", PackageState::Deploying, 0.5, Glyph::Working),
                ],
                done: false,
                tick: 1,
            },
        });

        let screen = render_to_string(&app, 80, 20);
        assert!(screen.contains("Package podinfo deployed"));
        assert!(screen.contains("Package nginx deploying ..."));
        assert!(screen.contains("100%"));
        assert!(screen.contains("50%"));
        assert!(screen.contains("1/2 complete"));
    }
}
