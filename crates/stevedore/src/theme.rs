//! Colors and symbols

use ratatui::style::{Color, Modifier, Style};
use stevedore_api::{Glyph, PackageState, RunPhase};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Symbol drawn next to a package; `Working` animates with `tick`
pub fn glyph_symbol(glyph: Glyph, tick: u64) -> &'static str {
    match glyph {
        Glyph::Waiting => "·",
        Glyph::Working => {
            let frame = usize::try_from(tick % SPINNER.len() as u64).unwrap_or(0);
            SPINNER[frame]
        }
        Glyph::Success => "✅",
        Glyph::Failure => "❌",
    }
}

/// Package state color
pub fn state_color(state: PackageState) -> Color {
    match state {
        PackageState::Pending => Color::DarkGray,
        PackageState::Deploying => Color::Yellow,
        PackageState::Complete => Color::Green,
        PackageState::Failed => Color::Red,
    }
}

/// Run phase color
pub fn phase_color(phase: RunPhase) -> Color {
    match phase {
        RunPhase::AwaitingConfirmation => Color::Cyan,
        RunPhase::Running => Color::Yellow,
        RunPhase::Finished => Color::Green,
        RunPhase::FatalAborted => Color::Red,
    }
}

/// Header style
pub fn header_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

/// Prompt style
pub fn prompt_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

/// Border style for the package being deployed
pub fn active_border_style() -> Style {
    Style::default().fg(Color::Cyan)
}

/// Border style for every other panel
pub fn inactive_border_style() -> Style {
    Style::default().fg(Color::DarkGray)
}
