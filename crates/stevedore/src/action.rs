//! User actions for the TUI application

/// Actions that can be performed in the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start the deployment
    Confirm,
    /// Abandon the deployment before it starts
    Decline,
    /// Quit the application
    Quit,
    /// Show or hide the event log
    ToggleLog,
    /// Tick event for animations
    Tick,
    /// Render the UI
    Render,
    /// No operation
    None,
}
