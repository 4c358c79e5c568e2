//! Application state and logic

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use stevedore_api::{
    CoordinatorEvent, DeploymentSnapshot, Glyph, OperatorInput, PackageProgress, PackageState,
    RunPhase,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::action::Action;

const EVENT_LOG_CAPACITY: usize = 100;

/// Event log entry
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: EventLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Bundle entry shown before the run starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub name: String,
    pub source: String,
    pub components: usize,
}

/// Application state
pub struct App {
    /// Bundle name
    pub bundle: String,
    /// Bundle definition in deployment order
    pub packages: Vec<PackageRow>,
    /// Last known run phase
    pub phase: RunPhase,
    /// Latest snapshot from the coordinator
    pub snapshot: Option<DeploymentSnapshot>,
    /// Event log, newest first
    pub event_log: VecDeque<EventLogEntry>,
    /// Show the event log panel
    pub show_log: bool,
    /// Tick counter for animations
    pub tick: u64,
    input: Option<mpsc::Sender<OperatorInput>>,
    should_quit: bool,
}

impl App {
    /// Create a new application
    ///
    /// A run started with `confirmed` skips the prompt view.
    pub fn new(
        bundle: impl Into<String>,
        packages: Vec<PackageRow>,
        input: Option<mpsc::Sender<OperatorInput>>,
        confirmed: bool,
    ) -> Self {
        Self {
            bundle: bundle.into(),
            packages,
            phase: if confirmed {
                RunPhase::Running
            } else {
                RunPhase::AwaitingConfirmation
            },
            snapshot: None,
            event_log: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
            show_log: true,
            tick: 0,
            input,
            should_quit: false,
        }
    }

    /// Check if app should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Stop the UI without waiting for another event
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Package progress to draw, in deployment order
    pub fn progress(&self) -> Vec<PackageProgress> {
        match &self.snapshot {
            Some(snapshot) => snapshot.packages.clone(),
            None => self
                .packages
                .iter()
                .map(|row| PackageProgress {
                    name: row.name.clone(),
                    state: PackageState::Pending,
                    fraction: 0.0,
                    glyph: Glyph::Waiting,
                })
                .collect(),
        }
    }

    /// Handle an action
    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::Confirm if self.phase == RunPhase::AwaitingConfirmation => {
                if self.send(OperatorInput::Confirm) {
                    self.log_event("Deployment confirmed", EventLevel::Info);
                }
            }
            Action::Decline if self.phase == RunPhase::AwaitingConfirmation => {
                self.send(OperatorInput::Decline);
            }
            Action::Quit => {
                // the coordinator answers with a terminal event; without it
                // there is nothing left to wait for
                if !self.send(OperatorInput::Quit) {
                    self.should_quit = true;
                }
            }
            Action::ToggleLog => {
                self.show_log = !self.show_log;
            }
            Action::Tick => {
                self.tick = self.tick.wrapping_add(1);
            }
            _ => {}
        }
    }

    /// Handle an event published by the coordinator
    pub fn handle_coordinator_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Started { bundle, packages } => {
                self.phase = RunPhase::Running;
                self.log_event(
                    &format!("Deploying {bundle} ({packages} packages)"),
                    EventLevel::Info,
                );
            }
            CoordinatorEvent::Snapshot { snapshot } => {
                self.snapshot = Some(snapshot);
            }
            CoordinatorEvent::PackageOutput { package, line } => {
                self.log_event(&format!("{package}: {line}"), EventLevel::Info);
            }
            CoordinatorEvent::PackageCompleted { package, .. } => {
                self.log_event(&format!("{package}: deployed"), EventLevel::Success);
            }
            CoordinatorEvent::Finished { snapshot } => {
                self.phase = RunPhase::Finished;
                let count = snapshot.completed();
                self.snapshot = Some(snapshot);
                self.log_event(
                    &format!("Bundle deployed ({count} packages)"),
                    EventLevel::Success,
                );
                self.should_quit = true;
            }
            CoordinatorEvent::FatalAborted {
                snapshot,
                package,
                error,
            } => {
                self.phase = RunPhase::FatalAborted;
                self.snapshot = Some(snapshot);
                let message = match package {
                    Some(package) => format!("{package}: {error}"),
                    None => error,
                };
                self.log_event(&message, EventLevel::Error);
                self.should_quit = true;
            }
            CoordinatorEvent::Cancelled { reason } => {
                self.log_event(&format!("Cancelled: {reason}"), EventLevel::Warning);
                self.should_quit = true;
            }
        }
    }

    /// Forward operator input; false if the coordinator is gone
    fn send(&mut self, input: OperatorInput) -> bool {
        let Some(tx) = &self.input else {
            return false;
        };
        match tx.try_send(input) {
            Ok(()) => {
                debug!(?input, "sent operator input");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(?input, "operator input dropped, channel full");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.input = None;
                false
            }
        }
    }

    /// Log an event
    fn log_event(&mut self, message: &str, level: EventLevel) {
        let entry = EventLogEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
            level,
        };
        self.event_log.push_front(entry);
        if self.event_log.len() > EVENT_LOG_CAPACITY {
            self.event_log.pop_back();
        }
    }
}
