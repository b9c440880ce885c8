//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow progress without
//! tight coupling to the workflow code.

use std::fmt;
use std::sync::Mutex;

use crate::programmer::SystemInfo;
use crate::workflow::WriteStage;

/// What a step is doing to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reading,
    Writing,
    Verifying,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Reading => write!(f, "Reading"),
            Operation::Writing => write!(f, "Writing"),
            Operation::Verifying => write!(f, "Verifying"),
        }
    }
}

/// Events emitted while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgEvent {
    /// Programmer identified itself.
    ProgrammerFound { info: SystemInfo },
    /// Chip identifier matched the device description.
    ChipIdVerified { chip_id: u32 },
    /// A read/write/verify step started on `target` ("Code", "Data", "fuses").
    StepStarted { operation: Operation, target: String },
    /// Block progress, `percent` = 100 * done / total rounded down.
    Progress {
        operation: Operation,
        target: String,
        percent: u8,
    },
    /// A step finished successfully.
    StepFinished { operation: Operation, target: String },
    /// Write workflow stage transition.
    StageChanged {
        from: WriteStage,
        to: WriteStage,
        skipped: bool,
    },
    /// Non-fatal problem the user should see.
    Warning { message: String },
    /// Action finished successfully.
    Complete,
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait ProgObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ProgEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ProgObserver for NullObserver {
    fn on_event(&self, _event: &ProgEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ProgObserver for TracingObserver {
    fn on_event(&self, event: &ProgEvent) {
        match event {
            ProgEvent::ProgrammerFound { info } => {
                tracing::info!("Found Minipro {}", info);
            }
            ProgEvent::ChipIdVerified { chip_id } => {
                tracing::info!("Chip ID OK: 0x{:02x}", chip_id);
            }
            ProgEvent::StepStarted { operation, target } => {
                tracing::info!("{} {}...", operation, target);
            }
            ProgEvent::Progress {
                operation,
                target,
                percent,
            } => {
                tracing::debug!(operation = %operation, target = %target, progress = %format!("{}%", percent), "Progress");
            }
            ProgEvent::StepFinished { operation, target } => {
                tracing::info!("{} {}... OK", operation, target);
            }
            ProgEvent::StageChanged { from, to, skipped } => {
                tracing::debug!(from = %from, to = %to, skipped = skipped, "Stage changed");
            }
            ProgEvent::Warning { message } => {
                tracing::warn!("Warning: {}", message);
            }
            ProgEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

/// Observer that keeps every event, for tests and scripted front ends.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Progress percentages reported for `operation` on `target`, in order.
    pub fn progress(&self, operation: Operation, target: &str) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgEvent::Progress {
                    operation: op,
                    target: t,
                    percent,
                } if op == operation && t == target => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl ProgObserver for RecordingObserver {
    fn on_event(&self, event: &ProgEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
