//! Write workflow stages.

use std::fmt;

use crate::events::{ProgEvent, ProgObserver};

/// Stage of a write run.
///
/// Stages only move forward; a skipped step still advances the stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteStage {
    #[default]
    Idle,
    /// Input file checked against the region.
    Validated,
    /// Chip erased, or erase skipped.
    EraseDone,
    /// Write protection cleared, or left alone.
    ProtectOffDone,
    /// Payload written and read back.
    WrittenVerified,
    /// Write protection restored, or left alone.
    ProtectOnDone,
    Done,
    Failed,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStage::Idle => write!(f, "IDLE"),
            WriteStage::Validated => write!(f, "VALIDATED"),
            WriteStage::EraseDone => write!(f, "ERASE_DONE"),
            WriteStage::ProtectOffDone => write!(f, "PROTECT_OFF_DONE"),
            WriteStage::WrittenVerified => write!(f, "WRITTEN_VERIFIED"),
            WriteStage::ProtectOnDone => write!(f, "PROTECT_ON_DONE"),
            WriteStage::Done => write!(f, "DONE"),
            WriteStage::Failed => write!(f, "FAILED"),
        }
    }
}

impl WriteStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WriteStage::Done | WriteStage::Failed)
    }
}

/// Current stage plus transition reporting.
#[derive(Debug, Default)]
pub struct StageTracker {
    stage: WriteStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> WriteStage {
        self.stage
    }

    /// Move to `next`, reporting the transition.
    pub fn goto<O: ProgObserver + ?Sized>(&mut self, next: WriteStage, skipped: bool, observer: &O) {
        debug_assert!(
            next == WriteStage::Failed || next > self.stage,
            "write stage moved backwards: {} -> {}",
            self.stage,
            next
        );
        tracing::info!(from = %self.stage, to = %next, skipped, "Stage transition");
        observer.on_event(&ProgEvent::StageChanged {
            from: self.stage,
            to: next,
            skipped,
        });
        self.stage = next;
    }

    /// Enter [`WriteStage::Failed`] unless already terminal.
    pub fn fail<O: ProgObserver + ?Sized>(&mut self, observer: &O) {
        if !self.stage.is_terminal() {
            self.goto(WriteStage::Failed, false, observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;

    #[test]
    fn test_stage_order() {
        assert!(WriteStage::Idle < WriteStage::Validated);
        assert!(WriteStage::WrittenVerified < WriteStage::ProtectOnDone);
        assert!(WriteStage::Done.is_terminal());
        assert!(WriteStage::Failed.is_terminal());
        assert!(!WriteStage::EraseDone.is_terminal());
    }

    #[test]
    fn test_tracker_reports_transitions() {
        let observer = RecordingObserver::new();
        let mut tracker = StageTracker::new();
        tracker.goto(WriteStage::Validated, false, &observer);
        tracker.goto(WriteStage::EraseDone, true, &observer);
        tracker.fail(&observer);
        tracker.fail(&observer);

        assert_eq!(tracker.stage(), WriteStage::Failed);
        assert_eq!(
            observer.events(),
            vec![
                ProgEvent::StageChanged {
                    from: WriteStage::Idle,
                    to: WriteStage::Validated,
                    skipped: false,
                },
                ProgEvent::StageChanged {
                    from: WriteStage::Validated,
                    to: WriteStage::EraseDone,
                    skipped: true,
                },
                ProgEvent::StageChanged {
                    from: WriteStage::EraseDone,
                    to: WriteStage::Failed,
                    skipped: false,
                },
            ]
        );
    }
}
