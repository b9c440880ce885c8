//! Read and write actions.

pub mod machine;
pub mod read;
pub mod request;
pub mod write;

pub use machine::{StageTracker, WriteStage};
pub use read::run_read;
pub use request::{
    Action, ActionRequest, CascadeStep, MemoryRegion, PlannedRead, ProgrammingMode, READ_CASCADE,
    RegionPlan, SizeCheck,
};
pub use write::{WriteWorkflow, run_write};

/// Event target name for fuse steps.
const FUSES_TARGET: &str = "fuses";
