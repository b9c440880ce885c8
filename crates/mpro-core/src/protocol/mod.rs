//! Protocol module - programmer command definitions.

pub mod constants;
pub mod frame;

pub use constants::*;
pub use frame::{FrameError, FrameHeader};
