//! mpro-core: memory transfer, fuse codec and read/write workflow for
//! MiniPro-style chip programmers.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: raw USB frame exchange (nusb, mock)
//! - **Protocol**: opcodes and command frame layout
//! - **Programmer**: command primitives over a transport, plus a simulated chip
//! - **Transfer / Fuses / Verify**: block chunking, fuse packing, readback compare
//! - **Workflow**: read cascade and the write stage machine, inside transaction brackets
//! - **Session**: startup checks, action dispatch and shutdown
//! - **Registry**: device descriptors by name
//! - **Events**: observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use mpro_core::{ActionRequest, DeviceRegistry, MiniproDevice, NusbTransport, ProgSession};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = DeviceRegistry::builtin()?;
//! let device = registry.lookup("ATMEGA8")?.clone();
//! let programmer = MiniproDevice::new(NusbTransport::open()?, device.clone(), 0);
//!
//! let mut session = ProgSession::new(programmer, device)?;
//! session.run(&ActionRequest::read("atmega8.bin"))?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod fuses;
pub mod programmer;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transaction;
pub mod transfer;
pub mod transport;
pub mod verify;
pub mod workflow;

// Re-exports for convenience
pub use config::{ConfigError, FuseConfig};
pub use device::{Capabilities, DeviceDescriptor, FuseDecl, MemoryKind};
pub use error::{ErrorKind, ProgError, Result};
pub use events::{NullObserver, Operation, ProgEvent, ProgObserver, TracingObserver};
pub use fuses::FuseCodec;
pub use programmer::{MiniproDevice, MockProgrammer, Programmer, SystemInfo};
pub use registry::DeviceRegistry;
pub use session::ProgSession;
pub use transaction::Transaction;
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
pub use workflow::{
    Action, ActionRequest, MemoryRegion, ProgrammingMode, SizeCheck, WriteStage,
};
