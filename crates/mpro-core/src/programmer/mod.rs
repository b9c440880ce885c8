//! Command primitives of a chip programmer.
//!
//! The workflow only talks to a programmer through the [`Programmer`] trait:
//! - [`MiniproDevice`] frames the commands over any [`UsbTransport`](crate::transport::UsbTransport)
//! - [`MockProgrammer`] simulates a chip in memory for tests

pub mod minipro;
pub mod mock;

pub use minipro::MiniproDevice;
pub use mock::{Command, MockProgrammer};

use std::fmt;

use crate::device::MemoryKind;
use crate::error::Result;
use crate::protocol::constants::{FUSE_BUFFER_SIZE, MP_TL866A, MP_TL866CS};

/// Identification reported by the programmer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    pub model: u8,
    /// Firmware version, major in the high byte.
    pub firmware: u16,
}

impl SystemInfo {
    pub fn model_name(&self) -> &'static str {
        match self.model {
            MP_TL866A => "TL866A",
            MP_TL866CS => "TL866CS",
            _ => "unknown device",
        }
    }

    pub fn firmware_version(&self) -> String {
        format!("{:02}.{}", self.firmware >> 8, self.firmware & 0xFF)
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.model_name(), self.firmware_version())
    }
}

/// Blocking command set of a programmer bound to one target device.
pub trait Programmer {
    /// Open a transaction bracket.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Close the innermost transaction bracket.
    fn end_transaction(&mut self) -> Result<()>;

    /// Read `len` bytes of `kind` memory at protocol address `addr`.
    fn read_block(&mut self, kind: MemoryKind, addr: u32, len: usize) -> Result<Vec<u8>>;

    /// Write `data` to `kind` memory at protocol address `addr`.
    fn write_block(&mut self, kind: MemoryKind, addr: u32, data: &[u8]) -> Result<()>;

    /// Read the first `len` bytes of the fuse buffer behind `opcode`.
    fn read_fuses(&mut self, opcode: u8, len: usize) -> Result<Vec<u8>>;

    /// Write the first `len` bytes of `buf` to the fuse buffer behind `opcode`.
    fn write_fuses(&mut self, opcode: u8, len: usize, buf: &[u8; FUSE_BUFFER_SIZE]) -> Result<()>;

    /// Erase the chip and prepare it for writing.
    fn prepare_writing(&mut self) -> Result<()>;

    /// Query the status word; non-zero means overcurrent protection tripped.
    fn get_status(&mut self) -> Result<u16>;

    fn protect_off(&mut self) -> Result<()>;

    fn protect_on(&mut self) -> Result<()>;

    fn get_chip_id(&mut self) -> Result<u32>;

    fn system_info(&mut self) -> Result<SystemInfo>;

    /// Release the programmer. Called once at shutdown.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: Programmer + ?Sized> Programmer for &mut P {
    fn begin_transaction(&mut self) -> Result<()> {
        (**self).begin_transaction()
    }

    fn end_transaction(&mut self) -> Result<()> {
        (**self).end_transaction()
    }

    fn read_block(&mut self, kind: MemoryKind, addr: u32, len: usize) -> Result<Vec<u8>> {
        (**self).read_block(kind, addr, len)
    }

    fn write_block(&mut self, kind: MemoryKind, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write_block(kind, addr, data)
    }

    fn read_fuses(&mut self, opcode: u8, len: usize) -> Result<Vec<u8>> {
        (**self).read_fuses(opcode, len)
    }

    fn write_fuses(&mut self, opcode: u8, len: usize, buf: &[u8; FUSE_BUFFER_SIZE]) -> Result<()> {
        (**self).write_fuses(opcode, len, buf)
    }

    fn prepare_writing(&mut self) -> Result<()> {
        (**self).prepare_writing()
    }

    fn get_status(&mut self) -> Result<u16> {
        (**self).get_status()
    }

    fn protect_off(&mut self) -> Result<()> {
        (**self).protect_off()
    }

    fn protect_on(&mut self) -> Result<()> {
        (**self).protect_on()
    }

    fn get_chip_id(&mut self) -> Result<u32> {
        (**self).get_chip_id()
    }

    fn system_info(&mut self) -> Result<SystemInfo> {
        (**self).system_info()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_info_display() {
        let info = SystemInfo {
            model: MP_TL866CS,
            firmware: 0x0256,
        };
        assert_eq!(info.to_string(), "TL866CS v02.86");

        let unknown = SystemInfo {
            model: 9,
            firmware: 0x0100,
        };
        assert_eq!(unknown.model_name(), "unknown device");
    }
}
