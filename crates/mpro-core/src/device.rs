//! Static description of a supported chip.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProgError, Result};
use crate::protocol::constants::{FUSE_BUFFER_SIZE, MAX_CHIP_ID_BYTES, MAX_FUSE_LENGTH};

/// Memory areas moved by block transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Code,
    Data,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Code => write!(f, "Code"),
            MemoryKind::Data => write!(f, "Data"),
        }
    }
}

/// Per-device protocol quirks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Block addresses are sent in 16-bit words rather than bytes.
    pub word_addressed: bool,
    /// The device has write-protect bits that can be toggled.
    pub write_protect: bool,
}

/// One named fuse field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuseDecl {
    pub name: String,
    /// Command opcode; declarations sharing one are read and written together.
    pub opcode: u8,
    /// Byte offset in the opcode's buffer.
    pub offset: u8,
    /// Field width in bytes (1-4).
    pub length: u8,
}

impl FuseDecl {
    pub fn new(name: impl Into<String>, opcode: u8, offset: u8, length: u8) -> Self {
        Self {
            name: name.into(),
            opcode,
            offset,
            length,
        }
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }
}

/// Capability and geometry record for one chip model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    pub protocol_id: u32,
    #[serde(default)]
    pub variant: u8,
    #[serde(default)]
    pub chip_id: Option<u32>,
    #[serde(default)]
    pub chip_id_bytes: u8,
    pub code_memory_size: usize,
    #[serde(default)]
    pub data_memory_size: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub fuses: Vec<FuseDecl>,
}

impl DeviceDescriptor {
    pub fn has_data_memory(&self) -> bool {
        self.data_memory_size > 0
    }

    pub fn has_fuses(&self) -> bool {
        !self.fuses.is_empty()
    }

    pub fn supports_write_protect(&self) -> bool {
        self.capabilities.write_protect
    }

    pub fn region_size(&self, kind: MemoryKind) -> usize {
        match kind {
            MemoryKind::Code => self.code_memory_size,
            MemoryKind::Data => self.data_memory_size,
        }
    }

    /// Expected chip identifier and its width, when the device declares one.
    pub fn expected_chip_id(&self) -> Option<(u32, u8)> {
        match self.chip_id {
            Some(id) if id != 0 && self.chip_id_bytes != 0 => Some((id, self.chip_id_bytes)),
            _ => None,
        }
    }

    /// Check geometry and the fuse table. Run once when a descriptor is loaded.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ProgError::InvalidDevice {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(invalid("block sizes must be non-zero"));
        }
        if self.code_memory_size == 0 {
            return Err(invalid("code memory size must be non-zero"));
        }
        if self.chip_id_bytes > MAX_CHIP_ID_BYTES {
            return Err(invalid("chip id is wider than 4 bytes"));
        }
        validate_fuse_decls(&self.fuses)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validate a fuse table.
///
/// Declarations must be non-decreasing by opcode. Inside one opcode group
/// every field must be 1-4 bytes wide and not overlap another field. The
/// group is transferred as its summed length, so fields must also end inside
/// that length, which leaves no gaps.
pub fn validate_fuse_decls(fuses: &[FuseDecl]) -> Result<()> {
    let layout = |decl: &FuseDecl, reason: String| ProgError::FuseLayout {
        name: decl.name.clone(),
        reason,
    };

    for (i, decl) in fuses.iter().enumerate() {
        if let Some(prev) = i.checked_sub(1).map(|p| &fuses[p])
            && decl.opcode < prev.opcode
        {
            return Err(ProgError::UnsortedFuses {
                name: decl.name.clone(),
                opcode: decl.opcode,
                previous: prev.opcode,
            });
        }
        if decl.length == 0 || decl.length as usize > MAX_FUSE_LENGTH {
            return Err(layout(decl, format!("length {} is not 1-4", decl.length)));
        }
        if decl.end() > FUSE_BUFFER_SIZE {
            return Err(layout(
                decl,
                format!("bytes {}..{} exceed the {FUSE_BUFFER_SIZE}-byte buffer", decl.offset, decl.end()),
            ));
        }
        if fuses[..i].iter().any(|other| other.name == decl.name) {
            return Err(layout(decl, "duplicate name".to_string()));
        }
        let group = fuses[..i].iter().filter(|other| other.opcode == decl.opcode);
        for other in group.clone() {
            if (decl.offset as usize) < other.end() && (other.offset as usize) < decl.end() {
                return Err(layout(decl, format!("overlaps `{}`", other.name)));
            }
        }
        let total: usize = group.map(|other| other.length as usize).sum::<usize>() + decl.length as usize;
        if total > FUSE_BUFFER_SIZE {
            return Err(layout(
                decl,
                format!("opcode 0x{:02X} group needs {total} bytes", decl.opcode),
            ));
        }
    }
    for group in fuses.chunk_by(|a, b| a.opcode == b.opcode) {
        let total: usize = group.iter().map(|d| d.length as usize).sum();
        if let Some(decl) = group.iter().find(|d| d.end() > total) {
            return Err(layout(
                decl,
                format!(
                    "bytes {}..{} lie past the {total}-byte opcode 0x{:02X} transfer",
                    decl.offset,
                    decl.end(),
                    decl.opcode
                ),
            ));
        }
    }
    Ok(())
}
