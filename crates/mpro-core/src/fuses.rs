//! Fuse codec.
//!
//! Fuse declarations sharing an opcode form one group. A group is read with a
//! single command whose length is the sum of its members' lengths, and each
//! member is a little-endian integer at `(offset, length)` in the returned
//! 11-byte buffer. Writing packs the members the same way and sends one
//! command per group.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::device::{FuseDecl, validate_fuse_decls};
use crate::error::{ProgError, Result};
use crate::programmer::Programmer;
use crate::protocol::constants::FUSE_BUFFER_SIZE;

/// Declarations sharing one opcode.
#[derive(Debug, Clone, Copy)]
pub struct FuseGroup<'a> {
    pub opcode: u8,
    pub decls: &'a [FuseDecl],
}

impl FuseGroup<'_> {
    /// Command length: the sum of member lengths.
    pub fn length(&self) -> usize {
        self.decls.iter().map(|d| d.length as usize).sum()
    }

    /// Scatter a raw buffer into named values.
    pub fn unpack(&self, buf: &[u8; FUSE_BUFFER_SIZE], mut set: impl FnMut(&str, u32)) {
        for decl in self.decls {
            let field = &buf[decl.offset as usize..decl.end()];
            set(&decl.name, LittleEndian::read_uint(field, field.len()) as u32);
        }
    }

    /// Gather named values into a zeroed buffer.
    pub fn pack<E>(
        &self,
        mut get: impl FnMut(&str) -> std::result::Result<u32, E>,
    ) -> Result<[u8; FUSE_BUFFER_SIZE]>
    where
        ProgError: From<E>,
    {
        let mut buf = [0u8; FUSE_BUFFER_SIZE];
        for decl in self.decls {
            let value = get(&decl.name)?;
            if decl.length < 4 && value >> (8 * decl.length as u32) != 0 {
                return Err(ProgError::FuseValueOutOfRange {
                    name: decl.name.clone(),
                    value,
                    length: decl.length,
                });
            }
            let field = &mut buf[decl.offset as usize..decl.end()];
            let width = field.len();
            LittleEndian::write_uint(field, value as u64, width);
        }
        Ok(buf)
    }
}

/// A group packed and ready to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedFuses {
    pub opcode: u8,
    pub length: usize,
    pub buf: [u8; FUSE_BUFFER_SIZE],
}

/// Validated fuse table split into opcode groups.
#[derive(Debug, Clone)]
pub struct FuseCodec<'a> {
    groups: Vec<FuseGroup<'a>>,
}

impl<'a> FuseCodec<'a> {
    /// Validate `decls` and group them. Nothing is sent to the device when
    /// this fails.
    pub fn new(decls: &'a [FuseDecl]) -> Result<Self> {
        validate_fuse_decls(decls)?;
        let groups = decls
            .chunk_by(|a, b| a.opcode == b.opcode)
            .map(|decls| FuseGroup {
                opcode: decls[0].opcode,
                decls,
            })
            .collect();
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[FuseGroup<'a>] {
        &self.groups
    }

    /// Read every group and report each named value through `set`.
    pub fn decode<P: Programmer + ?Sized>(
        &self,
        programmer: &mut P,
        mut set: impl FnMut(&str, u32),
    ) -> Result<()> {
        for group in &self.groups {
            let length = group.length();
            let raw = programmer.read_fuses(group.opcode, length)?;
            debug!(opcode = %format!("0x{:02X}", group.opcode), length, ?raw, "Unpacking fuses");
            if raw.len() != length {
                return Err(ProgError::ShortTransfer {
                    operation: "read_fuses",
                    expected: length,
                    actual: raw.len(),
                });
            }

            let mut buf = [0u8; FUSE_BUFFER_SIZE];
            buf[..length].copy_from_slice(&raw);
            group.unpack(&buf, &mut set);
        }
        Ok(())
    }

    /// Pack every group from `get` without touching the device.
    pub fn pack<E>(
        &self,
        mut get: impl FnMut(&str) -> std::result::Result<u32, E>,
    ) -> Result<Vec<PackedFuses>>
    where
        ProgError: From<E>,
    {
        self.groups
            .iter()
            .map(|group| {
                Ok(PackedFuses {
                    opcode: group.opcode,
                    length: group.length(),
                    buf: group.pack(&mut get)?,
                })
            })
            .collect()
    }

    /// Send packed groups, one write command each.
    pub fn write_packed<P: Programmer + ?Sized>(
        &self,
        programmer: &mut P,
        packed: &[PackedFuses],
    ) -> Result<()> {
        for group in packed {
            debug!(opcode = %format!("0x{:02X}", group.opcode), length = group.length, "Writing fuse group");
            programmer.write_fuses(group.opcode, group.length, &group.buf)?;
        }
        Ok(())
    }

    /// Pack every group from `get`, then write them. A missing or
    /// out-of-range value fails before the first write command.
    pub fn encode<P: Programmer + ?Sized, E>(
        &self,
        programmer: &mut P,
        get: impl FnMut(&str) -> std::result::Result<u32, E>,
    ) -> Result<()>
    where
        ProgError: From<E>,
    {
        let packed = self.pack(get)?;
        self.write_packed(programmer, &packed)
    }
}
