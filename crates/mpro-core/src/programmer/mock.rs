//! In-memory programmer for testing workflows.

use std::collections::BTreeMap;

use super::{Programmer, SystemInfo};
use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::protocol::constants::{FUSE_BUFFER_SIZE, MP_TL866CS};
use crate::transport::TransportError;

/// A command as seen by the simulated programmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin,
    End,
    ReadBlock { kind: MemoryKind, addr: u32, len: usize },
    WriteBlock { kind: MemoryKind, addr: u32, len: usize },
    ReadFuses { opcode: u8, len: usize },
    WriteFuses { opcode: u8, len: usize },
    PrepareWriting,
    GetStatus,
    ProtectOff,
    ProtectOn,
    GetChipId,
    SystemInfo,
    Close,
}

type FailPredicate = Box<dyn Fn(&Command) -> bool + Send>;

/// Simulated chip behind a programmer.
///
/// Memories are byte arrays sized from the device descriptor; word-addressed
/// devices get their addresses scaled back to byte offsets. Every command is
/// logged, and bracket depth is tracked so tests can check that every
/// transaction opened was closed.
pub struct MockProgrammer {
    code: Vec<u8>,
    data: Vec<u8>,
    word_addressed: bool,
    fuse_banks: BTreeMap<u8, [u8; FUSE_BUFFER_SIZE]>,
    chip_id: u32,
    status: u16,
    info: SystemInfo,
    protected: bool,
    depth: usize,
    max_depth: usize,
    closed: usize,
    log: Vec<Command>,
    fail_when: Option<FailPredicate>,
    corrupt: Option<(MemoryKind, usize)>,
    fuse_reply_cap: Option<usize>,
}

impl MockProgrammer {
    pub fn for_device(device: &DeviceDescriptor) -> Self {
        Self {
            code: vec![0xFF; device.code_memory_size],
            data: vec![0xFF; device.data_memory_size],
            word_addressed: device.capabilities.word_addressed,
            fuse_banks: BTreeMap::new(),
            chip_id: device.chip_id.unwrap_or(0),
            status: 0,
            info: SystemInfo {
                model: MP_TL866CS,
                firmware: 0x0256,
            },
            protected: false,
            depth: 0,
            max_depth: 0,
            closed: 0,
            log: Vec::new(),
            fail_when: None,
            corrupt: None,
            fuse_reply_cap: None,
        }
    }

    /// Preload a memory image.
    pub fn with_memory(mut self, kind: MemoryKind, contents: &[u8]) -> Self {
        let mem = self.memory_mut(kind);
        mem[..contents.len()].copy_from_slice(contents);
        self
    }

    /// Preload a fuse buffer.
    pub fn with_fuse_bank(mut self, opcode: u8, bank: [u8; FUSE_BUFFER_SIZE]) -> Self {
        self.fuse_banks.insert(opcode, bank);
        self
    }

    pub fn with_chip_id(mut self, chip_id: u32) -> Self {
        self.chip_id = chip_id;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Fail every command matching `predicate` with a transport error.
    pub fn fail_when(mut self, predicate: impl Fn(&Command) -> bool + Send + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Flip one byte of every readback of `kind` memory at `offset`.
    pub fn corrupt_readback(mut self, kind: MemoryKind, offset: usize) -> Self {
        self.corrupt = Some((kind, offset));
        self
    }

    /// Answer fuse reads with at most `len` bytes.
    pub fn truncate_fuse_reads(mut self, len: usize) -> Self {
        self.fuse_reply_cap = Some(len);
        self
    }

    pub fn memory(&self, kind: MemoryKind) -> &[u8] {
        match kind {
            MemoryKind::Code => &self.code,
            MemoryKind::Data => &self.data,
        }
    }

    fn memory_mut(&mut self, kind: MemoryKind) -> &mut Vec<u8> {
        match kind {
            MemoryKind::Code => &mut self.code,
            MemoryKind::Data => &mut self.data,
        }
    }

    pub fn fuse_bank(&self, opcode: u8) -> Option<&[u8; FUSE_BUFFER_SIZE]> {
        self.fuse_banks.get(&opcode)
    }

    pub fn log(&self) -> &[Command] {
        &self.log
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.log.iter().filter(|c| predicate(c)).count()
    }

    /// Brackets currently open.
    pub fn open_brackets(&self) -> usize {
        self.depth
    }

    /// Deepest bracket nesting seen.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn close_count(&self) -> usize {
        self.closed
    }

    fn record(&mut self, command: Command) -> Result<()> {
        let fail = self.fail_when.as_ref().is_some_and(|p| p(&command));
        self.log.push(command);
        if fail {
            return Err(ProgError::Transport(TransportError::WriteFailed(
                "injected failure".into(),
            )));
        }
        Ok(())
    }

    fn byte_range(&self, kind: MemoryKind, addr: u32, len: usize) -> Result<std::ops::Range<usize>> {
        let start = if self.word_addressed {
            (addr as usize) << 1
        } else {
            addr as usize
        };
        let end = start + len;
        if end > self.memory(kind).len() {
            return Err(ProgError::Transport(TransportError::ReadFailed(format!(
                "{kind} access {start}..{end} out of bounds"
            ))));
        }
        Ok(start..end)
    }
}

impl Programmer for MockProgrammer {
    fn begin_transaction(&mut self) -> Result<()> {
        self.record(Command::Begin)?;
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        self.record(Command::End)?;
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }

    fn read_block(&mut self, kind: MemoryKind, addr: u32, len: usize) -> Result<Vec<u8>> {
        self.record(Command::ReadBlock { kind, addr, len })?;
        let range = self.byte_range(kind, addr, len)?;
        let mut out = self.memory(kind)[range.clone()].to_vec();
        if let Some((corrupt_kind, offset)) = self.corrupt
            && corrupt_kind == kind
            && range.contains(&offset)
        {
            out[offset - range.start] ^= 0xFF;
        }
        Ok(out)
    }

    fn write_block(&mut self, kind: MemoryKind, addr: u32, data: &[u8]) -> Result<()> {
        self.record(Command::WriteBlock {
            kind,
            addr,
            len: data.len(),
        })?;
        let range = self.byte_range(kind, addr, data.len())?;
        self.memory_mut(kind)[range].copy_from_slice(data);
        Ok(())
    }

    fn read_fuses(&mut self, opcode: u8, len: usize) -> Result<Vec<u8>> {
        self.record(Command::ReadFuses { opcode, len })?;
        let bank = self
            .fuse_banks
            .get(&opcode)
            .copied()
            .unwrap_or([0u8; FUSE_BUFFER_SIZE]);
        let len = self.fuse_reply_cap.map_or(len, |cap| len.min(cap));
        Ok(bank[..len.min(FUSE_BUFFER_SIZE)].to_vec())
    }

    fn write_fuses(&mut self, opcode: u8, len: usize, buf: &[u8; FUSE_BUFFER_SIZE]) -> Result<()> {
        self.record(Command::WriteFuses { opcode, len })?;
        let bank = self.fuse_banks.entry(opcode).or_insert([0u8; FUSE_BUFFER_SIZE]);
        let len = len.min(FUSE_BUFFER_SIZE);
        bank[..len].copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn prepare_writing(&mut self) -> Result<()> {
        self.record(Command::PrepareWriting)?;
        self.code.fill(0xFF);
        self.data.fill(0xFF);
        Ok(())
    }

    fn get_status(&mut self) -> Result<u16> {
        self.record(Command::GetStatus)?;
        Ok(self.status)
    }

    fn protect_off(&mut self) -> Result<()> {
        self.record(Command::ProtectOff)?;
        self.protected = false;
        Ok(())
    }

    fn protect_on(&mut self) -> Result<()> {
        self.record(Command::ProtectOn)?;
        self.protected = true;
        Ok(())
    }

    fn get_chip_id(&mut self) -> Result<u32> {
        self.record(Command::GetChipId)?;
        Ok(self.chip_id)
    }

    fn system_info(&mut self) -> Result<SystemInfo> {
        self.record(Command::SystemInfo)?;
        Ok(self.info)
    }

    fn close(&mut self) -> Result<()> {
        self.record(Command::Close)?;
        self.closed += 1;
        Ok(())
    }
}
