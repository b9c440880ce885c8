//! Block transfers of Code/Data memory.
//!
//! A region of `size` bytes is moved in `ceil(size / chunk)` blocks. Block
//! `i` starts at byte `i * chunk` and is sent to protocol address `i * chunk`
//! (halved on word-addressed devices); every block is `chunk` bytes except
//! the last, which carries the remainder. The same chunk size drives the
//! count, the addresses and the truncation of the last block.

use tracing::{debug, instrument};

use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::events::{Operation, ProgEvent, ProgObserver};
use crate::programmer::Programmer;

/// One block of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    /// Protocol address sent to the programmer.
    pub address: usize,
    /// Byte offset in the region buffer.
    pub offset: usize,
    pub len: usize,
}

/// Iterator over the blocks covering `[0, size)`.
#[derive(Debug, Clone)]
pub struct BlockPlan {
    size: usize,
    chunk_size: usize,
    word_addressed: bool,
    next: usize,
}

impl BlockPlan {
    pub fn new(size: usize, chunk_size: usize, word_addressed: bool) -> Self {
        Self {
            size,
            chunk_size,
            word_addressed,
            next: 0,
        }
    }

    /// Get total number of blocks (including partial).
    pub fn total(&self) -> usize {
        if self.chunk_size == 0 {
            0
        } else {
            self.size.div_ceil(self.chunk_size)
        }
    }
}

impl Iterator for BlockPlan {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next >= self.total() {
            return None;
        }
        let index = self.next;
        let offset = index * self.chunk_size;
        let len = self.chunk_size.min(self.size - offset);
        let address = if self.word_addressed {
            offset >> 1
        } else {
            offset
        };
        self.next += 1;
        Some(Block {
            index,
            address,
            offset,
            len,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockPlan {}

/// Progress after `done` of `total` blocks, rounded down.
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((done * 100) / total) as u8
    }
}

fn protocol_address(block: &Block) -> Result<u32> {
    u32::try_from(block.address).map_err(|_| {
        ProgError::usage(format!("block address 0x{:X} out of range", block.address))
    })
}

/// Read `size` bytes of `kind` memory in read-block-sized chunks.
#[instrument(level = "debug", skip(programmer, device, observer), fields(device = %device.name))]
pub fn read_region<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    kind: MemoryKind,
    size: usize,
    observer: &O,
) -> Result<Vec<u8>>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    let target = kind.to_string();
    let plan = BlockPlan::new(size, device.read_buffer_size, device.capabilities.word_addressed);
    let total = plan.total();
    let mut buf = vec![0u8; size];

    observer.on_event(&ProgEvent::StepStarted {
        operation: Operation::Reading,
        target: target.clone(),
    });
    for block in plan {
        let data = programmer.read_block(kind, protocol_address(&block)?, block.len)?;
        if data.len() != block.len {
            return Err(ProgError::ShortTransfer {
                operation: "read_block",
                expected: block.len,
                actual: data.len(),
            });
        }
        buf[block.offset..block.offset + block.len].copy_from_slice(&data);
        observer.on_event(&ProgEvent::Progress {
            operation: Operation::Reading,
            target: target.clone(),
            percent: progress_percent(block.index + 1, total),
        });
    }
    debug!(blocks = total, bytes = size, "Region read");
    observer.on_event(&ProgEvent::StepFinished {
        operation: Operation::Reading,
        target,
    });
    Ok(buf)
}

/// Write `data` to `kind` memory in write-block-sized chunks.
#[instrument(level = "debug", skip(programmer, device, data, observer), fields(device = %device.name, size = data.len()))]
pub fn write_region<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    kind: MemoryKind,
    data: &[u8],
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    let target = kind.to_string();
    let plan = BlockPlan::new(
        data.len(),
        device.write_buffer_size,
        device.capabilities.word_addressed,
    );
    let total = plan.total();

    observer.on_event(&ProgEvent::StepStarted {
        operation: Operation::Writing,
        target: target.clone(),
    });
    for block in plan {
        let chunk = &data[block.offset..block.offset + block.len];
        programmer.write_block(kind, protocol_address(&block)?, chunk)?;
        observer.on_event(&ProgEvent::Progress {
            operation: Operation::Writing,
            target: target.clone(),
            percent: progress_percent(block.index + 1, total),
        });
    }
    debug!(blocks = total, bytes = data.len(), "Region written");
    observer.on_event(&ProgEvent::StepFinished {
        operation: Operation::Writing,
        target,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::programmer::{Command, MockProgrammer};

    fn lengths(plan: BlockPlan) -> Vec<usize> {
        plan.map(|b| b.len).collect()
    }

    #[test]
    fn test_block_count_and_coverage() {
        for size in 1..=300 {
            for chunk in [1, 3, 16, 64, 100, 512] {
                let plan = BlockPlan::new(size, chunk, false);
                assert_eq!(plan.total(), size.div_ceil(chunk));
                assert_eq!(plan.len(), plan.total());

                let mut expected_offset = 0;
                for block in plan {
                    assert_eq!(block.offset, expected_offset);
                    assert!(block.len > 0 && block.len <= chunk);
                    expected_offset += block.len;
                }
                assert_eq!(expected_offset, size);
            }
        }
    }

    #[test]
    fn test_exact_and_partial_last_block() {
        assert_eq!(lengths(BlockPlan::new(128, 64, false)), vec![64, 64]);
        assert_eq!(lengths(BlockPlan::new(100, 64, false)), vec![64, 36]);
        assert_eq!(lengths(BlockPlan::new(0, 64, false)), Vec::<usize>::new());
    }

    #[test]
    fn test_address_translation() {
        let bytes: Vec<usize> = BlockPlan::new(256, 64, false).map(|b| b.address).collect();
        assert_eq!(bytes, vec![0, 64, 128, 192]);

        let words: Vec<usize> = BlockPlan::new(256, 64, true).map(|b| b.address).collect();
        assert_eq!(words, vec![0, 32, 64, 96]);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn test_read_region_blocks() {
        let device = sample_device();
        let image: Vec<u8> = (0..128).map(|i| i as u8).collect();
        let mut mock = MockProgrammer::for_device(&device).with_memory(MemoryKind::Code, &image);
        let observer = RecordingObserver::new();

        let data = read_region(&mut mock, &device, MemoryKind::Code, 128, &observer).unwrap();

        assert_eq!(data, image);
        assert_eq!(
            mock.log(),
            &[
                Command::ReadBlock { kind: MemoryKind::Code, addr: 0, len: 64 },
                Command::ReadBlock { kind: MemoryKind::Code, addr: 64, len: 64 },
            ]
        );
        assert_eq!(observer.progress(Operation::Reading, "Code"), vec![50, 100]);
    }

    #[test]
    fn test_write_region_uses_write_block_size() {
        let mut device = sample_device();
        device.code_memory_size = 100;
        device.read_buffer_size = 64;
        device.write_buffer_size = 32;
        device.capabilities.word_addressed = true;
        let mut mock = MockProgrammer::for_device(&device);
        let image = vec![0x5A; 100];

        write_region(&mut mock, &device, MemoryKind::Code, &image, &NullObserver).unwrap();

        let writes: Vec<(u32, usize)> = mock
            .log()
            .iter()
            .filter_map(|c| match c {
                Command::WriteBlock { addr, len, .. } => Some((*addr, *len)),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![(0, 32), (16, 32), (32, 32), (48, 4)]);
        assert_eq!(mock.memory(MemoryKind::Code), &image[..]);
    }

    #[test]
    fn test_block_failure_aborts_transfer() {
        let device = sample_device();
        let mut mock = MockProgrammer::for_device(&device)
            .fail_when(|c| matches!(c, Command::ReadBlock { addr: 0, .. }));

        let err = read_region(&mut mock, &device, MemoryKind::Code, 128, &NullObserver).unwrap_err();
        assert!(matches!(err, ProgError::Transport(_)));
        assert_eq!(mock.log().len(), 1);
    }
}
