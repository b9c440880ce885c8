//! Command frames exchanged with the programmer.
//!
//! Every request starts with the same 12-byte header:
//!
//! | offset | field                                  |
//! |--------|----------------------------------------|
//! | 0      | opcode                                 |
//! | 1      | protocol id (low byte)                 |
//! | 2      | protocol variant                       |
//! | 3      | reserved (0)                           |
//! | 4      | data memory size, high byte            |
//! | 5..10  | reserved (0)                           |
//! | 11     | ICSP mode                              |
//!
//! Block and fuse commands then overwrite bytes 2..7 with a little-endian
//! length (2 bytes) and address (3 bytes). Write payloads and read responses
//! carry their data from offset 7.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::*;
use crate::device::DeviceDescriptor;
use crate::programmer::SystemInfo;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Response too short: expected {expected}, got {actual}")]
    ResponseTooShort { expected: usize, actual: usize },
    #[error("Field `{field}` out of range: {value:#X} (max {max:#X})")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Common request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u8,
    pub protocol_id: u8,
    pub variant: u8,
    pub data_memory_size: usize,
    pub icsp: u8,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn for_device(opcode: u8, device: &DeviceDescriptor, icsp: u8) -> Self {
        Self {
            opcode,
            protocol_id: (device.protocol_id & 0xFF) as u8,
            variant: device.variant,
            data_memory_size: device.data_memory_size,
            icsp,
        }
    }

    /// Build a zero-filled frame of `size` bytes carrying this header.
    pub fn to_frame(&self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size.max(Self::SIZE)];
        buf[0] = self.opcode;
        buf[1] = self.protocol_id;
        buf[2] = self.variant;
        buf[4] = ((self.data_memory_size >> 8) & 0xFF) as u8;
        buf[11] = self.icsp;
        buf
    }
}

fn check_field(field: &'static str, value: u64, max: u64) -> Result<(), FrameError> {
    if value > max {
        return Err(FrameError::FieldOverflow { field, value, max });
    }
    Ok(())
}

fn write_len_addr(buf: &mut [u8], len: usize, addr: u32) -> Result<(), FrameError> {
    check_field("length", len as u64, u16::MAX as u64)?;
    check_field("address", addr as u64, 0xFF_FFFF)?;
    let mut cursor = Cursor::new(&mut buf[2..FRAME_PAYLOAD_OFFSET]);
    cursor.write_u16::<LittleEndian>(len as u16)?;
    cursor.write_u24::<LittleEndian>(addr)?;
    Ok(())
}

/// Block read request: header + length + address.
pub fn block_read_request(header: &FrameHeader, addr: u32, len: usize) -> Result<Vec<u8>, FrameError> {
    let mut frame = header.to_frame(READ_REQUEST_SIZE);
    write_len_addr(&mut frame, len, addr)?;
    Ok(frame)
}

/// Block write request: header + length + address + payload.
pub fn block_write_request(
    header: &FrameHeader,
    addr: u32,
    data: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let mut frame = header.to_frame(FRAME_PAYLOAD_OFFSET + data.len());
    write_len_addr(&mut frame, data.len(), addr)?;
    frame.truncate(FRAME_PAYLOAD_OFFSET);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Fuse read request for `len` bytes of the opcode's buffer.
pub fn fuse_read_request(header: &FrameHeader, len: usize) -> Result<Vec<u8>, FrameError> {
    let mut frame = header.to_frame(READ_REQUEST_SIZE);
    write_len_addr(&mut frame, len, 0)?;
    Ok(frame)
}

/// Fuse write request carrying the first `len` bytes of `buf`.
pub fn fuse_write_request(
    header: &FrameHeader,
    len: usize,
    buf: &[u8; FUSE_BUFFER_SIZE],
) -> Result<Vec<u8>, FrameError> {
    check_field("fuse length", len as u64, FUSE_BUFFER_SIZE as u64)?;
    block_write_request(header, 0, &buf[..len])
}

/// Extract the `len`-byte payload of a fuse read response.
pub fn parse_fuse_response(response: &[u8], len: usize) -> Result<Vec<u8>, FrameError> {
    let expected = FRAME_PAYLOAD_OFFSET + len;
    if response.len() < expected {
        return Err(FrameError::ResponseTooShort {
            expected,
            actual: response.len(),
        });
    }
    Ok(response[FRAME_PAYLOAD_OFFSET..expected].to_vec())
}

/// Chip identifiers are reported big-endian from offset 2.
pub fn parse_chip_id(response: &[u8], width: u8) -> Result<u32, FrameError> {
    let width = width as usize;
    check_field("chip id width", width as u64, MAX_CHIP_ID_BYTES as u64)?;
    if width == 0 {
        return Ok(0);
    }
    let expected = 2 + width;
    if response.len() < expected {
        return Err(FrameError::ResponseTooShort {
            expected,
            actual: response.len(),
        });
    }
    Ok(BigEndian::read_uint(&response[2..expected], width) as u32)
}

pub fn parse_system_info(response: &[u8]) -> Result<SystemInfo, FrameError> {
    if response.len() < SYSTEM_INFO_RESPONSE_SIZE {
        return Err(FrameError::ResponseTooShort {
            expected: SYSTEM_INFO_RESPONSE_SIZE,
            actual: response.len(),
        });
    }
    let mut cursor = Cursor::new(&response[4..7]);
    let firmware = cursor.read_u16::<LittleEndian>()?;
    let model = cursor.read_u8()?;
    Ok(SystemInfo { model, firmware })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;

    #[test]
    fn test_header_layout() {
        let mut device = sample_device();
        device.protocol_id = 0x10063;
        device.variant = 0x2A;
        device.data_memory_size = 0x0200;
        let header = FrameHeader::for_device(MP_READ_CODE, &device, MP_ICSP_ENABLE | MP_ICSP_VCC);

        let frame = header.to_frame(SHORT_FRAME_SIZE);
        assert_eq!(frame.len(), SHORT_FRAME_SIZE);
        assert_eq!(frame[0], MP_READ_CODE);
        assert_eq!(frame[1], 0x63);
        assert_eq!(frame[2], 0x2A);
        assert_eq!(frame[4], 0x02);
        assert_eq!(frame[11], 0x81);
    }

    #[test]
    fn test_block_requests() {
        let header = FrameHeader::for_device(MP_WRITE_CODE, &sample_device(), 0);

        let read = block_read_request(&header, 0x012345, 0x40).unwrap();
        assert_eq!(read.len(), READ_REQUEST_SIZE);
        assert_eq!(&read[2..7], &[0x40, 0x00, 0x45, 0x23, 0x01]);

        let write = block_write_request(&header, 0x20, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(write.len(), FRAME_PAYLOAD_OFFSET + 3);
        assert_eq!(&write[2..7], &[0x03, 0x00, 0x20, 0x00, 0x00]);
        assert_eq!(&write[7..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_address_overflow() {
        let header = FrameHeader::for_device(MP_READ_CODE, &sample_device(), 0);
        let err = block_read_request(&header, 0x0100_0000, 16).unwrap_err();
        assert!(matches!(err, FrameError::FieldOverflow { field: "address", .. }));
    }

    #[test]
    fn test_chip_id_and_system_info() {
        let mut resp = [0u8; CHIP_ID_RESPONSE_SIZE];
        resp[2..5].copy_from_slice(&[0x1E, 0x93, 0x07]);
        assert_eq!(parse_chip_id(&resp, 3).unwrap(), 0x1E9307);
        assert_eq!(parse_chip_id(&resp, 0).unwrap(), 0);

        let mut info = [0u8; SYSTEM_INFO_RESPONSE_SIZE];
        info[4] = 0x56;
        info[5] = 0x02;
        info[6] = MP_TL866CS;
        let parsed = parse_system_info(&info).unwrap();
        assert_eq!(parsed.model, MP_TL866CS);
        assert_eq!(parsed.firmware, 0x0256);
        assert!(parse_system_info(&info[..10]).is_err());
    }
}
