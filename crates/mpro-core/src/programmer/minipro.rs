//! MiniPro command framing over a raw USB transport.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, instrument, trace};

use super::{Programmer, SystemInfo};
use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::protocol::constants::*;
use crate::protocol::frame::{self, FrameHeader};
use crate::transport::UsbTransport;

/// A MiniPro programmer driving one target device.
pub struct MiniproDevice<T: UsbTransport> {
    transport: T,
    device: DeviceDescriptor,
    icsp: u8,
}

impl<T: UsbTransport> MiniproDevice<T> {
    pub fn new(transport: T, device: DeviceDescriptor, icsp: u8) -> Self {
        Self {
            transport,
            device,
            icsp,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn header(&self, opcode: u8) -> FrameHeader {
        FrameHeader::for_device(opcode, &self.device, self.icsp)
    }

    fn send_short(&self, opcode: u8) -> Result<()> {
        let frame = self.header(opcode).to_frame(SHORT_FRAME_SIZE);
        trace!(opcode = %format!("0x{:02X}", opcode), "Short command");
        self.transport.send(&frame)?;
        Ok(())
    }

    fn read_exact(&self, operation: &'static str, len: usize) -> Result<Vec<u8>> {
        let data = self.transport.read(len)?;
        if data.len() != len {
            return Err(ProgError::ShortTransfer {
                operation,
                expected: len,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

fn read_opcode(kind: MemoryKind) -> u8 {
    match kind {
        MemoryKind::Code => MP_READ_CODE,
        MemoryKind::Data => MP_READ_DATA,
    }
}

fn write_opcode(kind: MemoryKind) -> u8 {
    match kind {
        MemoryKind::Code => MP_WRITE_CODE,
        MemoryKind::Data => MP_WRITE_DATA,
    }
}

impl<T: UsbTransport> Programmer for MiniproDevice<T> {
    fn begin_transaction(&mut self) -> Result<()> {
        self.send_short(MP_BEGIN_TRANSACTION)
    }

    fn end_transaction(&mut self) -> Result<()> {
        self.send_short(MP_END_TRANSACTION)
    }

    #[instrument(level = "trace", skip(self), fields(addr = %format!("0x{:06X}", addr)))]
    fn read_block(&mut self, kind: MemoryKind, addr: u32, len: usize) -> Result<Vec<u8>> {
        let request = frame::block_read_request(&self.header(read_opcode(kind)), addr, len)?;
        self.transport.send(&request)?;
        self.read_exact("read_block", len)
    }

    #[instrument(level = "trace", skip(self, data), fields(addr = %format!("0x{:06X}", addr), len = data.len()))]
    fn write_block(&mut self, kind: MemoryKind, addr: u32, data: &[u8]) -> Result<()> {
        let request = frame::block_write_request(&self.header(write_opcode(kind)), addr, data)?;
        self.transport.send(&request)?;
        Ok(())
    }

    fn read_fuses(&mut self, opcode: u8, len: usize) -> Result<Vec<u8>> {
        let request = frame::fuse_read_request(&self.header(opcode), len)?;
        let response = self
            .transport
            .transact(&request, FRAME_PAYLOAD_OFFSET + len)?;
        let payload = frame::parse_fuse_response(&response, len)?;
        debug!(opcode = %format!("0x{:02X}", opcode), ?payload, "Fuses read");
        Ok(payload)
    }

    fn write_fuses(&mut self, opcode: u8, len: usize, buf: &[u8; FUSE_BUFFER_SIZE]) -> Result<()> {
        let request = frame::fuse_write_request(&self.header(opcode), len, buf)?;
        debug!(opcode = %format!("0x{:02X}", opcode), payload = ?&buf[..len], "Writing fuses");
        self.transport.send(&request)?;
        Ok(())
    }

    fn prepare_writing(&mut self) -> Result<()> {
        self.send_short(MP_PREPARE_WRITING)?;
        // The erase acknowledgement carries nothing we use.
        self.transport.read(PREPARE_RESPONSE_SIZE)?;
        Ok(())
    }

    fn get_status(&mut self) -> Result<u16> {
        self.send_short(MP_GET_STATUS)?;
        let response = self.read_exact("get_status", STATUS_RESPONSE_SIZE)?;
        Ok(LittleEndian::read_u16(&response[..2]))
    }

    fn protect_off(&mut self) -> Result<()> {
        self.send_short(MP_PROTECT_OFF)
    }

    fn protect_on(&mut self) -> Result<()> {
        self.send_short(MP_PROTECT_ON)
    }

    fn get_chip_id(&mut self) -> Result<u32> {
        let request = self.header(MP_GET_CHIP_ID).to_frame(CHIP_ID_REQUEST_SIZE);
        let response = self.transport.transact(&request, CHIP_ID_RESPONSE_SIZE)?;
        Ok(frame::parse_chip_id(&response, self.device.chip_id_bytes)?)
    }

    #[instrument(level = "debug", skip(self))]
    fn system_info(&mut self) -> Result<SystemInfo> {
        let mut request = [0u8; SYSTEM_INFO_REQUEST_SIZE];
        request[0] = MP_GET_SYSTEM_INFO;
        let response = self
            .transport
            .transact(&request, SYSTEM_INFO_RESPONSE_SIZE)?;
        Ok(frame::parse_system_info(&response)?)
    }

    fn close(&mut self) -> Result<()> {
        debug!(
            vid = %format!("{:04X}", self.transport.vendor_id()),
            pid = %format!("{:04X}", self.transport.product_id()),
            "Closing programmer"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;
    use crate::transport::{MockTransport, TransportError};

    fn programmer() -> MiniproDevice<MockTransport> {
        let mut device = sample_device();
        device.chip_id = Some(0x1E9307);
        device.chip_id_bytes = 3;
        MiniproDevice::new(MockTransport::new(), device, MP_ICSP_ENABLE)
    }

    #[test]
    fn test_transaction_frames() {
        let mut prog = programmer();
        prog.begin_transaction().unwrap();
        prog.end_transaction().unwrap();

        let writes = prog.transport().get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), SHORT_FRAME_SIZE);
        assert_eq!(writes[0][0], MP_BEGIN_TRANSACTION);
        assert_eq!(writes[0][1], 0x71);
        assert_eq!(writes[0][11], MP_ICSP_ENABLE);
        assert_eq!(writes[1][0], MP_END_TRANSACTION);
    }

    #[test]
    fn test_read_block() {
        let mut prog = programmer();
        prog.transport().queue_response(&[0xAB; 36]);

        let data = prog.read_block(MemoryKind::Data, 0x40, 36).unwrap();
        assert_eq!(data, vec![0xAB; 36]);

        let request = &prog.transport().get_writes()[0];
        assert_eq!(request[0], MP_READ_DATA);
        assert_eq!(&request[2..7], &[36, 0, 0x40, 0, 0]);
    }

    #[test]
    fn test_short_block_read_is_error() {
        let mut prog = programmer();
        prog.transport().queue_response(&[0u8; 10]);

        let err = prog.read_block(MemoryKind::Code, 0, 64).unwrap_err();
        assert!(matches!(
            err,
            ProgError::ShortTransfer {
                expected: 64,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_write_block() {
        let mut prog = programmer();
        prog.write_block(MemoryKind::Code, 0x20, &[1, 2, 3, 4]).unwrap();

        let request = &prog.transport().get_writes()[0];
        assert_eq!(request[0], MP_WRITE_CODE);
        assert_eq!(&request[2..7], &[4, 0, 0x20, 0, 0]);
        assert_eq!(&request[7..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_fuse_commands() {
        let mut prog = programmer();
        prog.transport()
            .queue_response_at(FRAME_PAYLOAD_OFFSET + 2, FRAME_PAYLOAD_OFFSET, &[0x62, 0xD9]);

        assert_eq!(prog.read_fuses(0x10, 2).unwrap(), vec![0x62, 0xD9]);

        let mut buf = [0u8; FUSE_BUFFER_SIZE];
        buf[0] = 0xFC;
        prog.write_fuses(0x41, 1, &buf).unwrap();

        let writes = prog.transport().get_writes();
        assert_eq!(writes[0][0], 0x10);
        assert_eq!(writes[1][0], 0x41);
        assert_eq!(&writes[1][7..], &[0xFC]);
    }

    #[test]
    fn test_chip_id_status_and_info() {
        let mut prog = programmer();
        prog.transport()
            .queue_response_at(CHIP_ID_RESPONSE_SIZE, 2, &[0x1E, 0x93, 0x07]);
        assert_eq!(prog.get_chip_id().unwrap(), 0x1E9307);

        prog.transport()
            .queue_response_at(STATUS_RESPONSE_SIZE, 0, &[0x01, 0x00]);
        assert_eq!(prog.get_status().unwrap(), 1);

        prog.transport()
            .queue_response_at(SYSTEM_INFO_RESPONSE_SIZE, 4, &[0x56, 0x02, MP_TL866A]);
        let info = prog.system_info().unwrap();
        assert_eq!(info.model_name(), "TL866A");
        assert_eq!(prog.transport().get_writes().last().unwrap().len(), SYSTEM_INFO_REQUEST_SIZE);
    }

    #[test]
    fn test_disconnect_surfaces_as_transport_error() {
        let mut prog = programmer();
        prog.transport().disconnect();
        let err = prog.begin_transaction().unwrap_err();
        assert!(matches!(err, ProgError::Transport(TransportError::Disconnected)));
    }
}
