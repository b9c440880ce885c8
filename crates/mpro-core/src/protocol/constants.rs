// Programmer identification
pub const MINIPRO_VENDOR_ID: u16 = 0x04D8;
pub const MINIPRO_PRODUCT_ID: u16 = 0xE11C;

// Bulk endpoints (interface 0)
pub const EP_BULK_OUT: u8 = 0x01;
pub const EP_BULK_IN: u8 = 0x81;

// Session / status commands
pub const MP_GET_SYSTEM_INFO: u8 = 0x00;
pub const MP_BEGIN_TRANSACTION: u8 = 0x03;
pub const MP_END_TRANSACTION: u8 = 0x04;
pub const MP_GET_CHIP_ID: u8 = 0x05;
pub const MP_GET_STATUS: u8 = 0x39;

// Memory commands
pub const MP_WRITE_CODE: u8 = 0x20;
pub const MP_READ_CODE: u8 = 0x21;
pub const MP_PREPARE_WRITING: u8 = 0x22;
pub const MP_READ_DATA: u8 = 0x30;
pub const MP_WRITE_DATA: u8 = 0x31;

// Write protection
pub const MP_PROTECT_OFF: u8 = 0x44;
pub const MP_PROTECT_ON: u8 = 0x45;

// ICSP byte (header offset 11)
pub const MP_ICSP_ENABLE: u8 = 0x80;
pub const MP_ICSP_VCC: u8 = 0x01;

// Programmer models reported by MP_GET_SYSTEM_INFO
pub const MP_TL866A: u8 = 1;
pub const MP_TL866CS: u8 = 2;

/// Size of the common command header.
pub const FRAME_HEADER_SIZE: usize = 12;
/// Offset of the payload in block write requests and fuse/block responses.
pub const FRAME_PAYLOAD_OFFSET: usize = 7;
/// Short command frames (begin/end/status/protect).
pub const SHORT_FRAME_SIZE: usize = 48;
/// Read requests (block, fuses).
pub const READ_REQUEST_SIZE: usize = 18;
pub const SYSTEM_INFO_REQUEST_SIZE: usize = 5;
pub const SYSTEM_INFO_RESPONSE_SIZE: usize = 40;
pub const CHIP_ID_REQUEST_SIZE: usize = 8;
pub const CHIP_ID_RESPONSE_SIZE: usize = 32;
pub const STATUS_RESPONSE_SIZE: usize = 32;
pub const PREPARE_RESPONSE_SIZE: usize = 10;

/// Capacity of one fuse command buffer.
pub const FUSE_BUFFER_SIZE: usize = 11;
/// Widest fuse field, in bytes.
pub const MAX_FUSE_LENGTH: usize = 4;
/// Widest chip identifier, in bytes.
pub const MAX_CHIP_ID_BYTES: u8 = 4;

// Fixed output names used by the read cascade
pub const DEFAULT_DATA_FILENAME: &str = "eeprom.bin";
pub const DEFAULT_CONFIG_FILENAME: &str = "fuses.conf";
