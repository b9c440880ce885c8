//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{MINIPRO_PRODUCT_ID, MINIPRO_VENDOR_ID};

/// Mock transport for unit testing frame encoding.
pub struct MockTransport {
    /// Queued responses to return on read.
    response_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Whether the programmer is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            response_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a response to be returned on next read.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.response_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue a response of `len` bytes with `payload` copied in at `offset`.
    pub fn queue_response_at(&self, len: usize, offset: usize, payload: &[u8]) {
        let mut bytes = vec![0u8; len.max(offset + payload.len())];
        bytes[offset..offset + payload.len()].copy_from_slice(payload);
        self.queue_response(&bytes);
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate programmer disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate programmer reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut bytes = self
            .response_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 5000 })?;
        bytes.truncate(max_len);
        Ok(bytes)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn vendor_id(&self) -> u16 {
        MINIPRO_VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        MINIPRO_PRODUCT_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_queue() {
        let mock = MockTransport::new();
        mock.queue_response(&[0x01, 0x02]);
        mock.queue_response_at(8, 2, &[0xAA]);

        assert_eq!(mock.transact(&[0x03], 16).unwrap(), vec![0x01, 0x02]);
        let second = mock.read(16).unwrap();
        assert_eq!(second.len(), 8);
        assert_eq!(second[2], 0xAA);

        // Queue is empty now
        assert!(matches!(mock.read(16), Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.send(b"Hello").unwrap();
        mock.send(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");

        mock.clear_writes();
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(mock.write(b"test").is_err());

        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }
}
