//! Programming session: the open programmer for one run.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::device::DeviceDescriptor;
use crate::error::{ProgError, Result};
use crate::events::{ProgEvent, ProgObserver, TracingObserver};
use crate::programmer::{Programmer, SystemInfo};
use crate::transaction::Transaction;
use crate::workflow::{Action, ActionRequest, run_read, run_write};

/// Owns the programmer from startup to shutdown.
///
/// The programmer is closed exactly once: by [`ProgSession::close`], or when
/// the session is dropped without it (startup failure, early return).
pub struct ProgSession<P: Programmer, O: ProgObserver> {
    programmer: P,
    device: DeviceDescriptor,
    observer: Arc<O>,
    info: Option<SystemInfo>,
    closed: bool,
}

impl<P: Programmer> ProgSession<P, TracingObserver> {
    /// Open a session that reports through `tracing`.
    pub fn new(programmer: P, device: DeviceDescriptor) -> Result<Self> {
        Self::open(programmer, device, Arc::new(TracingObserver))
    }
}

impl<P: Programmer, O: ProgObserver> ProgSession<P, O> {
    /// Take ownership of `programmer` and run the startup checks.
    #[instrument(skip_all, fields(device = %device.name))]
    pub fn open(programmer: P, device: DeviceDescriptor, observer: Arc<O>) -> Result<Self> {
        let mut session = Self {
            programmer,
            device,
            observer,
            info: None,
            closed: false,
        };
        session.device.validate()?;
        session.startup()?;
        Ok(session)
    }

    fn startup(&mut self) -> Result<()> {
        let info = self.programmer.system_info()?;
        self.info = Some(info);
        self.observer.on_event(&ProgEvent::ProgrammerFound { info });

        if let Some((expected, bytes)) = self.device.expected_chip_id() {
            let mut txn = Transaction::begin(&mut self.programmer)?;
            let actual = txn.get_chip_id()?;
            if actual != expected {
                return Err(ProgError::ChipIdMismatch { expected, actual });
            }
            txn.end()?;
            info!(chip_id = %format!("0x{:0width$X}", actual, width = bytes as usize * 2), "Chip ID OK");
            self.observer.on_event(&ProgEvent::ChipIdVerified { chip_id: actual });
        }
        Ok(())
    }

    /// Run one action.
    #[instrument(skip_all, fields(action = ?request.action, path = %request.path.display()))]
    pub fn run(&mut self, request: &ActionRequest) -> Result<()> {
        let observer = self.observer.as_ref();
        match request.action {
            Action::Read => run_read(&mut self.programmer, &self.device, request, observer)?,
            Action::Write => run_write(&mut self.programmer, &self.device, request, observer)?,
        }
        observer.on_event(&ProgEvent::Complete);
        Ok(())
    }

    /// Close the programmer.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.programmer.close()
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn system_info(&self) -> Option<SystemInfo> {
        self.info
    }

    pub fn programmer(&self) -> &P {
        &self.programmer
    }
}

impl<P: Programmer, O: ProgObserver> Drop for ProgSession<P, O> {
    fn drop(&mut self) {
        if !self.closed
            && let Err(e) = self.programmer.close()
        {
            warn!(error = %e, "Failed to close programmer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;
    use crate::error::ErrorKind;
    use crate::events::RecordingObserver;
    use crate::programmer::{Command, MockProgrammer};

    fn chip_with_id() -> DeviceDescriptor {
        let mut device = sample_device();
        device.chip_id = Some(0x1E9307);
        device.chip_id_bytes = 3;
        device
    }

    #[test]
    fn test_startup_reports_programmer_and_chip_id() {
        let device = chip_with_id();
        let mock = MockProgrammer::for_device(&device);
        let observer = Arc::new(RecordingObserver::new());

        let session = ProgSession::open(mock, device, observer.clone()).unwrap();
        let events = observer.events();
        assert!(matches!(events[0], ProgEvent::ProgrammerFound { .. }));
        assert_eq!(events[1], ProgEvent::ChipIdVerified { chip_id: 0x1E9307 });
        assert_eq!(
            session.programmer().log(),
            &[Command::SystemInfo, Command::Begin, Command::GetChipId, Command::End]
        );
        assert_eq!(session.system_info().map(|i| i.to_string()).as_deref(), Some("TL866CS v02.86"));
    }

    #[test]
    fn test_chip_id_skipped_when_undeclared() {
        let session = ProgSession::new(MockProgrammer::for_device(&sample_device()), sample_device()).unwrap();
        assert_eq!(session.programmer().log(), &[Command::SystemInfo]);
    }

    #[test]
    fn test_chip_id_mismatch() {
        let device = chip_with_id();
        let mock = MockProgrammer::for_device(&device).with_chip_id(0x1E9406);

        let result = ProgSession::open(mock, device, Arc::new(RecordingObserver::new()));
        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigIntegrity);
        assert_eq!(err.to_string(), "Invalid Chip ID: expected 0x1E9307, got 0x1E9406");
    }

    #[test]
    fn test_close_exactly_once() {
        let device = sample_device();
        let mut mock = MockProgrammer::for_device(&device);
        let session = ProgSession::new(&mut mock, device).unwrap();
        session.close().unwrap();
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_dropped_session_closes_programmer() {
        let device = chip_with_id();
        let mut mock = MockProgrammer::for_device(&device).with_chip_id(0);
        assert!(ProgSession::new(&mut mock, device).is_err());
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.open_brackets(), 0);
    }

    #[test]
    fn test_run_read_then_close() {
        let dir = tempfile::tempdir().unwrap();
        let device = sample_device();
        let observer = Arc::new(RecordingObserver::new());
        let mut session =
            ProgSession::open(MockProgrammer::for_device(&device), device, observer.clone()).unwrap();

        session.run(&ActionRequest::read(dir.path().join("dump.bin"))).unwrap();
        assert_eq!(session.programmer().open_brackets(), 0);
        assert_eq!(session.programmer().close_count(), 0);
        assert_eq!(observer.events().last(), Some(&ProgEvent::Complete));
        assert_eq!(std::fs::read(dir.path().join("dump.bin")).unwrap(), vec![0xFF; 128]);
        session.close().unwrap();
    }

    #[test]
    fn test_invalid_descriptor_rejected_before_contact() {
        let mut device = sample_device();
        device.read_buffer_size = 0;
        let mut mock = MockProgrammer::for_device(&sample_device());
        assert!(matches!(
            ProgSession::new(&mut mock, device),
            Err(ProgError::InvalidDevice { .. })
        ));
        assert_eq!(mock.log(), &[Command::Close]);
    }
}
