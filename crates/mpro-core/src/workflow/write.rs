//! Write action.
//!
//! The file is loaded and checked before the device is touched. The device
//! side then runs in three brackets: erase, a shared bracket for the status
//! query, protect-off, write and verify, and protect-on. Each gated step
//! advances the stage whether it ran or was skipped; the first failure moves
//! the workflow to [`WriteStage::Failed`].

use tracing::{debug, info, instrument, warn};

use super::machine::{StageTracker, WriteStage};
use super::FUSES_TARGET;
use super::request::{ActionRequest, MemoryRegion, SizeCheck};
use crate::config::FuseConfig;
use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::events::{Operation, ProgEvent, ProgObserver};
use crate::fuses::{FuseCodec, PackedFuses};
use crate::programmer::Programmer;
use crate::transaction::Transaction;
use crate::transfer::write_region;
use crate::verify::verify_region;

/// Erased-cell value used to pad short images.
const ERASED_BYTE: u8 = 0xFF;

/// What gets written, prepared before any device access.
enum Payload<'a> {
    Memory { kind: MemoryKind, image: Vec<u8> },
    Fuses { codec: FuseCodec<'a>, packed: Vec<PackedFuses> },
}

/// One write run over a borrowed programmer.
pub struct WriteWorkflow<'a, P: Programmer + ?Sized, O: ProgObserver + ?Sized> {
    programmer: &'a mut P,
    device: &'a DeviceDescriptor,
    request: &'a ActionRequest,
    observer: &'a O,
    tracker: StageTracker,
}

impl<'a, P: Programmer + ?Sized, O: ProgObserver + ?Sized> WriteWorkflow<'a, P, O> {
    pub fn new(
        programmer: &'a mut P,
        device: &'a DeviceDescriptor,
        request: &'a ActionRequest,
        observer: &'a O,
    ) -> Self {
        Self {
            programmer,
            device,
            request,
            observer,
            tracker: StageTracker::new(),
        }
    }

    pub fn stage(&self) -> WriteStage {
        self.tracker.stage()
    }

    /// Run every step to [`WriteStage::Done`], or stop at the first failure.
    #[instrument(skip_all, fields(device = %self.device.name, region = %self.request.region))]
    pub fn run(&mut self) -> Result<()> {
        match self.steps() {
            Ok(()) => {
                self.tracker.goto(WriteStage::Done, false, self.observer);
                Ok(())
            }
            Err(e) => {
                warn!(stage = %self.tracker.stage(), error = %e, "Write failed");
                self.tracker.fail(self.observer);
                Err(e)
            }
        }
    }

    fn steps(&mut self) -> Result<()> {
        let payload = self.validate()?;
        self.tracker.goto(WriteStage::Validated, false, self.observer);

        self.erase()?;
        self.write_and_verify(payload)?;
        self.protect_on()
    }

    fn validate(&self) -> Result<Payload<'a>> {
        let device = self.device;
        let path = &self.request.path;

        let region = match self.request.region {
            MemoryRegion::Unspecified => MemoryRegion::Code,
            explicit => explicit,
        };
        let Some(kind) = region.memory_kind() else {
            if !device.has_fuses() {
                return Err(ProgError::usage(format!("{} has no fuses", device.name)));
            }
            let codec = FuseCodec::new(&device.fuses)?;
            let config = FuseConfig::open(path)?;
            let packed = codec.pack(|name| config.get_int(name))?;
            config.close()?;
            return Ok(Payload::Fuses { codec, packed });
        };

        if kind == MemoryKind::Data && !device.has_data_memory() {
            return Err(ProgError::usage(format!("{} has no data memory", device.name)));
        }
        let expected = device.region_size(kind);
        let mut image =
            std::fs::read(path).map_err(|e| ProgError::io("Couldn't read file", path, e))?;

        if image.len() != expected {
            let mismatch = ProgError::SizeMismatch {
                actual: image.len(),
                expected,
            };
            match self.request.size_check {
                SizeCheck::Strict => return Err(mismatch),
                SizeCheck::Warn => {
                    warn!("{}", mismatch);
                    self.observer.on_event(&ProgEvent::Warning {
                        message: mismatch.to_string(),
                    });
                }
                SizeCheck::Silent => debug!("{}", mismatch),
            }
            image.resize(expected, ERASED_BYTE);
        }
        Ok(Payload::Memory { kind, image })
    }

    fn erase(&mut self) -> Result<()> {
        if self.request.skip_erase {
            self.tracker.goto(WriteStage::EraseDone, true, self.observer);
            return Ok(());
        }
        let mut txn = Transaction::begin(&mut *self.programmer)?;
        info!("Erasing...");
        txn.prepare_writing()?;
        txn.end()?;
        self.tracker.goto(WriteStage::EraseDone, false, self.observer);
        Ok(())
    }

    fn write_and_verify(&mut self, payload: Payload<'a>) -> Result<()> {
        let device = self.device;
        let observer = self.observer;
        let mut txn = Transaction::begin(&mut *self.programmer)?;

        let status = txn.get_status()?;
        if status != 0 {
            return Err(ProgError::DeviceStatus { status });
        }
        let protect_off = device.supports_write_protect() && !self.request.skip_protect_off;
        if protect_off {
            info!("Disabling write protection");
            txn.protect_off()?;
        }
        self.tracker.goto(WriteStage::ProtectOffDone, !protect_off, observer);

        match payload {
            Payload::Memory { kind, image } => {
                write_region(&mut *txn, device, kind, &image, observer)?;
                let mut check = txn.nested()?;
                verify_region(&mut *check, device, kind, image, observer)?;
                check.end()?;
            }
            Payload::Fuses { codec, packed } => {
                observer.on_event(&ProgEvent::StepStarted {
                    operation: Operation::Writing,
                    target: FUSES_TARGET.to_string(),
                });
                let mut inner = txn.nested()?;
                codec.write_packed(&mut *inner, &packed)?;
                inner.end()?;
                observer.on_event(&ProgEvent::StepFinished {
                    operation: Operation::Writing,
                    target: FUSES_TARGET.to_string(),
                });
            }
        }
        txn.end()?;
        self.tracker.goto(WriteStage::WrittenVerified, false, observer);
        Ok(())
    }

    fn protect_on(&mut self) -> Result<()> {
        let protect_on = self.device.supports_write_protect() && !self.request.skip_protect_on;
        if protect_on {
            let mut txn = Transaction::begin(&mut *self.programmer)?;
            info!("Enabling write protection");
            txn.protect_on()?;
            txn.end()?;
        }
        self.tracker.goto(WriteStage::ProtectOnDone, !protect_on, self.observer);
        Ok(())
    }
}

/// Run a write action to completion.
pub fn run_write<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    request: &ActionRequest,
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    WriteWorkflow::new(programmer, device, request, observer).run()
}
