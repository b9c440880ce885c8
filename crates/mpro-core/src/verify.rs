//! Readback verification.

use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::events::{Operation, ProgEvent, ProgObserver};
use crate::programmer::Programmer;
use crate::transfer::read_region;

/// First byte where two buffers differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

impl From<Mismatch> for ProgError {
    fn from(m: Mismatch) -> Self {
        ProgError::VerifyMismatch {
            offset: m.offset,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

/// Compare two equal-length buffers.
pub fn compare(expected: &[u8], actual: &[u8]) -> Option<Mismatch> {
    debug_assert_eq!(expected.len(), actual.len());
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .map(|offset| Mismatch {
            offset,
            expected: expected[offset],
            actual: actual[offset],
        })
}

/// Reports the readback as verify progress.
struct VerifyProgress<'a, O: ?Sized>(&'a O);

impl<O: ProgObserver + ?Sized> ProgObserver for VerifyProgress<'_, O> {
    fn on_event(&self, event: &ProgEvent) {
        match event {
            ProgEvent::Progress {
                operation: Operation::Reading,
                target,
                percent,
            } => self.0.on_event(&ProgEvent::Progress {
                operation: Operation::Verifying,
                target: target.clone(),
                percent: *percent,
            }),
            ProgEvent::StepStarted { .. } | ProgEvent::StepFinished { .. } => {}
            other => self.0.on_event(other),
        }
    }
}

/// Re-read `kind` memory and compare it with `expected`.
///
/// The readback is sized from the device's declared region size, and
/// `expected` must already be fitted to that size. Both buffers are owned
/// here and released before the result is returned.
pub fn verify_region<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    kind: MemoryKind,
    expected: Vec<u8>,
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    let size = device.region_size(kind);
    if expected.len() != size {
        return Err(ProgError::SizeMismatch {
            actual: expected.len(),
            expected: size,
        });
    }

    observer.on_event(&ProgEvent::StepStarted {
        operation: Operation::Verifying,
        target: kind.to_string(),
    });
    let actual = read_region(programmer, device, kind, size, &VerifyProgress(observer))?;
    let mismatch = compare(&expected, &actual);
    drop(actual);
    drop(expected);

    match mismatch {
        Some(m) => Err(m.into()),
        None => {
            observer.on_event(&ProgEvent::StepFinished {
                operation: Operation::Verifying,
                target: kind.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;
    use crate::error::ErrorKind;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::programmer::MockProgrammer;

    #[test]
    fn test_identical_buffers() {
        let buf: Vec<u8> = (0..=255).collect();
        assert_eq!(compare(&buf, &buf), None);
        assert_eq!(compare(&[], &[]), None);
    }

    #[test]
    fn test_first_divergence_reported() {
        let expected: Vec<u8> = (0..64).collect();
        for k in [0, 17, 63] {
            let mut actual = expected.clone();
            actual[k] = 0xEE;
            assert_eq!(
                compare(&expected, &actual),
                Some(Mismatch {
                    offset: k,
                    expected: expected[k],
                    actual: 0xEE,
                })
            );
        }

        let mut twice = expected.clone();
        twice[5] = 0;
        twice[40] = 0;
        assert_eq!(compare(&expected, &twice).map(|m| m.offset), Some(5));
    }

    #[test]
    fn test_verify_region_ok() {
        let device = sample_device();
        let image = vec![0x42; 128];
        let mut mock = MockProgrammer::for_device(&device).with_memory(MemoryKind::Code, &image);
        let observer = RecordingObserver::new();

        verify_region(&mut mock, &device, MemoryKind::Code, image, &observer).unwrap();
        let events = observer.events();
        assert_eq!(
            events.first(),
            Some(&ProgEvent::StepStarted {
                operation: Operation::Verifying,
                target: "Code".to_string(),
            })
        );
        assert_eq!(
            events.last(),
            Some(&ProgEvent::StepFinished {
                operation: Operation::Verifying,
                target: "Code".to_string(),
            })
        );
        assert_eq!(observer.progress(Operation::Verifying, "Code"), vec![50, 100]);
        assert!(observer.progress(Operation::Reading, "Code").is_empty());
    }

    #[test]
    fn test_verify_region_mismatch() {
        let device = sample_device();
        let image = vec![0x42; 128];
        let mut mock = MockProgrammer::for_device(&device)
            .with_memory(MemoryKind::Code, &image)
            .corrupt_readback(MemoryKind::Code, 70);

        let err = verify_region(&mut mock, &device, MemoryKind::Code, image, &NullObserver).unwrap_err();
        assert!(matches!(
            err,
            ProgError::VerifyMismatch {
                offset: 70,
                expected: 0x42,
                actual: 0xBD,
            }
        ));
        assert_eq!(err.kind(), ErrorKind::VerifyMismatch);
        assert_eq!(err.to_string(), "Verification failed at 0x46: 0x42 != 0xbd");
    }
}
