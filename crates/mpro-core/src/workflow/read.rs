//! Read action.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::FUSES_TARGET;
use super::request::{ActionRequest, PlannedRead, RegionPlan};
use crate::config::FuseConfig;
use crate::device::{DeviceDescriptor, MemoryKind};
use crate::error::{ProgError, Result};
use crate::events::{Operation, ProgEvent, ProgObserver};
use crate::fuses::FuseCodec;
use crate::programmer::Programmer;
use crate::transaction::Transaction;
use crate::transfer::read_region;

/// Read the selected regions into files, inside one bracket.
#[instrument(skip_all, fields(device = %device.name, region = %request.region))]
pub fn run_read<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    request: &ActionRequest,
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    let plan = RegionPlan::for_selection(request.region).resolve(
        device,
        &request.path,
        &request.default_dir,
    );
    debug!(steps = ?plan, "Read plan");

    let mut txn = Transaction::begin(programmer)?;
    for PlannedRead { region, path } in &plan {
        match region.memory_kind() {
            Some(kind) => read_memory_file(&mut *txn, device, kind, path, observer)?,
            None => {
                let codec = FuseCodec::new(&device.fuses)?;
                let mut inner = txn.nested()?;
                read_fuses_file(&mut *inner, &codec, path, observer)?;
                inner.end()?;
            }
        }
    }
    txn.end()
}

fn read_memory_file<P, O>(
    programmer: &mut P,
    device: &DeviceDescriptor,
    kind: MemoryKind,
    path: &Path,
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    let data = read_region(programmer, device, kind, device.region_size(kind), observer)?;
    let mut file = File::create(path).map_err(|e| ProgError::io("Couldn't open file", path, e))?;
    file.write_all(&data)
        .map_err(|e| ProgError::io("Couldn't write file", path, e))?;
    info!(path = %path.display(), bytes = data.len(), "{} saved", kind);
    Ok(())
}

fn read_fuses_file<P, O>(
    programmer: &mut P,
    codec: &FuseCodec<'_>,
    path: &Path,
    observer: &O,
) -> Result<()>
where
    P: Programmer + ?Sized,
    O: ProgObserver + ?Sized,
{
    observer.on_event(&ProgEvent::StepStarted {
        operation: Operation::Reading,
        target: FUSES_TARGET.to_string(),
    });

    let mut config = FuseConfig::create(path);
    codec.decode(programmer, |name, value| config.set_int(name, value))?;
    config.close()?;

    observer.on_event(&ProgEvent::StepFinished {
        operation: Operation::Reading,
        target: FUSES_TARGET.to_string(),
    });
    info!(path = %path.display(), "Fuses saved");
    Ok(())
}
