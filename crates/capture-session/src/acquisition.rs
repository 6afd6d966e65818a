use crate::warning::record;
use crate::{AcquisitionError, Result, Warning};
use phoxi_device::ScannerDevice;
use tracing::{debug, info};

/// Start acquisition unless it is already running.
pub fn start<D: ScannerDevice + ?Sized>(device: &mut D) -> Result<()> {
    if device.is_acquiring() {
        debug!("device already acquiring");
        return Ok(());
    }
    device.start_acquisition().map_err(AcquisitionError::Start)?;
    info!("acquisition started");
    Ok(())
}

/// Best-effort stop; a failure is recorded but never propagated.
pub fn stop<D: ScannerDevice + ?Sized>(device: &mut D, warnings: &mut Vec<Warning>) {
    if !device.is_acquiring() {
        return;
    }
    info!("stopping acquisition");
    if let Err(e) = device.stop_acquisition() {
        record(
            warnings,
            Warning::StopAcquisition {
                message: e.to_string(),
            },
        );
    }
}

/// Discard frames buffered before this session triggered anything.
pub fn clear_buffer<D: ScannerDevice + ?Sized>(device: &mut D) -> usize {
    let cleared = device.clear_buffer();
    info!(cleared, "frames were cleared from the cyclic buffer");
    cleared
}
