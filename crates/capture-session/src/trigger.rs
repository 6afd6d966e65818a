use crate::{acquisition, Error, Result, Warning};
use phoxi_device::{ScannerDevice, TriggerMode};
use tracing::{debug, info};

/// Put the device into `required` trigger mode, pausing acquisition if needed.
///
/// The mode can only change while the device is not acquiring, so a running acquisition
/// is stopped first (best effort). Acquisition is not restarted here.
pub fn ensure_mode<D: ScannerDevice + ?Sized>(
    device: &mut D,
    required: TriggerMode,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let fatal = |source| Error::TriggerMode {
        mode: required,
        source,
    };
    let current = device.trigger_mode().map_err(fatal)?;
    if current == required {
        debug!(mode = %current, "trigger mode already set");
        return Ok(());
    }
    info!(current = %current, required = %required, "switching trigger mode");
    acquisition::stop(device, warnings);
    device.set_trigger_mode(required).map_err(fatal)?;
    Ok(())
}
