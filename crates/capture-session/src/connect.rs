use crate::{Error, Result};
use phoxi_device::{ConnectTarget, DeviceFactory, ScannerDevice, Timeout};
use tracing::{error, info};

/// Open one device through the factory. Nothing else runs if this fails.
pub fn connect<F: DeviceFactory + ?Sized>(
    factory: &F,
    target: &ConnectTarget,
    timeout: Timeout,
) -> Result<F::Device> {
    match factory.create_and_connect(target, timeout) {
        Some(device) if device.is_connected() => {
            info!(
                target = %target,
                device_type = %device.device_type(),
                "connection to the device was successful"
            );
            Ok(device)
        }
        _ => {
            error!(target = %target, "connection to the device was unsuccessful");
            Err(Error::Connection {
                target: target.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoxi_device::{MockConfig, MockFactory};

    #[test]
    fn connected_device_reports_type() {
        let factory = MockFactory::default();
        let dev = connect(&factory, &ConnectTarget::by_serial("1708011"), Timeout::Zero).unwrap();
        assert!(dev.is_connected());
        assert_eq!(dev.device_type(), "PhoXi3DScanner");
        assert_eq!(dev.hardware_identification(), "1708011");
    }

    #[test]
    fn missing_device_is_connection_error() {
        let factory = MockFactory::new(MockConfig {
            known_devices: vec!["other".to_string()],
            ..MockConfig::default()
        });
        let target = ConnectTarget::by_serial("1708011").with_address("192.168.1.27");
        match connect(&factory, &target, Timeout::Zero) {
            Err(Error::Connection { target }) => {
                assert_eq!(target, "1708011 at 192.168.1.27")
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
