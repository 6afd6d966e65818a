use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait policy for blocking device calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Timeout {
    /// Return immediately with whatever is available.
    #[default]
    Zero,
    Bounded(Duration),
    Infinite,
}

impl Timeout {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Timeout::Zero
        } else {
            Timeout::Bounded(Duration::from_millis(ms))
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Timeout::Zero => Some(Duration::ZERO),
            Timeout::Bounded(d) => Some(*d),
            Timeout::Infinite => None,
        }
    }
}

/// Device-wide acquisition trigger source.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TriggerMode {
    Freerun,
    Software,
    Hardware,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerMode::Freerun => "Freerun",
            TriggerMode::Software => "Software",
            TriggerMode::Hardware => "Hardware",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettingGroup {
    Capturing,
    Processing,
    Experimental,
}

impl SettingGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingGroup::Capturing => "CapturingSettings",
            SettingGroup::Processing => "ProcessingSettings",
            SettingGroup::Experimental => "ExperimentalSettings",
        }
    }

    /// Whether a failed write of this group ends the session.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, SettingGroup::Experimental)
    }
}

impl fmt::Display for SettingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group-level gates reported by the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupGates {
    pub enabled: bool,
    pub can_get: bool,
    pub can_set: bool,
}

impl GroupGates {
    pub const OPEN: GroupGates = GroupGates {
        enabled: true,
        can_get: true,
        can_set: true,
    };

    pub fn all_open(&self) -> bool {
        self.enabled && self.can_get && self.can_set
    }
}

impl Default for GroupGates {
    fn default() -> Self {
        Self::OPEN
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One entry of the device's supported capturing modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapturingMode {
    pub resolution: Resolution,
}

/// Non-negative identifier assigned by the device to a triggered frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u32);

impl FrameId {
    pub const fn new(raw: u32) -> Self {
        FrameId(raw)
    }

    /// Convert the raw trigger result; negative values signal a rejected trigger.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(FrameId)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which device to open: serial-style hardware id, optionally pinned to an address.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectTarget {
    pub hardware_id: String,
    pub address: Option<String>,
}

impl ConnectTarget {
    pub fn by_serial(hardware_id: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = if address.trim().is_empty() {
            None
        } else {
            Some(address)
        };
        self
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(addr) => write!(f, "{} at {}", self.hardware_id, addr),
            None => f.write_str(&self.hardware_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_rejects_negative_raw_values() {
        assert_eq!(FrameId::from_raw(-1), None);
        assert_eq!(FrameId::from_raw(0).map(|id| id.raw()), Some(0));
        assert_eq!(FrameId::from_raw(42).map(|id| id.raw()), Some(42));
    }

    #[test]
    fn timeout_from_zero_millis_is_zero() {
        assert_eq!(Timeout::from_millis(0), Timeout::Zero);
        assert_eq!(
            Timeout::from_millis(250).as_duration(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(Timeout::Infinite.as_duration(), None);
    }

    #[test]
    fn blank_address_is_treated_as_serial_connect() {
        let target = ConnectTarget::by_serial("1708011").with_address("  ");
        assert_eq!(target.address, None);
        let target = ConnectTarget::by_serial("1708011").with_address("192.168.1.27");
        assert_eq!(target.to_string(), "1708011 at 192.168.1.27");
    }

    #[test]
    fn experimental_group_is_not_mandatory() {
        assert!(SettingGroup::Capturing.is_mandatory());
        assert!(SettingGroup::Processing.is_mandatory());
        assert!(!SettingGroup::Experimental.is_mandatory());
    }
}
