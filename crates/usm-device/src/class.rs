// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeviceError;

/// Device type as reported by the accelerator runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Gpu,
    Accelerator,
    Custom,
    Host,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Gpu => "gpu",
            DeviceType::Accelerator => "accelerator",
            DeviceType::Custom => "custom",
            DeviceType::Host => "host",
        }
    }

    /// Parses the lowercase name produced by [`DeviceType::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(DeviceType::Cpu),
            "gpu" => Some(DeviceType::Gpu),
            "accelerator" => Some(DeviceType::Accelerator),
            "custom" => Some(DeviceType::Custom),
            "host" => Some(DeviceType::Host),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The device classes DLPack can encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Cpu,
    Gpu,
    Accelerator,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [DeviceClass::Cpu, DeviceClass::Gpu, DeviceClass::Accelerator];

    /// Name used in filter strings.
    pub fn as_str(self) -> &'static str {
        self.device_type().as_str()
    }

    pub fn device_type(self) -> DeviceType {
        match self {
            DeviceClass::Cpu => DeviceType::Cpu,
            DeviceClass::Gpu => DeviceType::Gpu,
            DeviceClass::Accelerator => DeviceType::Accelerator,
        }
    }

    /// Like [`DeviceType::from_name`], limited to the DLPack-encodable types.
    pub fn from_name(name: &str) -> Option<Self> {
        DeviceType::from_name(name).and_then(|device_type| Self::try_from(device_type).ok())
    }
}

impl TryFrom<DeviceType> for DeviceClass {
    type Error = DeviceError;

    fn try_from(device_type: DeviceType) -> Result<Self, Self::Error> {
        match device_type {
            DeviceType::Cpu => Ok(DeviceClass::Cpu),
            DeviceType::Gpu => Ok(DeviceClass::Gpu),
            DeviceType::Accelerator => Ok(DeviceClass::Accelerator),
            DeviceType::Custom | DeviceType::Host => {
                Err(DeviceError::UnsupportedDeviceClass { device_type })
            }
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_types_map_to_classes() {
        for class in DeviceClass::ALL {
            assert_eq!(DeviceClass::try_from(class.device_type()), Ok(class));
        }
        assert_eq!(
            DeviceClass::try_from(DeviceType::Custom),
            Err(DeviceError::UnsupportedDeviceClass {
                device_type: DeviceType::Custom
            })
        );
        assert!(DeviceClass::try_from(DeviceType::Host).is_err());
    }

    #[test]
    fn names_parse_back() {
        for device_type in [
            DeviceType::Cpu,
            DeviceType::Gpu,
            DeviceType::Accelerator,
            DeviceType::Custom,
            DeviceType::Host,
        ] {
            assert_eq!(DeviceType::from_name(device_type.as_str()), Some(device_type));
        }
        assert_eq!(DeviceClass::from_name("accelerator"), Some(DeviceClass::Accelerator));
        assert_eq!(DeviceClass::from_name("host"), None);
        assert_eq!(DeviceClass::from_name("acc"), None);
    }
}
