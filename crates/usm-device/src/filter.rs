// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fmt;
use std::str::FromStr;

use crate::class::DeviceClass;
use crate::error::{DeviceError, DeviceResult};
use crate::runtime::{DeviceHandle, DeviceRuntime};

/// A `"<class>:<ordinal>"` device filter.
///
/// Only devices the default selector does not exclude take part in the
/// ordinal count, so a filter built from [`crate::classify_device`] selects
/// the same device again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceFilter {
    pub class: DeviceClass,
    pub ordinal: usize,
}

impl DeviceFilter {
    pub fn new(class: DeviceClass, ordinal: usize) -> Self {
        Self { class, ordinal }
    }

    /// Returns the first device matching the filter.
    pub fn select(&self, runtime: &dyn DeviceRuntime) -> DeviceResult<DeviceHandle> {
        let wanted = self.class.device_type();
        let mut seen = 0usize;
        for device in runtime.devices()? {
            if runtime.default_rank(device) < 0 {
                continue;
            }
            if runtime.device_type(device)? != wanted {
                continue;
            }
            if seen == self.ordinal {
                return Ok(device);
            }
            seen += 1;
        }
        Err(DeviceError::NoMatchingDevice {
            filter: self.to_string(),
        })
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.ordinal)
    }
}

impl FromStr for DeviceFilter {
    type Err = DeviceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || DeviceError::InvalidFilter(raw.to_string());
        let trimmed = raw.trim();
        let (name, ordinal) = match trimmed.split_once(':') {
            Some((name, ordinal)) => {
                let ordinal = ordinal.trim().parse::<usize>().map_err(|_| invalid())?;
                (name.trim(), ordinal)
            }
            None => (trimmed, 0),
        };
        let class = DeviceClass::from_name(&name.to_ascii_lowercase()).ok_or_else(invalid)?;
        Ok(Self { class, ordinal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_class_and_ordinal() {
        assert_eq!(
            "gpu:1".parse::<DeviceFilter>(),
            Ok(DeviceFilter::new(DeviceClass::Gpu, 1))
        );
        assert_eq!(
            "CPU".parse::<DeviceFilter>(),
            Ok(DeviceFilter::new(DeviceClass::Cpu, 0))
        );
        assert_eq!(
            " accelerator : 2 ".parse::<DeviceFilter>(),
            Ok(DeviceFilter::new(DeviceClass::Accelerator, 2))
        );
    }

    #[test]
    fn rejects_unknown_classes_and_bad_ordinals() {
        for raw in ["fpga:0", "gpu:-1", "gpu:x", "", "level_zero:gpu:0"] {
            assert_eq!(
                raw.parse::<DeviceFilter>(),
                Err(DeviceError::InvalidFilter(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn display_matches_filter_syntax() {
        assert_eq!(
            DeviceFilter::new(DeviceClass::Accelerator, 3).to_string(),
            "accelerator:3"
        );
    }
}
