// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use tracing::debug;

use crate::class::DeviceClass;
use crate::error::{DeviceError, DeviceResult};
use crate::filter::DeviceFilter;
use crate::runtime::{DeviceHandle, DeviceRuntime};

/// Selects the device named by `"<class>:<ordinal>"`.
pub fn resolve_device(
    runtime: &dyn DeviceRuntime,
    class: DeviceClass,
    ordinal: usize,
) -> DeviceResult<DeviceHandle> {
    let filter = DeviceFilter::new(class, ordinal);
    let device = filter.select(runtime)?;
    debug!(%filter, ?device, "resolved device");
    Ok(device)
}

/// Returns the class of `device` and its ordinal among the viable devices of
/// that class, in the runtime's enumeration order.
///
/// A device that the enumeration never reaches (for instance one the default
/// selector excludes) yields [`DeviceError::NotEnumerated`].
pub fn classify_device(
    runtime: &dyn DeviceRuntime,
    device: DeviceHandle,
) -> DeviceResult<(DeviceClass, usize)> {
    let device_type = runtime.device_type(device)?;
    let class = DeviceClass::try_from(device_type)?;

    let mut ordinal = 0usize;
    for candidate in runtime.devices()? {
        if runtime.default_rank(candidate) < 0 {
            continue;
        }
        if runtime.device_type(candidate)? != device_type {
            continue;
        }
        if candidate == device {
            debug!(?device, %class, ordinal, "classified device");
            return Ok((class, ordinal));
        }
        ordinal += 1;
    }

    Err(DeviceError::NotEnumerated {
        class,
        seen: ordinal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::DeviceType;
    use crate::host::HostRuntime;

    #[test]
    fn ordinals_count_within_class() {
        let runtime = HostRuntime::from_hints("gpu,cpu,gpu,accelerator,gpu").unwrap();
        let devices = runtime.devices().unwrap();
        let classified: Vec<_> = devices
            .iter()
            .map(|d| classify_device(&runtime, *d).unwrap())
            .collect();
        assert_eq!(
            classified,
            vec![
                (DeviceClass::Gpu, 0),
                (DeviceClass::Cpu, 0),
                (DeviceClass::Gpu, 1),
                (DeviceClass::Accelerator, 0),
                (DeviceClass::Gpu, 2),
            ]
        );
    }

    #[test]
    fn excluded_devices_are_skipped_when_counting() {
        let runtime = HostRuntime::from_hints("gpu:excluded,gpu").unwrap();
        let devices = runtime.devices().unwrap();
        assert_eq!(
            classify_device(&runtime, devices[1]),
            Ok((DeviceClass::Gpu, 0))
        );
        assert_eq!(resolve_device(&runtime, DeviceClass::Gpu, 0), Ok(devices[1]));
    }

    #[test]
    fn excluded_device_is_not_enumerated() {
        let runtime = HostRuntime::from_hints("gpu,gpu:excluded").unwrap();
        let devices = runtime.devices().unwrap();
        assert_eq!(
            classify_device(&runtime, devices[1]),
            Err(DeviceError::NotEnumerated {
                class: DeviceClass::Gpu,
                seen: 1
            })
        );
    }

    #[test]
    fn custom_devices_are_rejected() {
        let runtime = HostRuntime::from_hints("custom,host").unwrap();
        for device in runtime.devices().unwrap() {
            let err = classify_device(&runtime, device).unwrap_err();
            assert!(matches!(
                err,
                DeviceError::UnsupportedDeviceClass {
                    device_type: DeviceType::Custom | DeviceType::Host
                }
            ));
        }
    }

    #[test]
    fn missing_ordinal_is_reported_with_filter() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        assert_eq!(
            resolve_device(&runtime, DeviceClass::Cpu, 1),
            Err(DeviceError::NoMatchingDevice {
                filter: "cpu:1".to_string()
            })
        );
        assert!(resolve_device(&runtime, DeviceClass::Gpu, 0).is_err());
    }
}
