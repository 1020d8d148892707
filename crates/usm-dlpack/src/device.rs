// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Mapping between runtime devices and DLPack device tags.

use usm_device::{
    classify_device, resolve_device, DeviceClass, DeviceError, DeviceHandle, DeviceRuntime,
};

use crate::dlpack::{DLDevice, DLDeviceType};
use crate::error::{HandoffError, HandoffResult};

impl From<DeviceClass> for DLDeviceType {
    fn from(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Cpu => DLDeviceType::OneApiCpu,
            DeviceClass::Gpu => DLDeviceType::OneApiGpu,
            DeviceClass::Accelerator => DLDeviceType::OneApiAccelerator,
        }
    }
}

impl From<DLDeviceType> for DeviceClass {
    fn from(tag: DLDeviceType) -> Self {
        match tag {
            DLDeviceType::OneApiCpu => DeviceClass::Cpu,
            DLDeviceType::OneApiGpu => DeviceClass::Gpu,
            DLDeviceType::OneApiAccelerator => DeviceClass::Accelerator,
        }
    }
}

/// Encodes a runtime device as a DLPack device tag.
pub fn dlpack_device(
    runtime: &dyn DeviceRuntime,
    device: DeviceHandle,
) -> HandoffResult<DLDevice> {
    let (class, ordinal) = classify_device(runtime, device)?;
    let device_id = i32::try_from(ordinal)
        .map_err(|_| DeviceError::Runtime(format!("device ordinal {ordinal} exceeds i32")))?;
    Ok(DLDevice::new(class.into(), device_id))
}

/// Resolves the runtime device a DLPack device tag refers to.
pub fn device_from_dlpack(
    runtime: &dyn DeviceRuntime,
    device: DLDevice,
) -> HandoffResult<DeviceHandle> {
    let tag = DLDeviceType::from_raw(device.device_type)
        .ok_or(HandoffError::UnsupportedDeviceType(device.device_type))?;
    let ordinal = usize::try_from(device.device_id).map_err(|_| {
        HandoffError::InvalidDescriptor(format!("negative device id {}", device.device_id))
    })?;
    Ok(resolve_device(runtime, tag.into(), ordinal)?)
}
