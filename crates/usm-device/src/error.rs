// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

use crate::class::{DeviceClass, DeviceType};
use crate::context::ContextStrategy;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The DLPack protocol has no tag for this kind of device.
    #[error("{device_type} devices are not supported by the DLPack protocol")]
    UnsupportedDeviceClass { device_type: DeviceType },
    #[error("no device matches filter '{filter}'")]
    NoMatchingDevice { filter: String },
    /// The device was never reached while enumerating viable devices of its class.
    #[error("device is not among the viable {class} devices ({seen} enumerated)")]
    NotEnumerated { class: DeviceClass, seen: usize },
    #[error("invalid device filter '{0}'")]
    InvalidFilter(String),
    #[error("unknown device handle {0}")]
    UnknownDevice(u64),
    #[error("unknown context handle {0}")]
    UnknownContext(u64),
    #[error("context unavailable via {strategy}: {reason}")]
    ContextUnavailable {
        strategy: ContextStrategy,
        reason: String,
    },
    #[error("runtime error: {0}")]
    Runtime(String),
}
