// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt;

use crate::class::DeviceType;
use crate::error::DeviceResult;

/// Opaque runtime-owned device handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u64);

/// Opaque runtime-owned platform handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformHandle(pub u64);

/// Opaque runtime-owned context handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(pub u64);

/// How the runtime classifies the allocation behind a pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsmAllocKind {
    Shared,
    Device,
    Host,
    Unknown,
}

impl UsmAllocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UsmAllocKind::Shared => "shared",
            UsmAllocKind::Device => "device",
            UsmAllocKind::Host => "host",
            UsmAllocKind::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shared" => Some(UsmAllocKind::Shared),
            "device" => Some(UsmAllocKind::Device),
            "host" => Some(UsmAllocKind::Host),
            "unknown" => Some(UsmAllocKind::Unknown),
            _ => None,
        }
    }

    /// Sentence used in the tensor diagnostic report.
    pub fn describe(self) -> &'static str {
        match self {
            UsmAllocKind::Shared => "USM-shared allocation-based array",
            UsmAllocKind::Device => "USM-device allocation-based array",
            UsmAllocKind::Host => "USM-host allocation-based array",
            UsmAllocKind::Unknown => "USM allocation is unknown",
        }
    }
}

impl fmt::Display for UsmAllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable summary of one enumerated device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: DeviceType,
    pub platform: u64,
    pub rank: i32,
}

/// Boundary to the accelerator runtime.
///
/// Every call re-queries the runtime; nothing is cached on this side.
pub trait DeviceRuntime: Send + Sync {
    /// All root devices in the runtime's natural order.
    fn devices(&self) -> DeviceResult<Vec<DeviceHandle>>;

    fn device_type(&self, device: DeviceHandle) -> DeviceResult<DeviceType>;

    fn device_name(&self, device: DeviceHandle) -> DeviceResult<String>;

    fn platform(&self, device: DeviceHandle) -> DeviceResult<PlatformHandle>;

    /// Score from the runtime's default selector. Negative means excluded.
    fn default_rank(&self, device: DeviceHandle) -> i32;

    /// Whether platforms expose a shared default context.
    fn supports_platform_default_context(&self) -> bool;

    /// Context of a transient queue built on `device`.
    fn queue_context(&self, device: DeviceHandle) -> DeviceResult<ContextHandle>;

    fn platform_default_context(&self, platform: PlatformHandle) -> DeviceResult<ContextHandle>;

    /// Allocation kind of `ptr` as seen from `context`. The pointer is never
    /// dereferenced.
    fn pointer_kind(&self, ptr: *const c_void, context: ContextHandle) -> UsmAllocKind;

    fn describe(&self, device: DeviceHandle) -> DeviceResult<DeviceInfo> {
        Ok(DeviceInfo {
            name: self.device_name(device)?,
            device_type: self.device_type(device)?,
            platform: self.platform(device)?.0,
            rank: self.default_rank(device),
        })
    }
}
