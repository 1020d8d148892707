// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! DLPack ABI structures, layout compatible with the `dlpack.h` revision that
//! carries the oneAPI device tags.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;

/// Subset of the DLPack data type codes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DLDataTypeCode {
    /// Signed integer types.
    Int = 0,
    /// Unsigned integer types.
    UInt = 1,
    /// IEEE floating point types.
    Float = 2,
    /// Brain floating point.
    Bfloat = 4,
    /// Complex numbers backed by interleaved floating point lanes.
    Complex = 5,
    Bool = 6,
}

/// Representation of a DLPack data type.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DLDataType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

impl DLDataType {
    pub const fn new(code: DLDataTypeCode, bits: u8, lanes: u16) -> Self {
        Self {
            code: code as u8,
            bits,
            lanes,
        }
    }

    /// Maps a framework dtype name (`"float32"`, `"uint8"`, ...) to its
    /// single-lane DLPack encoding.
    pub fn from_name(name: &str) -> Option<Self> {
        use DLDataTypeCode::*;
        let (code, bits) = match name {
            "bool" => (Bool, 8),
            "int8" => (Int, 8),
            "int16" => (Int, 16),
            "int32" => (Int, 32),
            "int64" => (Int, 64),
            "uint8" => (UInt, 8),
            "uint16" => (UInt, 16),
            "uint32" => (UInt, 32),
            "uint64" => (UInt, 64),
            "float16" => (Float, 16),
            "bfloat16" => (Bfloat, 16),
            "float32" => (Float, 32),
            "float64" => (Float, 64),
            "complex64" => (Complex, 64),
            "complex128" => (Complex, 128),
            _ => return None,
        };
        Some(Self::new(code, bits, 1))
    }

    /// Size of one element in bytes, rounded up.
    pub fn element_size(&self) -> usize {
        (usize::from(self.bits) * usize::from(self.lanes)).div_ceil(8)
    }
}

/// oneAPI device tags understood by the bridge.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DLDeviceType {
    OneApiGpu = 14,
    OneApiCpu = 15,
    OneApiAccelerator = 16,
}

impl DLDeviceType {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            14 => Some(Self::OneApiGpu),
            15 => Some(Self::OneApiCpu),
            16 => Some(Self::OneApiAccelerator),
            _ => None,
        }
    }
}

/// Device descriptor for a DLPack tensor.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DLDevice {
    pub device_type: i32,
    pub device_id: i32,
}

impl DLDevice {
    pub fn new(device_type: DLDeviceType, device_id: i32) -> Self {
        Self {
            device_type: device_type as i32,
            device_id,
        }
    }
}

/// Raw tensor view exchanged through DLPack.
#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
    pub data: *mut c_void,
    pub device: DLDevice,
    pub ndim: i32,
    pub dtype: DLDataType,
    pub shape: *mut i64,
    /// May be null, meaning compact row-major.
    pub strides: *mut i64,
    pub byte_offset: u64,
}

/// Externally managed tensor with a custom deleter.
#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    pub dl_tensor: DLTensor,
    pub manager_ctx: *mut c_void,
    pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

/// Calls the deleter associated with a managed tensor, if one exists.
///
/// # Safety
/// `ptr` must be null or point to a live `DLManagedTensor` whose deleter may
/// be invoked with it.
pub unsafe fn call_managed_deleter(ptr: *mut DLManagedTensor) {
    if ptr.is_null() {
        return;
    }
    if let Some(deleter) = (*ptr).deleter {
        deleter(ptr);
    }
}
