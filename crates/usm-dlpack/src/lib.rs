// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! DLPack hand-off for tensors backed by USM allocations.
//!
//! [`HandoffStation`] receives a producer's [`DLManagedTensor`], reports its
//! layout and the kind of allocation behind it, and keeps it until the
//! producer's deleter has run and the local copy is released.

pub mod device;
pub mod dlpack;
pub mod error;
pub mod report;
pub mod station;

pub use device::{device_from_dlpack, dlpack_device};
pub use dlpack::{
    call_managed_deleter, DLDataType, DLDataTypeCode, DLDevice, DLDeviceType, DLManagedTensor,
    DLTensor,
};
pub use error::{HandoffError, HandoffResult};
pub use report::{compact_strides, format_dims, TensorReport};
pub use station::{FinalizeCall, HandoffStation, HeldTensor, ReleaseRefused};
