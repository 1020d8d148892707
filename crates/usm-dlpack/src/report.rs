// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::Serialize;
use std::fmt;
use std::slice;

use usm_device::{ContextResolver, DeviceRuntime, UsmAllocKind};

use crate::device::device_from_dlpack;
use crate::dlpack::{DLDataType, DLTensor};
use crate::error::{HandoffError, HandoffResult};

/// Diagnostic summary of a received DLPack tensor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TensorReport {
    /// Address of the data pointer, without `byte_offset` applied.
    pub data: usize,
    pub device_type: i32,
    pub device_id: i32,
    pub dtype: DLDataType,
    pub ndim: i32,
    pub shape: Vec<i64>,
    pub strides: Vec<i64>,
    /// True when the descriptor carried null strides and `strides` holds the
    /// implied compact row-major steps.
    pub strides_implied: bool,
    pub alloc_kind: UsmAllocKind,
}

impl TensorReport {
    /// Reads the descriptor and asks the runtime how its data was allocated.
    ///
    /// The device tag is resolved back to a runtime device, and the pointer
    /// kind is queried in that device's default context.
    ///
    /// # Safety
    /// `tensor.shape` and `tensor.strides` must be null or point to `ndim`
    /// readable `i64` values.
    pub unsafe fn inspect(
        runtime: &dyn DeviceRuntime,
        contexts: &ContextResolver,
        tensor: &DLTensor,
    ) -> HandoffResult<Self> {
        let ndim = usize::try_from(tensor.ndim).map_err(|_| {
            HandoffError::InvalidDescriptor(format!("negative ndim {}", tensor.ndim))
        })?;

        let shape = if ndim == 0 {
            Vec::new()
        } else if tensor.shape.is_null() {
            return Err(HandoffError::InvalidDescriptor(
                "null shape pointer".to_string(),
            ));
        } else {
            slice::from_raw_parts(tensor.shape, ndim).to_vec()
        };

        let strides_implied = ndim > 0 && tensor.strides.is_null();
        let strides = if ndim == 0 {
            Vec::new()
        } else if strides_implied {
            compact_strides(&shape)
        } else {
            slice::from_raw_parts(tensor.strides, ndim).to_vec()
        };

        let device = device_from_dlpack(runtime, tensor.device)?;
        let context = contexts.default_context_for(runtime, device)?;
        let alloc_kind = runtime.pointer_kind(tensor.data, context);

        Ok(Self {
            data: tensor.data as usize,
            device_type: tensor.device.device_type,
            device_id: tensor.device.device_id,
            dtype: tensor.dtype,
            ndim: tensor.ndim,
            shape,
            strides,
            strides_implied,
            alloc_kind,
        })
    }

    pub fn shape_text(&self) -> String {
        format_dims(&self.shape)
    }

    pub fn strides_text(&self) -> String {
        format_dims(&self.strides)
    }
}

/// Row-major element strides for `shape`.
pub fn compact_strides(shape: &[i64]) -> Vec<i64> {
    let mut strides = vec![0; shape.len()];
    let mut step = 1i64;
    for (stride, extent) in strides.iter_mut().zip(shape).rev() {
        *stride = step;
        step = step.saturating_mul((*extent).max(1));
    }
    strides
}

/// Renders dimensions as `(a, b, c)`.
pub fn format_dims(dims: &[i64]) -> String {
    let inner = dims
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("({inner})")
}

impl fmt::Display for TensorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data: {:#x}", self.data)?;
        writeln!(f, "Device ({}, {})", self.device_type, self.device_id)?;
        writeln!(
            f,
            "Type description: {{ 'code': {}, 'bits': {}, 'lanes': {} }}",
            self.dtype.code, self.dtype.bits, self.dtype.lanes
        )?;
        writeln!(f, "ndim: {}", self.ndim)?;
        writeln!(f, "shape: {}", self.shape_text())?;
        writeln!(f, "strides: {}", self.strides_text())?;
        write!(f, "{}", self.alloc_kind.describe())
    }
}
