// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;
use usm_device::DeviceError;

pub type HandoffResult<T> = Result<T, HandoffError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("DLPack device type {0} has no oneAPI counterpart")]
    UnsupportedDeviceType(i32),
    #[error("invalid DLPack descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("a tensor is already held; release it before handing off another")]
    SlotOccupied,
    #[error("the tensor deleter has already been invoked")]
    AlreadyFinalized,
    #[error("the tensor must be finalized before it is released")]
    NotFinalized,
    /// An operation needed a held tensor but the slot was empty.
    #[error("{0} called while no tensor is held")]
    InvalidState(&'static str),
}
