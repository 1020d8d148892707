// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Device resolution for the USM/DLPack bridge.
//!
//! The accelerator runtime is reached through [`DeviceRuntime`]. On top of it
//! this crate selects devices from `"<class>:<ordinal>"` filters, computes the
//! ordinal of a device among its class, and acquires default contexts through
//! a [`ContextStrategy`] picked once per process. [`HostRuntime`] is a
//! host-memory implementation of the seam used by tests and the demo tool.

pub mod class;
pub mod context;
pub mod error;
pub mod filter;
pub mod host;
pub mod resolver;
pub mod runtime;

pub use class::{DeviceClass, DeviceType};
pub use context::{ContextResolver, ContextStrategy};
pub use error::{DeviceError, DeviceResult};
pub use filter::DeviceFilter;
pub use host::{HostDeviceSpec, HostRuntime};
pub use resolver::{classify_device, resolve_device};
pub use runtime::{
    ContextHandle, DeviceHandle, DeviceInfo, DeviceRuntime, PlatformHandle, UsmAllocKind,
};
