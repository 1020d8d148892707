// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process configuration for the USM/DLPack bridge.
//!
//! Settings are read from the environment once and cached for the lifetime of
//! the process. Tracing setup lives in [`tracing`].

pub mod bridge;
pub mod tracing;

pub use bridge::{config, BridgeConfig, ContextHint};
