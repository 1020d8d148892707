// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Default context acquisition.
//!
//! Older runtimes only hand out contexts through a queue; newer ones expose a
//! shared default context per platform. The choice is made once, when the
//! [`ContextResolver`] is built, and the rest of the bridge never branches on
//! the runtime generation again.

use std::fmt;

use tracing::debug;
use usm_config::ContextHint;

use crate::error::{DeviceError, DeviceResult};
use crate::runtime::{ContextHandle, DeviceHandle, DeviceRuntime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextStrategy {
    /// Construct a transient queue on the device and read back its context.
    QueueDerived,
    /// Ask the device's platform for its shared default context.
    PlatformDefault,
}

impl ContextStrategy {
    /// Picks a strategy from the configured hint and the runtime's capabilities.
    pub fn detect(runtime: &dyn DeviceRuntime, hint: ContextHint) -> DeviceResult<Self> {
        let supported = runtime.supports_platform_default_context();
        match hint {
            ContextHint::Auto if supported => Ok(ContextStrategy::PlatformDefault),
            ContextHint::Auto | ContextHint::Queue => Ok(ContextStrategy::QueueDerived),
            ContextHint::Platform if supported => Ok(ContextStrategy::PlatformDefault),
            ContextHint::Platform => Err(DeviceError::ContextUnavailable {
                strategy: ContextStrategy::PlatformDefault,
                reason: "runtime does not provide platform default contexts".to_string(),
            }),
        }
    }
}

impl fmt::Display for ContextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextStrategy::QueueDerived => write!(f, "queue-derived context"),
            ContextStrategy::PlatformDefault => write!(f, "platform default context"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextResolver {
    strategy: ContextStrategy,
}

impl ContextResolver {
    pub fn new(strategy: ContextStrategy) -> Self {
        Self { strategy }
    }

    pub fn detect(runtime: &dyn DeviceRuntime, hint: ContextHint) -> DeviceResult<Self> {
        let strategy = ContextStrategy::detect(runtime, hint)?;
        debug!(%strategy, %hint, "selected context strategy");
        Ok(Self::new(strategy))
    }

    pub fn strategy(&self) -> ContextStrategy {
        self.strategy
    }

    /// Obtains a context usable for allocation on `device`. Never cached.
    pub fn default_context_for(
        &self,
        runtime: &dyn DeviceRuntime,
        device: DeviceHandle,
    ) -> DeviceResult<ContextHandle> {
        match self.strategy {
            ContextStrategy::QueueDerived => runtime.queue_context(device),
            ContextStrategy::PlatformDefault => {
                let platform = runtime.platform(device)?;
                runtime.platform_default_context(platform)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostRuntime;

    #[test]
    fn auto_follows_runtime_capability() {
        let modern = HostRuntime::from_hints("gpu").unwrap();
        let legacy = HostRuntime::from_hints("gpu").unwrap().with_legacy_api(true);
        assert_eq!(
            ContextStrategy::detect(&modern, ContextHint::Auto),
            Ok(ContextStrategy::PlatformDefault)
        );
        assert_eq!(
            ContextStrategy::detect(&legacy, ContextHint::Auto),
            Ok(ContextStrategy::QueueDerived)
        );
    }

    #[test]
    fn forcing_platform_on_legacy_runtime_fails() {
        let legacy = HostRuntime::from_hints("cpu").unwrap().with_legacy_api(true);
        assert!(matches!(
            ContextStrategy::detect(&legacy, ContextHint::Platform),
            Err(DeviceError::ContextUnavailable { .. })
        ));
        assert_eq!(
            ContextStrategy::detect(&legacy, ContextHint::Queue),
            Ok(ContextStrategy::QueueDerived)
        );
    }

    #[test]
    fn platform_default_context_is_shared_and_queue_context_is_not() {
        let runtime = HostRuntime::from_hints("gpu,gpu").unwrap();
        let devices = runtime.devices().unwrap();

        let shared = ContextResolver::new(ContextStrategy::PlatformDefault);
        let a = shared.default_context_for(&runtime, devices[0]).unwrap();
        let b = shared.default_context_for(&runtime, devices[1]).unwrap();
        assert_eq!(a, b);

        let queued = ContextResolver::new(ContextStrategy::QueueDerived);
        let c = queued.default_context_for(&runtime, devices[0]).unwrap();
        let d = queued.default_context_for(&runtime, devices[0]).unwrap();
        assert_ne!(c, d);
        assert_ne!(c, a);
    }
}
