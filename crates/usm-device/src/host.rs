// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Host-memory implementation of [`DeviceRuntime`].
//!
//! Devices are described by a hint list such as `"cpu,gpu,gpu:excluded"`.
//! Every allocation is ordinary host memory, but the runtime remembers which
//! kind and context each one was made with, so pointer queries answer the way
//! a USM runtime would: the same pointer looked up through a different context
//! reports [`UsmAllocKind::Unknown`].

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use usm_config::BridgeConfig;

use crate::class::DeviceType;
use crate::error::{DeviceError, DeviceResult};
use crate::runtime::{
    ContextHandle, DeviceHandle, DeviceRuntime, PlatformHandle, UsmAllocKind,
};

const ALIGNMENT: usize = 64;
const QUEUE_CONTEXT_BASE: u64 = 1 << 32;

/// Description of one simulated root device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostDeviceSpec {
    pub device_type: DeviceType,
    pub name: String,
    pub rank: i32,
}

impl HostDeviceSpec {
    pub fn new(device_type: DeviceType, name: impl Into<String>) -> Self {
        Self {
            device_type,
            name: name.into(),
            rank: default_rank_for(device_type),
        }
    }

    /// Marks the device as rejected by the default selector.
    pub fn excluded(mut self) -> Self {
        self.rank = -1;
        self
    }

    fn parse_hint(token: &str, index: usize) -> DeviceResult<Self> {
        let invalid = || DeviceError::Runtime(format!("invalid device hint '{token}'"));
        let (kind, modifier) = match token.split_once(':') {
            Some((kind, modifier)) => (kind.trim(), Some(modifier.trim())),
            None => (token.trim(), None),
        };
        let device_type =
            DeviceType::from_name(&kind.to_ascii_lowercase()).ok_or_else(invalid)?;
        let entry = Self::new(device_type, format!("host-{device_type}-{index}"));
        match modifier {
            None => Ok(entry),
            Some("excluded") => Ok(entry.excluded()),
            Some(_) => Err(invalid()),
        }
    }
}

fn default_rank_for(device_type: DeviceType) -> i32 {
    match device_type {
        DeviceType::Gpu => 500,
        DeviceType::Cpu => 300,
        DeviceType::Host => 100,
        DeviceType::Accelerator => 75,
        DeviceType::Custom => 0,
    }
}

fn platform_for(device_type: DeviceType) -> PlatformHandle {
    PlatformHandle(match device_type {
        DeviceType::Cpu => 0,
        DeviceType::Gpu => 1,
        DeviceType::Accelerator => 2,
        DeviceType::Custom => 3,
        DeviceType::Host => 4,
    })
}

#[derive(Debug)]
struct Allocation {
    layout: Layout,
    kind: UsmAllocKind,
    context: ContextHandle,
}

#[derive(Debug)]
pub struct HostRuntime {
    devices: Vec<HostDeviceSpec>,
    legacy_api: bool,
    next_context: AtomicU64,
    queue_contexts: Mutex<HashMap<u64, PlatformHandle>>,
    allocations: Mutex<BTreeMap<usize, Allocation>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HostRuntime {
    pub fn new(devices: Vec<HostDeviceSpec>) -> Self {
        Self {
            devices,
            legacy_api: false,
            next_context: AtomicU64::new(QUEUE_CONTEXT_BASE),
            queue_contexts: Mutex::new(HashMap::new()),
            allocations: Mutex::new(BTreeMap::new()),
        }
    }

    /// Builds a runtime from a comma separated hint list.
    pub fn from_hints(hints: &str) -> DeviceResult<Self> {
        let devices = hints
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .enumerate()
            .map(|(index, token)| HostDeviceSpec::parse_hint(token, index))
            .collect::<DeviceResult<Vec<_>>>()?;
        Ok(Self::new(devices))
    }

    pub fn from_config(cfg: &BridgeConfig) -> DeviceResult<Self> {
        Ok(Self::from_hints(&cfg.device_hints)?.with_legacy_api(cfg.legacy_runtime))
    }

    /// Runtime described by the process configuration.
    pub fn from_env() -> DeviceResult<Self> {
        Self::from_config(usm_config::config())
    }

    /// Pretends to predate platform default contexts.
    pub fn with_legacy_api(mut self, legacy: bool) -> Self {
        self.legacy_api = legacy;
        self
    }

    fn spec(&self, device: DeviceHandle) -> DeviceResult<&HostDeviceSpec> {
        usize::try_from(device.0)
            .ok()
            .and_then(|index| self.devices.get(index))
            .ok_or(DeviceError::UnknownDevice(device.0))
    }

    fn context_platform(&self, context: ContextHandle) -> DeviceResult<PlatformHandle> {
        if context.0 < QUEUE_CONTEXT_BASE {
            let platform = PlatformHandle(context.0);
            let populated = self
                .devices
                .iter()
                .any(|spec| platform_for(spec.device_type) == platform);
            if populated && !self.legacy_api {
                return Ok(platform);
            }
            return Err(DeviceError::UnknownContext(context.0));
        }
        lock(&self.queue_contexts)
            .get(&context.0)
            .copied()
            .ok_or(DeviceError::UnknownContext(context.0))
    }

    /// Allocates `bytes` of zeroed memory of the given kind.
    ///
    /// `device` must belong to the platform of `context`; host allocations
    /// only check the context.
    pub fn malloc(
        &self,
        kind: UsmAllocKind,
        bytes: usize,
        device: DeviceHandle,
        context: ContextHandle,
    ) -> DeviceResult<*mut c_void> {
        if kind == UsmAllocKind::Unknown {
            return Err(DeviceError::Runtime(
                "cannot allocate memory of unknown kind".to_string(),
            ));
        }
        if bytes == 0 {
            return Err(DeviceError::Runtime("zero-sized USM allocation".to_string()));
        }
        let context_platform = self.context_platform(context)?;
        if kind != UsmAllocKind::Host {
            let device_platform = platform_for(self.spec(device)?.device_type);
            if device_platform != context_platform {
                return Err(DeviceError::Runtime(format!(
                    "device {} is not part of context {}",
                    device.0, context.0
                )));
            }
        }

        let layout = Layout::from_size_align(bytes, ALIGNMENT)
            .map_err(|err| DeviceError::Runtime(format!("invalid allocation layout: {err}")))?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(DeviceError::Runtime(format!(
                "allocation of {bytes} bytes failed"
            )));
        }
        lock(&self.allocations).insert(
            ptr as usize,
            Allocation {
                layout,
                kind,
                context,
            },
        );
        debug!(%kind, bytes, context = context.0, "usm allocation");
        Ok(ptr as *mut c_void)
    }

    pub fn malloc_shared(
        &self,
        bytes: usize,
        device: DeviceHandle,
        context: ContextHandle,
    ) -> DeviceResult<*mut c_void> {
        self.malloc(UsmAllocKind::Shared, bytes, device, context)
    }

    pub fn malloc_device(
        &self,
        bytes: usize,
        device: DeviceHandle,
        context: ContextHandle,
    ) -> DeviceResult<*mut c_void> {
        self.malloc(UsmAllocKind::Device, bytes, device, context)
    }

    pub fn malloc_host(&self, bytes: usize, context: ContextHandle) -> DeviceResult<*mut c_void> {
        self.malloc(UsmAllocKind::Host, bytes, DeviceHandle(u64::MAX), context)
    }

    /// Releases an allocation made through this runtime in `context`.
    pub fn free(&self, ptr: *mut c_void, context: ContextHandle) -> DeviceResult<()> {
        let mut allocations = lock(&self.allocations);
        let key = ptr as usize;
        match allocations.get(&key) {
            Some(allocation) if allocation.context == context => {}
            Some(_) => {
                return Err(DeviceError::Runtime(format!(
                    "pointer {ptr:p} belongs to a different context"
                )))
            }
            None => {
                return Err(DeviceError::Runtime(format!(
                    "pointer {ptr:p} was not allocated by this runtime"
                )))
            }
        }
        if let Some(allocation) = allocations.remove(&key) {
            // SAFETY: the pointer was produced by `alloc_zeroed` with this layout.
            unsafe { dealloc(ptr as *mut u8, allocation.layout) };
        }
        Ok(())
    }

    /// Number of allocations that have not been freed.
    pub fn live_allocations(&self) -> usize {
        lock(&self.allocations).len()
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        let allocations = std::mem::take(
            self.allocations
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !allocations.is_empty() {
            warn!(count = allocations.len(), "host runtime dropped with live USM allocations");
        }
        for (address, allocation) in allocations {
            // SAFETY: every key was produced by `alloc_zeroed` with the stored layout.
            unsafe { dealloc(address as *mut u8, allocation.layout) };
        }
    }
}

impl DeviceRuntime for HostRuntime {
    fn devices(&self) -> DeviceResult<Vec<DeviceHandle>> {
        Ok((0..self.devices.len() as u64).map(DeviceHandle).collect())
    }

    fn device_type(&self, device: DeviceHandle) -> DeviceResult<DeviceType> {
        Ok(self.spec(device)?.device_type)
    }

    fn device_name(&self, device: DeviceHandle) -> DeviceResult<String> {
        Ok(self.spec(device)?.name.clone())
    }

    fn platform(&self, device: DeviceHandle) -> DeviceResult<PlatformHandle> {
        Ok(platform_for(self.spec(device)?.device_type))
    }

    fn default_rank(&self, device: DeviceHandle) -> i32 {
        self.spec(device).map(|spec| spec.rank).unwrap_or(-1)
    }

    fn supports_platform_default_context(&self) -> bool {
        !self.legacy_api
    }

    fn queue_context(&self, device: DeviceHandle) -> DeviceResult<ContextHandle> {
        let platform = self.platform(device)?;
        let id = self.next_context.fetch_add(1, Ordering::Relaxed);
        lock(&self.queue_contexts).insert(id, platform);
        Ok(ContextHandle(id))
    }

    fn platform_default_context(&self, platform: PlatformHandle) -> DeviceResult<ContextHandle> {
        if self.legacy_api {
            return Err(DeviceError::Runtime(
                "platform default contexts are not available in this runtime".to_string(),
            ));
        }
        let context = ContextHandle(platform.0);
        self.context_platform(context)?;
        Ok(context)
    }

    fn pointer_kind(&self, ptr: *const c_void, context: ContextHandle) -> UsmAllocKind {
        let address = ptr as usize;
        if address == 0 {
            return UsmAllocKind::Unknown;
        }
        let allocations = lock(&self.allocations);
        match allocations.range(..=address).next_back() {
            Some((base, allocation))
                if address < base + allocation.layout.size() && allocation.context == context =>
            {
                allocation.kind
            }
            _ => UsmAllocKind::Unknown,
        }
    }
}
