// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Tensor hand-off.
//!
//! A producer hands a [`DLManagedTensor`] to the station, which inspects it
//! and keeps a private copy behind a [`HeldTensor`] token. The token is the
//! only way to run the producer's deleter and to release the copy, so the
//! lifecycle is spelled out by ownership:
//!
//! ```text
//! empty --ingest--> held --finalize--> held (finalized) --release--> empty
//! ```
//!
//! At most one token is outstanding per station. Releasing a token whose
//! deleter has not run is refused; dropping one runs the deleter first.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use usm_config::BridgeConfig;
use usm_device::{ContextResolver, DeviceRuntime};

use crate::dlpack::DLManagedTensor;
use crate::error::{HandoffError, HandoffResult};
use crate::report::TensorReport;

pub struct HandoffStation<'rt> {
    runtime: &'rt dyn DeviceRuntime,
    contexts: ContextResolver,
    occupied: AtomicBool,
}

impl<'rt> HandoffStation<'rt> {
    pub fn new(runtime: &'rt dyn DeviceRuntime, contexts: ContextResolver) -> Self {
        Self {
            runtime,
            contexts,
            occupied: AtomicBool::new(false),
        }
    }

    /// Builds a station whose context strategy follows `cfg`.
    pub fn from_config(
        runtime: &'rt dyn DeviceRuntime,
        cfg: &BridgeConfig,
    ) -> HandoffResult<Self> {
        let contexts = ContextResolver::detect(runtime, cfg.context)?;
        Ok(Self::new(runtime, contexts))
    }

    pub fn runtime(&self) -> &'rt dyn DeviceRuntime {
        self.runtime
    }

    pub fn contexts(&self) -> &ContextResolver {
        &self.contexts
    }

    /// Whether a [`HeldTensor`] from this station is still alive.
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    /// Takes ownership of a copy of `managed` after inspecting it.
    ///
    /// Ingestion is all-or-nothing: on error the station stays empty and the
    /// producer's deleter is not called, so the producer still owns its buffer.
    ///
    /// # Safety
    /// The descriptor's `shape`/`strides` must be valid for `ndim` elements,
    /// and its deleter must accept a pointer to a bitwise copy of the
    /// descriptor, from the thread that finalizes it.
    pub unsafe fn ingest(&self, managed: DLManagedTensor) -> HandoffResult<HeldTensor<'_>> {
        if self.is_occupied() {
            return Err(HandoffError::SlotOccupied);
        }
        let report = TensorReport::inspect(self.runtime, &self.contexts, &managed.dl_tensor)?;
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HandoffError::SlotOccupied)?;

        info!(
            device_type = report.device_type,
            device_id = report.device_id,
            ndim = report.ndim,
            alloc = %report.alloc_kind,
            "tensor handed off"
        );
        Ok(HeldTensor {
            managed: Box::new(managed),
            report,
            finalized: false,
            slot: &self.occupied,
        })
    }
}

/// Ownership token for an ingested tensor.
///
/// Dropping the token runs the producer's deleter if nobody claimed it yet,
/// then releases the local copy.
#[derive(Debug)]
pub struct HeldTensor<'s> {
    managed: Box<DLManagedTensor>,
    report: TensorReport,
    finalized: bool,
    slot: &'s AtomicBool,
}

// SAFETY: the descriptor is plain data plus a C function pointer; `ingest`
// requires its deleter to be callable from the finalizing thread.
unsafe impl Send for HeldTensor<'_> {}

impl<'s> HeldTensor<'s> {
    pub fn report(&self) -> &TensorReport {
        &self.report
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Marks the tensor finalized and hands back the deleter call without
    /// running it. Fails if the deleter was already claimed.
    pub fn prepare_finalize(&mut self) -> HandoffResult<FinalizeCall> {
        if self.finalized {
            return Err(HandoffError::AlreadyFinalized);
        }
        self.finalized = true;
        Ok(FinalizeCall {
            deleter: self.managed.deleter,
            target: &mut *self.managed as *mut DLManagedTensor,
        })
    }

    /// Runs the producer's deleter on the held copy, once.
    pub fn finalize(&mut self) -> HandoffResult<()> {
        let call = self.prepare_finalize()?;
        // SAFETY: the held copy outlives this call; the deleter contract was
        // accepted at ingest.
        unsafe { call.invoke() };
        Ok(())
    }

    /// Frees the local copy and empties the station.
    ///
    /// Refused until the deleter has been claimed; the token comes back
    /// inside the error so it can be finalized first.
    pub fn release(self) -> Result<(), ReleaseRefused<'s>> {
        if !self.finalized {
            return Err(ReleaseRefused { held: self });
        }
        debug!(data = self.report.data, "releasing held tensor");
        Ok(())
    }
}

impl Drop for HeldTensor<'_> {
    fn drop(&mut self) {
        if let Ok(call) = self.prepare_finalize() {
            warn!(
                data = self.report.data,
                "held tensor dropped before finalize; running its deleter"
            );
            // SAFETY: the copy is still boxed in `self`; the deleter contract
            // was accepted at ingest.
            unsafe { call.invoke() };
        }
        self.slot.store(false, Ordering::Release);
    }
}

/// [`HeldTensor::release`] called before the producer's deleter ran.
#[derive(Debug)]
pub struct ReleaseRefused<'s> {
    held: HeldTensor<'s>,
}

impl<'s> ReleaseRefused<'s> {
    pub fn error(&self) -> HandoffError {
        HandoffError::NotFinalized
    }

    /// Hands the still-held tensor back.
    pub fn into_inner(self) -> HeldTensor<'s> {
        self.held
    }
}

impl fmt::Display for ReleaseRefused<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&HandoffError::NotFinalized, f)
    }
}

impl std::error::Error for ReleaseRefused<'_> {}

/// A claimed but not yet executed deleter invocation.
#[derive(Debug)]
pub struct FinalizeCall {
    deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
    target: *mut DLManagedTensor,
}

impl FinalizeCall {
    pub fn has_deleter(&self) -> bool {
        self.deleter.is_some()
    }

    /// Invokes the deleter with the held copy.
    ///
    /// # Safety
    /// The [`HeldTensor`] this call came from must still be alive when the
    /// deleter starts. The deleter may release it, provided it does not touch
    /// the descriptor afterwards.
    pub unsafe fn invoke(self) {
        match self.deleter {
            Some(deleter) => deleter(self.target),
            None => debug!("tensor has no deleter; nothing to finalize"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlpack::{DLDataType, DLDevice, DLDeviceType, DLTensor};
    use std::ffi::c_void;
    use std::sync::atomic::AtomicUsize;
    use usm_device::{ContextStrategy, HostRuntime};

    unsafe extern "C" fn count_deleter(managed: *mut DLManagedTensor) {
        let counter = &*((*managed).manager_ctx as *const AtomicUsize);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn descriptor(shape: &mut [i64], counter: &AtomicUsize) -> DLManagedTensor {
        DLManagedTensor {
            dl_tensor: DLTensor {
                data: std::ptr::null_mut(),
                device: DLDevice::new(DLDeviceType::OneApiCpu, 0),
                ndim: shape.len() as i32,
                dtype: DLDataType::from_name("float32").unwrap(),
                shape: shape.as_mut_ptr(),
                strides: std::ptr::null_mut(),
                byte_offset: 0,
            },
            manager_ctx: counter as *const AtomicUsize as *mut c_void,
            deleter: Some(count_deleter),
        }
    }

    #[test]
    fn finalize_runs_deleter_exactly_once() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        let station = HandoffStation::new(
            &runtime,
            ContextResolver::new(ContextStrategy::PlatformDefault),
        );
        let counter = AtomicUsize::new(0);
        let mut shape = [2, 2];

        let mut held = unsafe { station.ingest(descriptor(&mut shape, &counter)) }.unwrap();
        assert!(station.is_occupied());
        held.finalize().unwrap();
        assert_eq!(held.finalize(), Err(HandoffError::AlreadyFinalized));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        held.release().unwrap();
        assert!(!station.is_occupied());
    }

    #[test]
    fn release_before_finalize_is_refused() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        let station = HandoffStation::new(
            &runtime,
            ContextResolver::new(ContextStrategy::PlatformDefault),
        );
        let counter = AtomicUsize::new(0);
        let mut shape = [4];

        let held = unsafe { station.ingest(descriptor(&mut shape, &counter)) }.unwrap();
        let refused = held.release().unwrap_err();
        assert_eq!(refused.error(), HandoffError::NotFinalized);
        assert!(station.is_occupied());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let mut held = refused.into_inner();
        held.finalize().unwrap();
        held.release().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!station.is_occupied());
    }

    #[test]
    fn dropping_unfinalized_token_runs_deleter() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        let station = HandoffStation::new(
            &runtime,
            ContextResolver::new(ContextStrategy::PlatformDefault),
        );
        let counter = AtomicUsize::new(0);
        let mut shape = [2];

        let held = unsafe { station.ingest(descriptor(&mut shape, &counter)) }.unwrap();
        drop(held);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!station.is_occupied());
    }

    #[test]
    fn second_ingest_while_held_is_refused() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        let station = HandoffStation::new(
            &runtime,
            ContextResolver::new(ContextStrategy::QueueDerived),
        );
        let counter = AtomicUsize::new(0);
        let mut first_shape = [1];
        let mut second_shape = [1];

        let mut held = unsafe { station.ingest(descriptor(&mut first_shape, &counter)) }.unwrap();
        let refused = unsafe { station.ingest(descriptor(&mut second_shape, &counter)) };
        assert!(matches!(refused, Err(HandoffError::SlotOccupied)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        held.finalize().unwrap();
        held.release().unwrap();
        let mut next = unsafe { station.ingest(descriptor(&mut second_shape, &counter)) }.unwrap();
        next.finalize().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_deleter_finalizes_quietly() {
        let runtime = HostRuntime::from_hints("cpu").unwrap();
        let station = HandoffStation::new(
            &runtime,
            ContextResolver::new(ContextStrategy::PlatformDefault),
        );
        let counter = AtomicUsize::new(0);
        let mut shape = [3];
        let mut managed = descriptor(&mut shape, &counter);
        managed.deleter = None;

        let mut held = unsafe { station.ingest(managed) }.unwrap();
        let call = held.prepare_finalize().unwrap();
        assert!(!call.has_deleter());
        unsafe { call.invoke() };
        assert!(held.is_finalized());
    }
}
