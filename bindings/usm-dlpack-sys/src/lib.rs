// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! C-ABI adapter over the hand-off station.
//!
//! Foreign callers see a single process-wide slot: `Give` fills it, `Finalize`
//! runs the held tensor's deleter and `FreeHandle` empties it once the
//! deleter has run. Errors never
//! cross the boundary as panics; they are logged and kept in a thread-local
//! message that `usm_dlpack_last_error_message` copies out.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CString};
use std::io::Write;
use std::ptr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::error;
use usm_config::tracing::{init_tracing, InitError};
use usm_device::HostRuntime;
use usm_dlpack::{DLManagedTensor, HandoffError, HandoffStation, HeldTensor, TensorReport};

pub use usm_dlpack;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

static RUNTIME: OnceLock<Result<HostRuntime, String>> = OnceLock::new();
static STATION: OnceLock<Result<HandoffStation<'static>, String>> = OnceLock::new();
static SLOT: Mutex<Option<HeldTensor<'static>>> = Mutex::new(None);
static TRACING: OnceLock<()> = OnceLock::new();

fn set_last_error(message: impl Into<String>) {
    let owned = message.into();
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = Some(CString::new(owned).unwrap_or_else(|_| {
            CString::from(c"<error message contained null byte>")
        }));
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = None;
    });
}

fn fail(entry: &str, message: impl Into<String>) {
    let message = message.into();
    error!(entry, %message, "bridge call failed");
    set_last_error(format!("{entry}: {message}"));
}

fn ensure_tracing() {
    TRACING.get_or_init(|| match init_tracing() {
        Ok(()) | Err(InitError::AlreadyInitialised) => {}
        Err(err) => eprintln!("[usm-dlpack] failed to initialise tracing: {err}"),
    });
}

fn slot() -> MutexGuard<'static, Option<HeldTensor<'static>>> {
    SLOT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide runtime used by the C entry points, built from the
/// environment on first use.
pub fn runtime() -> Result<&'static HostRuntime, String> {
    RUNTIME
        .get_or_init(|| HostRuntime::from_env().map_err(|err| err.to_string()))
        .as_ref()
        .map_err(Clone::clone)
}

fn station() -> Result<&'static HandoffStation<'static>, String> {
    STATION
        .get_or_init(|| {
            let runtime = runtime()?;
            HandoffStation::from_config(runtime, usm_config::config())
                .map_err(|err| err.to_string())
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// Returns the last recorded error on this thread, if any.
pub fn last_error_as_str() -> Option<String> {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|s| s.to_string_lossy().into_owned())
    })
}

/// Clone of the report for the currently held tensor.
pub fn held_report() -> Option<TensorReport> {
    slot().as_ref().map(|held| held.report().clone())
}

/// Inspects the descriptor, prints its report to stdout and keeps a copy.
///
/// On failure nothing is held, the producer's deleter is not called and the
/// reason is available through `usm_dlpack_last_error_message`.
///
/// # Safety
/// `shape` and `strides` inside the descriptor must be valid for `ndim`
/// elements, and its deleter must accept a pointer to a copy of it.
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn Give(dl_managed_tensor: DLManagedTensor) {
    ensure_tracing();
    let station = match station() {
        Ok(station) => station,
        Err(message) => return fail("Give", message),
    };

    let mut slot = slot();
    if slot.is_some() {
        return fail("Give", HandoffError::SlotOccupied.to_string());
    }
    match station.ingest(dl_managed_tensor) {
        Ok(held) => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "Received DLPack tensor\n{}", held.report());
            let _ = out.flush();
            *slot = Some(held);
            clear_last_error();
        }
        Err(err) => fail("Give", err.to_string()),
    }
}

/// Runs the held tensor's deleter. The tensor stays held until `FreeHandle`.
///
/// The slot lock is released before the deleter runs, so the deleter may call
/// `FreeHandle` itself.
#[allow(non_snake_case)]
#[no_mangle]
pub extern "C" fn Finalize() {
    let call = {
        let mut slot = slot();
        match slot.as_mut() {
            Some(held) => held.prepare_finalize(),
            None => Err(HandoffError::InvalidState("Finalize")),
        }
    };
    match call {
        Ok(call) => {
            clear_last_error();
            // SAFETY: the held copy stays in the slot until `FreeHandle`, and
            // the deleter contract was accepted by `Give`.
            unsafe { call.invoke() };
        }
        Err(err) => fail("Finalize", err.to_string()),
    }
}

/// Frees the local copy of the descriptor and empties the slot.
///
/// Refused while the held tensor's deleter has not run: the tensor stays held
/// and the last error reports why.
#[allow(non_snake_case)]
#[no_mangle]
pub extern "C" fn FreeHandle() {
    let result = {
        let mut slot = slot();
        let held = slot.take();
        match held {
            Some(held) => held.release().map_err(|refused| {
                let err = refused.error();
                *slot = Some(refused.into_inner());
                err
            }),
            None => Err(HandoffError::InvalidState("FreeHandle")),
        }
    };
    match result {
        Ok(()) => clear_last_error(),
        Err(err) => fail("FreeHandle", err.to_string()),
    }
}

/// Returns 1 while a tensor is held, 0 otherwise.
#[no_mangle]
pub extern "C" fn usm_dlpack_is_holding() -> c_int {
    c_int::from(slot().is_some())
}

/// Returns the length of the last error message (in bytes, excluding the
/// trailing null terminator).
#[no_mangle]
pub extern "C" fn usm_dlpack_last_error_length() -> usize {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|msg| msg.as_bytes().len())
            .unwrap_or(0)
    })
}

/// Copies the last error message into the provided buffer and returns the
/// number of bytes copied (excluding the null terminator). If no error is
/// present the function returns `0` and the buffer is left untouched.
///
/// # Safety
/// `buffer` must be null or valid for `capacity` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn usm_dlpack_last_error_message(
    buffer: *mut c_char,
    capacity: usize,
) -> usize {
    if buffer.is_null() || capacity == 0 {
        return 0;
    }
    LAST_ERROR.with(|slot| {
        if let Some(message) = slot.borrow().as_ref() {
            let bytes = message.as_bytes();
            let to_copy = bytes.len().min(capacity.saturating_sub(1));
            ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buffer, to_copy);
            *buffer.add(to_copy) = 0;
            to_copy
        } else {
            0
        }
    })
}

/// Clears the last error so subsequent calls observe an empty state.
#[no_mangle]
pub extern "C" fn usm_dlpack_clear_last_error() {
    clear_last_error();
}
