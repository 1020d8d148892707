// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{Parser, ValueEnum};
use rand::Rng;
use std::error::Error;
use std::ffi::c_void;
use std::process::ExitCode;
use std::slice;

use tracing::{debug, info};
use usm_config::tracing::{flush_chrome_trace, init_tracing, InitError};
use usm_device::{
    ContextHandle, ContextResolver, DeviceFilter, DeviceRuntime, HostRuntime, UsmAllocKind,
};
use usm_dlpack::{compact_strides, dlpack_device, DLDataType, DLManagedTensor, DLTensor};
use usm_dlpack_sys::{Finalize, FreeHandle, Give};

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AllocArg {
    Shared,
    Device,
    Host,
}

impl From<AllocArg> for UsmAllocKind {
    fn from(arg: AllocArg) -> Self {
        match arg {
            AllocArg::Shared => UsmAllocKind::Shared,
            AllocArg::Device => UsmAllocKind::Device,
            AllocArg::Host => UsmAllocKind::Host,
        }
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Hand a USM-backed f32 tensor to the DLPack bridge and release it"
)]
struct Cli {
    /// Device filter, `<cpu|gpu|accelerator>[:ordinal]`
    #[arg(long, default_value = "cpu:0")]
    device: String,

    /// USM allocation kind backing the tensor
    #[arg(long, value_enum, default_value_t = AllocArg::Shared)]
    kind: AllocArg,

    /// Comma separated tensor shape
    #[arg(long, value_delimiter = ',', default_values_t = vec![3i64, 1, 30])]
    shape: Vec<i64>,

    /// Print the held tensor's report as JSON after the hand-off
    #[arg(long)]
    json: bool,

    /// List the runtime's devices as JSON and exit
    #[arg(long)]
    list_devices: bool,
}

/// Producer-side state kept alive until the bridge runs the deleter.
struct DemoBuffer {
    runtime: &'static HostRuntime,
    data: *mut c_void,
    context: ContextHandle,
    shape: Vec<i64>,
    strides: Vec<i64>,
}

unsafe extern "C" fn demo_deleter(managed: *mut DLManagedTensor) {
    let state = Box::from_raw((*managed).manager_ctx as *mut DemoBuffer);
    println!("Deleting manager_ctx:");
    println!("data = {:#x}", state.data as usize);
    println!("shape = {:?}", state.shape);
    if let Err(err) = state.runtime.free(state.data, state.context) {
        eprintln!("failed to free USM buffer: {err}");
    }
    drop(state);
    println!("Deleter self...");
    FreeHandle();
    println!("Done");
}

fn list_devices(runtime: &HostRuntime) -> Result<()> {
    let infos = runtime
        .devices()?
        .into_iter()
        .map(|device| runtime.describe(device))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}

fn bridge_error() -> Option<String> {
    usm_dlpack_sys::last_error_as_str()
}

fn run(cli: Cli) -> Result<()> {
    let runtime = usm_dlpack_sys::runtime()?;
    if cli.list_devices {
        return list_devices(runtime);
    }

    if cli.shape.iter().any(|&extent| extent <= 0) {
        return Err(format!("shape extents must be positive, got {:?}", cli.shape).into());
    }
    let elements = cli
        .shape
        .iter()
        .try_fold(1usize, |acc, &extent| acc.checked_mul(extent as usize))
        .ok_or("tensor volume overflows usize")?;
    let dtype = DLDataType::from_name("float32").ok_or("float32 has no DLPack encoding")?;
    let bytes = elements
        .checked_mul(dtype.element_size())
        .ok_or("tensor size overflows usize")?;

    let filter: DeviceFilter = cli.device.parse()?;
    let device = filter.select(runtime)?;
    let contexts = ContextResolver::detect(runtime, usm_config::config().context)?;
    let context = contexts.default_context_for(runtime, device)?;
    let kind = UsmAllocKind::from(cli.kind);
    let data = runtime.malloc(kind, bytes, device, context)?;
    debug!(%filter, %kind, bytes, "allocated demo buffer");

    // Host runtime memory is host-accessible for every allocation kind.
    let values = unsafe { slice::from_raw_parts_mut(data as *mut f32, elements) };
    let mut rng = rand::thread_rng();
    values.iter_mut().for_each(|v| *v = rng.gen::<f32>());

    println!("Created:");
    println!("data = {:#x}", data as usize);
    println!("dtype = float32");
    println!("ndim = {}", cli.shape.len());
    println!("shape = {:?}", cli.shape);
    println!("sycl_dlpack_id {filter}");

    let device_tag = dlpack_device(runtime, device)?;
    let mut state = Box::new(DemoBuffer {
        runtime,
        data,
        context,
        strides: compact_strides(&cli.shape),
        shape: cli.shape.clone(),
    });
    let dl_tensor = DLTensor {
        data,
        device: device_tag,
        ndim: i32::try_from(state.shape.len())?,
        dtype,
        shape: state.shape.as_mut_ptr(),
        strides: state.strides.as_mut_ptr(),
        byte_offset: 0,
    };
    let manager_ctx = Box::into_raw(state) as *mut c_void;
    let managed = DLManagedTensor {
        dl_tensor,
        manager_ctx,
        deleter: Some(demo_deleter),
    };

    println!("-------------------------");
    unsafe { Give(managed) };
    if let Some(message) = bridge_error() {
        // The bridge did not take the tensor, so its memory is still ours.
        let state = unsafe { Box::from_raw(manager_ctx as *mut DemoBuffer) };
        runtime.free(state.data, state.context)?;
        return Err(message.into());
    }
    if cli.json {
        if let Some(report) = usm_dlpack_sys::held_report() {
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    println!("-------------------------");
    Finalize();
    if let Some(message) = bridge_error() {
        return Err(message.into());
    }
    if usm_dlpack_sys::usm_dlpack_is_holding() != 0 {
        FreeHandle();
    }
    println!("-------------------------");

    let live = runtime.live_allocations();
    if live != 0 {
        return Err(format!("{live} USM allocations still live after release").into());
    }
    info!("demo tensor released");
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = init_tracing() {
        if !matches!(err, InitError::AlreadyInitialised) {
            eprintln!("failed to initialise tracing: {err}");
        }
    }
    let cli = Cli::parse();
    let outcome = run(cli);
    flush_chrome_trace();
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
