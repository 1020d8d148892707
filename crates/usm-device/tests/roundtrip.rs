// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use usm_config::ContextHint;
use usm_device::{
    classify_device, resolve_device, ContextResolver, DeviceClass, DeviceError, DeviceFilter,
    DeviceRuntime, HostRuntime,
};

fn mixed_runtime() -> HostRuntime {
    HostRuntime::from_hints("accelerator,gpu,cpu,gpu:excluded,gpu,cpu,accelerator,custom")
        .expect("valid hints")
}

#[test]
fn resolve_then_classify_returns_requested_class_and_ordinal() {
    let runtime = mixed_runtime();
    let expected = [
        (DeviceClass::Cpu, 2),
        (DeviceClass::Gpu, 2),
        (DeviceClass::Accelerator, 2),
    ];
    for (class, count) in expected {
        for ordinal in 0..count {
            let device = resolve_device(&runtime, class, ordinal).unwrap();
            assert_eq!(
                classify_device(&runtime, device),
                Ok((class, ordinal)),
                "{class}:{ordinal}"
            );
        }
        assert!(matches!(
            resolve_device(&runtime, class, count),
            Err(DeviceError::NoMatchingDevice { .. })
        ));
    }
}

#[test]
fn classify_then_filter_selects_the_same_device() {
    let runtime = mixed_runtime();
    for device in runtime.devices().unwrap() {
        let Ok((class, ordinal)) = classify_device(&runtime, device) else {
            continue;
        };
        let filter: DeviceFilter = format!("{class}:{ordinal}").parse().unwrap();
        assert_eq!(filter.select(&runtime), Ok(device));
    }
}

#[test]
fn every_custom_device_fails_classification() {
    let runtime = mixed_runtime();
    let custom = runtime
        .devices()
        .unwrap()
        .into_iter()
        .filter(|d| runtime.device_type(*d).map(|t| t.as_str() == "custom").unwrap_or(false))
        .collect::<Vec<_>>();
    assert_eq!(custom.len(), 1);
    for device in custom {
        assert!(matches!(
            classify_device(&runtime, device),
            Err(DeviceError::UnsupportedDeviceClass { .. })
        ));
    }
}

#[test]
fn default_context_comes_from_detected_strategy() {
    let runtime = mixed_runtime();
    let resolver = ContextResolver::detect(&runtime, ContextHint::Auto).unwrap();
    let gpu = resolve_device(&runtime, DeviceClass::Gpu, 0).unwrap();
    let ctx = resolver.default_context_for(&runtime, gpu).unwrap();
    let ptr = runtime.malloc_shared(128, gpu, ctx).unwrap();
    assert_eq!(runtime.pointer_kind(ptr, ctx).as_str(), "shared");
    runtime.free(ptr, ctx).unwrap();
}

#[test]
fn device_info_serializes_for_listing() {
    let runtime = HostRuntime::from_hints("gpu").unwrap();
    let device = runtime.devices().unwrap()[0];
    let info = runtime.describe(device).unwrap();
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["device_type"], "gpu");
    assert_eq!(json["name"], "host-gpu-0");
    assert_eq!(json["rank"], 500);
}
