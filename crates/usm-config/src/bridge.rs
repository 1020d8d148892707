// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Device list used by the host runtime when `USM_DLPACK_DEVICES` is unset.
pub const DEFAULT_DEVICE_HINTS: &str = "cpu,gpu";

/// Requested way of obtaining a device's default context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextHint {
    /// Let the runtime's capability report decide.
    #[default]
    Auto,
    /// Build a transient queue and read its context back.
    Queue,
    /// Use the platform's shared default context.
    Platform,
}

impl fmt::Display for ContextHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextHint::Auto => write!(f, "auto"),
            ContextHint::Queue => write!(f, "queue"),
            ContextHint::Platform => write!(f, "platform"),
        }
    }
}

impl FromStr for ContextHint {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(ContextHint::Auto),
            "queue" | "legacy" => Ok(ContextHint::Queue),
            "platform" | "default" => Ok(ContextHint::Platform),
            other => Err(format!("unknown context strategy '{other}'")),
        }
    }
}

/// Snapshot of the bridge settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Comma separated device list for the host runtime.
    pub device_hints: String,
    /// How default contexts are acquired.
    pub context: ContextHint,
    /// If true the host runtime pretends to predate platform default contexts.
    pub legacy_runtime: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_hints: DEFAULT_DEVICE_HINTS.to_string(),
            context: ContextHint::Auto,
            legacy_runtime: false,
        }
    }
}

impl BridgeConfig {
    /// Builds a configuration snapshot from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let device_hints = std::env::var("USM_DLPACK_DEVICES")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_HINTS.to_string());

        let context = std::env::var("USM_DLPACK_CONTEXT")
            .ok()
            .and_then(|v| v.parse::<ContextHint>().ok())
            .unwrap_or_default();

        let legacy_runtime = std::env::var("USM_DLPACK_LEGACY_RUNTIME")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "on" | "ON"))
            .unwrap_or(false);

        Self {
            device_hints,
            context,
            legacy_runtime,
        }
    }
}

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Returns the lazily initialised bridge configuration.
pub fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    fn with_env(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let snapshot: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
                ((*key).to_string(), previous)
            })
            .collect();

        let result = catch_unwind(AssertUnwindSafe(test));

        for (key, value) in snapshot {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }

        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn defaults_without_environment() {
        with_env(
            &[
                ("USM_DLPACK_DEVICES", None),
                ("USM_DLPACK_CONTEXT", None),
                ("USM_DLPACK_LEGACY_RUNTIME", None),
            ],
            || {
                assert_eq!(BridgeConfig::from_env(), BridgeConfig::default());
            },
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        with_env(
            &[
                ("USM_DLPACK_DEVICES", Some("gpu,gpu,accelerator")),
                ("USM_DLPACK_CONTEXT", Some("Queue")),
                ("USM_DLPACK_LEGACY_RUNTIME", Some("on")),
            ],
            || {
                let cfg = BridgeConfig::from_env();
                assert_eq!(cfg.device_hints, "gpu,gpu,accelerator");
                assert_eq!(cfg.context, ContextHint::Queue);
                assert!(cfg.legacy_runtime);
            },
        );
    }

    #[test]
    fn unknown_context_falls_back_to_auto() {
        with_env(&[("USM_DLPACK_CONTEXT", Some("sideways"))], || {
            assert_eq!(BridgeConfig::from_env().context, ContextHint::Auto);
        });
    }

    #[test]
    fn context_hint_parses_aliases() {
        assert_eq!("legacy".parse::<ContextHint>(), Ok(ContextHint::Queue));
        assert_eq!("default".parse::<ContextHint>(), Ok(ContextHint::Platform));
        assert!("nope".parse::<ContextHint>().is_err());
        assert_eq!(ContextHint::Platform.to_string(), "platform");
    }
}
