//! Opt-in stderr diagnostics for the `evalhook::*` tracing targets.
//!
//! ```text
//! EVALHOOK_TRACE=1                      # RUST_LOG, else DEFAULT_TRACE_FILTER
//! EVALHOOK_TRACE=evalhook::hook=trace   # value is the filter
//! ```

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const TRACE_ENV: &str = "EVALHOOK_TRACE";
pub const DEFAULT_TRACE_FILTER: &str = "evalhook::hook=debug,evalhook::vm=info";

static INSTALLED: OnceLock<bool> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceSetting {
    Off,
    On,
    Filter(String),
}

impl TraceSetting {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "off" => TraceSetting::Off,
            "1" | "true" | "on" => TraceSetting::On,
            _ => TraceSetting::Filter(raw.to_string()),
        }
    }

    pub fn from_env() -> Self {
        std::env::var(TRACE_ENV).map_or(TraceSetting::Off, |raw| Self::parse(&raw))
    }

    /// Filter for this setting. An unparsable directive falls back to
    /// [`DEFAULT_TRACE_FILTER`].
    fn filter(&self) -> Option<EnvFilter> {
        let expr = match self {
            TraceSetting::Off => return None,
            TraceSetting::On => std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_TRACE_FILTER.to_string()),
            TraceSetting::Filter(expr) => expr.clone(),
        };
        Some(EnvFilter::try_new(expr).unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACE_FILTER)))
    }
}

/// Installs the global stderr subscriber for `setting`.
///
/// Only the first call that is not `Off` installs anything. Returns whether
/// this module's subscriber is the active global one.
pub fn install(setting: &TraceSetting) -> bool {
    let Some(filter) = setting.filter() else {
        return INSTALLED.get().copied().unwrap_or(false);
    };
    *INSTALLED.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    })
}

/// [`install`] driven by `EVALHOOK_TRACE`.
pub fn init_tracing() -> bool {
    install(&TraceSetting::from_env())
}
