//! Frame-evaluation interception for a bytecode VM.
//!
//! [`vm`] is the engine: code units, frames, and a per-thread dispatch
//! function. [`hook`] swaps that dispatch function for an interceptor which
//! consults an external compiler callback, caches guarded replacements on
//! each code unit, and runs them in frames migrated from the original.

pub mod config;
pub mod hook;
pub mod trace;
pub mod vm;

pub use config::HookConfig;
