//! Frame-evaluation hook.
//!
//! Replaces a thread's dispatch function with [`intercept_frame`], which asks
//! an external [`FrameCallback`] for a guarded replacement of each code unit,
//! caches the answer on the unit, and runs either the original frame or the
//! replacement in a migrated shadow frame.

/// Broken-invariant exit: log, then abort the process.
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        tracing::error!(target: "evalhook::hook", "{}", msg);
        eprintln!("FATAL: {}", msg);
        std::process::abort()
    }};
}
pub(crate) use fatal;

mod cache;
mod callback;
mod dispatch;
mod migrate;

pub use cache::{CacheEntry, CacheState, CheckFn, GuardedCode};
pub use callback::{FrameCallback, SkipFiles, intercept_frame};
pub use dispatch::{
    HookModule, InterceptState, disable_eval_frame, enable_eval_frame, is_intercepting, run_with_callback,
    set_eval_frame,
};
pub use migrate::{build_shadow_frame, eval_custom_code};
