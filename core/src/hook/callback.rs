use anyhow::Result;
use tracing::{debug, trace};

use crate::config::HookConfig;
use crate::vm::{Frame, ThreadState, Val, eval_frame_default};

use super::cache::{CacheEntry, CacheState, GuardedCode};
use super::dispatch::{disable_eval_frame, enable_eval_frame};
use super::migrate::eval_custom_code;

/// External compiler hook consulted for every intercepted frame.
///
/// `cache_size` is the number of replacements already cached for the unit.
/// Return `Ok(None)` to run the unit normally from now on, `Ok(Some(_))` to
/// cache and run a replacement, or `Err` to fail the call.
///
/// Interception is off while the callback runs, so code it executes through
/// `ts` is not intercepted.
pub trait FrameCallback: Send + Sync {
    fn call(&self, ts: &mut ThreadState, frame: &Frame, cache_size: usize) -> Result<Option<GuardedCode>>;
}

impl<F> FrameCallback for F
where
    F: Fn(&mut ThreadState, &Frame, usize) -> Result<Option<GuardedCode>> + Send + Sync,
{
    fn call(&self, ts: &mut ThreadState, frame: &Frame, cache_size: usize) -> Result<Option<GuardedCode>> {
        self(ts, frame, cache_size)
    }
}

/// The dispatch function installed by [`set_eval_frame`](super::set_eval_frame).
///
/// A `Skip` unit goes straight to the default evaluator. Otherwise locals are
/// materialized and the callback runs with interception disabled:
/// - `Err` is returned as is; interception stays disabled and the cache is
///   untouched.
/// - `None` marks the unit `Skip`, re-enables interception and runs the
///   original frame.
/// - `Some` prepends a cache entry, re-enables interception and runs the
///   replacement in a shadow frame.
pub fn intercept_frame(ts: &mut ThreadState, mut frame: Frame) -> Result<Val> {
    let Some(module) = ts.intercept.module.clone() else {
        super::fatal!("intercept_frame: interceptor installed without a hook module");
    };
    let code = frame.code().clone();
    trace!(target: "evalhook::hook", code = code.name(), file = code.filename(), "intercepted frame");

    let cache = module.cache(&code);
    if cache.is_skip() {
        trace!(target: "evalhook::hook", code = code.name(), "skip");
        return eval_frame_default(ts, frame);
    }
    frame.fast_to_locals();

    let Some(callback) = ts.intercept.callback.clone() else {
        super::fatal!("intercept_frame: interceptor installed without a callback");
    };
    disable_eval_frame(ts);

    let cache_size = cache.len();
    let result = match callback.call(ts, &frame, cache_size) {
        Ok(result) => result,
        Err(err) => {
            debug!(target: "evalhook::hook", code = code.name(), error = %err, "callback failed");
            return Err(err);
        }
    };

    match result {
        Some(guarded) => {
            debug!(
                target: "evalhook::hook",
                code = code.name(),
                replacement = guarded.code.name(),
                cache_size = cache_size + 1,
                "create cache entry"
            );
            trace!(target: "evalhook::hook", "{}", guarded.code.disassemble());
            let entry = CacheEntry::from(guarded);
            let replacement = entry.code().clone();
            module.store_cache(&code, cache.prepend(entry));
            enable_eval_frame(ts);
            eval_custom_code(ts, &frame, &replacement)
        }
        None => {
            debug!(target: "evalhook::hook", code = code.name(), "create skip");
            module.store_cache(&code, CacheState::Skip);
            enable_eval_frame(ts);
            eval_frame_default(ts, frame)
        }
    }
}

/// Callback filter that answers "no replacement" for units whose filename
/// lies under one of `dirs`, and defers to `inner` otherwise.
pub struct SkipFiles<C> {
    dirs: Vec<String>,
    inner: C,
}

impl<C> SkipFiles<C> {
    pub fn new<I, S>(dirs: I, inner: C) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            inner,
        }
    }

    pub fn from_config(config: &HookConfig, inner: C) -> Self {
        Self::new(config.skip_dirs.iter().cloned(), inner)
    }

    pub fn is_skipped(&self, filename: &str) -> bool {
        self.dirs.iter().any(|dir| filename.starts_with(dir.as_str()))
    }
}

impl<C: FrameCallback> FrameCallback for SkipFiles<C> {
    fn call(&self, ts: &mut ThreadState, frame: &Frame, cache_size: usize) -> Result<Option<GuardedCode>> {
        if self.is_skipped(frame.code().filename()) {
            trace!(target: "evalhook::hook", file = frame.code().filename(), "skipfile");
            return Ok(None);
        }
        self.inner.call(ts, frame, cache_size)
    }
}
