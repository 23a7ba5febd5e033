use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::vm::{Code, EvalFrameFn, ExtraIndex, Interpreter, ThreadState, eval_frame_default};

use super::cache::CacheState;
use super::callback::{FrameCallback, intercept_frame};

/// Loaded hook module: owns the extra-slot index where each code unit keeps
/// its [`CacheState`]. Load once per interpreter and share the handle.
#[derive(Debug)]
pub struct HookModule {
    extra_index: ExtraIndex,
}

impl HookModule {
    pub fn load(interp: &Interpreter) -> Result<Arc<Self>> {
        let extra_index = interp.request_extra_index()?;
        debug!(target: "evalhook::hook", index = extra_index.get(), "hook module loaded");
        Ok(Arc::new(Self { extra_index }))
    }

    pub fn extra_index(&self) -> ExtraIndex {
        self.extra_index
    }

    /// Current cache of `code`; `Empty` when nothing was ever stored.
    pub fn cache(&self, code: &Code) -> Arc<CacheState> {
        code.get_extra::<CacheState>(self.extra_index)
            .unwrap_or_else(|| Arc::new(CacheState::Empty))
    }

    pub(crate) fn store_cache(&self, code: &Code, state: CacheState) {
        code.set_extra(self.extra_index, Arc::new(state));
    }
}

/// Interception state carried by each [`ThreadState`].
///
/// The callback stays stored while interception is temporarily disabled, so
/// the interceptor can re-enable itself after running it.
#[derive(Default)]
pub struct InterceptState {
    pub(crate) module: Option<Arc<HookModule>>,
    pub(crate) callback: Option<Arc<dyn FrameCallback>>,
}

pub fn enable_eval_frame(ts: &mut ThreadState) {
    ts.set_eval_frame_func(intercept_frame);
}

pub fn disable_eval_frame(ts: &mut ThreadState) {
    ts.set_eval_frame_func(eval_frame_default);
}

pub fn is_intercepting(ts: &ThreadState) -> bool {
    std::ptr::fn_addr_eq(ts.eval_frame_func(), intercept_frame as EvalFrameFn)
}

/// Swaps the thread's frame callback and returns the previous one.
///
/// `None` disables interception; `Some` installs the interceptor with the new
/// callback. The return value is `None` when interception was not active.
/// Any dispatch function other than the interceptor or the engine default
/// means another hook owns the thread, and the process is aborted.
pub fn set_eval_frame(
    ts: &mut ThreadState,
    module: &Arc<HookModule>,
    callback: Option<Arc<dyn FrameCallback>>,
) -> Option<Arc<dyn FrameCallback>> {
    let current = ts.eval_frame_func();
    let previous = if std::ptr::fn_addr_eq(current, intercept_frame as EvalFrameFn) {
        ts.intercept.callback.clone()
    } else if std::ptr::fn_addr_eq(current, eval_frame_default as EvalFrameFn) {
        None
    } else {
        super::fatal!("set_eval_frame: thread dispatch function is neither the interceptor nor the default");
    };

    match callback {
        None => {
            debug!(target: "evalhook::hook", "interception disabled");
            disable_eval_frame(ts);
        }
        Some(callback) => {
            debug!(target: "evalhook::hook", "interception enabled");
            enable_eval_frame(ts);
            ts.intercept.module = Some(module.clone());
            ts.intercept.callback = Some(callback);
        }
    }
    previous
}

/// Installs `callback` for the duration of `f`, then restores whatever was
/// installed before, including on the path where `f` saw a callback error.
pub fn run_with_callback<R>(
    ts: &mut ThreadState,
    module: &Arc<HookModule>,
    callback: Option<Arc<dyn FrameCallback>>,
    f: impl FnOnce(&mut ThreadState) -> R,
) -> R {
    let prior = set_eval_frame(ts, module, callback);
    let out = f(ts);
    set_eval_frame(ts, module, prior);
    out
}
