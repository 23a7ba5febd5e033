use std::sync::Arc;

use anyhow::{Result, ensure};
use tracing::trace;

use crate::vm::{Code, Frame, ThreadState, Val, eval_frame_default};

/// Builds a frame for `replacement` seeded with the live state of `original`.
///
/// Locals are copied positionally. Cell and free slots move to the tail of
/// the replacement's larger slot array, right after its own locals. Each
/// copied slot is a new handle to the same value, so cells stay shared with
/// the original frame and any closures over them. Slots past the original's
/// locals start unbound.
pub fn build_shadow_frame(ts: &ThreadState, original: &Frame, replacement: &Arc<Code>) -> Result<Frame> {
    let old = original.code();
    let nlocals_old = old.nlocals();
    let nlocals_new = replacement.nlocals();
    let nderef = old.ncells() + old.nfrees();

    ensure!(
        nlocals_new >= nlocals_old,
        "replacement {} declares {} locals, fewer than the {} of {}",
        replacement.name(),
        nlocals_new,
        nlocals_old,
        old.name()
    );
    ensure!(
        replacement.ncells() == old.ncells() && replacement.nfrees() == old.nfrees(),
        "replacement {} has {} cells / {} frees, {} has {} / {}",
        replacement.name(),
        replacement.ncells(),
        replacement.nfrees(),
        old.name(),
        old.ncells(),
        old.nfrees()
    );

    let mut shadow = Frame::new(
        replacement.clone(),
        original.globals().clone(),
        ts.interpreter().builtins().clone(),
    )?;
    let src = original.slots();
    let dst = shadow.slots_mut();
    dst[..nlocals_old].clone_from_slice(&src[..nlocals_old]);
    dst[nlocals_new..nlocals_new + nderef].clone_from_slice(&src[nlocals_old..nlocals_old + nderef]);

    trace!(
        target: "evalhook::hook",
        from = old.name(),
        to = replacement.name(),
        nlocals_old,
        nlocals_new,
        nderef,
        "built shadow frame"
    );
    Ok(shadow)
}

/// Runs `replacement` in place of `frame` on the default evaluator. The
/// shadow frame is dropped once evaluation returns.
pub fn eval_custom_code(ts: &mut ThreadState, frame: &Frame, replacement: &Arc<Code>) -> Result<Val> {
    let shadow = build_shadow_frame(ts, frame, replacement)?;
    eval_frame_default(ts, shadow)
}
