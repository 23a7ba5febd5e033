use std::sync::Arc;

use anyhow::{Result, bail, ensure};

use crate::config::HookConfig;
use crate::hook::InterceptState;

use super::builtins;
use super::code::Code;
use super::eval::eval_frame_default;
use super::extra::{ExtraIndex, ExtraRegistry};
use super::frame::{Frame, Namespace};
use super::value::{CellRef, Function, Val};

/// Frame-evaluation entry point. Every bytecode call is routed through the
/// thread's current `EvalFrameFn`.
pub type EvalFrameFn = fn(&mut ThreadState, Frame) -> Result<Val>;

/// Each interpreted call nests several Rust frames; this depth fits a 2 MiB
/// thread stack in unoptimized builds, with or without interception.
pub const DEFAULT_RECURSION_LIMIT: usize = 64;

/// Process-wide engine state shared by all threads.
#[derive(Debug)]
pub struct Interpreter {
    builtins: Namespace,
    extra: ExtraRegistry,
}

impl Interpreter {
    pub fn new() -> Arc<Self> {
        let builtins = Namespace::new();
        builtins::install(&builtins);
        Arc::new(Self {
            builtins,
            extra: ExtraRegistry::new(),
        })
    }

    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    /// Reserves a fresh per-code side-channel slot.
    pub fn request_extra_index(&self) -> Result<ExtraIndex> {
        self.extra.request()
    }
}

/// Per-thread execution state. Owned by whoever drives the thread and passed
/// by `&mut` to every call site.
pub struct ThreadState {
    interp: Arc<Interpreter>,
    eval_frame: EvalFrameFn,
    depth: usize,
    recursion_limit: usize,
    pub(crate) intercept: InterceptState,
}

impl ThreadState {
    pub fn new(interp: Arc<Interpreter>) -> Self {
        Self {
            interp,
            eval_frame: eval_frame_default,
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            intercept: InterceptState::default(),
        }
    }

    pub fn with_config(interp: Arc<Interpreter>, config: &HookConfig) -> Self {
        let mut ts = Self::new(interp);
        ts.recursion_limit = config.recursion_limit;
        ts
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.interp
    }

    #[inline]
    pub fn eval_frame_func(&self) -> EvalFrameFn {
        self.eval_frame
    }

    /// Replaces the dispatch function for this thread.
    #[inline]
    pub fn set_eval_frame_func(&mut self, func: EvalFrameFn) {
        self.eval_frame = func;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub(crate) fn enter_frame(&mut self, code: &Code) -> Result<()> {
        if self.depth >= self.recursion_limit {
            bail!("RecursionError: maximum recursion depth exceeded in {}", code.name());
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_frame(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Hands `frame` to the active dispatch function.
    pub fn eval(&mut self, frame: Frame) -> Result<Val> {
        let eval_frame = self.eval_frame;
        eval_frame(self, frame)
    }

    /// Runs top-level code against `globals`.
    pub fn run_code(&mut self, code: Arc<Code>, globals: &Namespace) -> Result<Val> {
        let func = Function::new(code, globals.clone());
        let frame = self.new_frame(&func, Vec::new())?;
        self.eval(frame)
    }

    pub fn call(&mut self, callee: &Val, args: Vec<Val>) -> Result<Val> {
        match callee {
            Val::Function(func) => {
                let frame = self.new_frame(func, args)?;
                self.eval(frame)
            }
            Val::Native(native) => (native.func)(&args),
            other => bail!("TypeError: '{}' object is not callable", other.type_name()),
        }
    }

    /// Builds the entry frame for a call: binds positional arguments, creates
    /// fresh cells for cell variables, and installs the closure's cells in the
    /// free slots.
    pub fn new_frame(&self, func: &Function, args: Vec<Val>) -> Result<Frame> {
        let code = &func.code;
        ensure!(
            args.len() == code.argcount(),
            "TypeError: {}() takes {} positional arguments but {} were given",
            code.name(),
            code.argcount(),
            args.len()
        );
        ensure!(
            func.closure.len() == code.nfrees(),
            "{}: closure has {} cells, code expects {}",
            code.name(),
            func.closure.len(),
            code.nfrees()
        );
        let mut frame = Frame::new(code.clone(), func.globals.clone(), self.interp.builtins().clone())?;
        let nlocals = code.nlocals();
        let ncells = code.ncells();
        let slots = frame.slots_mut();
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for (i, name) in code.cellvars().iter().enumerate() {
            // A parameter captured by an inner function lives in its cell.
            let initial = code.varnames()[..code.argcount()]
                .iter()
                .position(|v| v == name)
                .and_then(|p| slots[p].clone());
            slots[nlocals + i] = Some(Val::Cell(CellRef::new(initial)));
        }
        for (i, cell) in func.closure.iter().enumerate() {
            slots[nlocals + ncells + i] = Some(Val::Cell(cell.clone()));
        }
        Ok(frame)
    }
}
