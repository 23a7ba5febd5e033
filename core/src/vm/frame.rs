use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Result, anyhow};

use super::code::Code;
use super::value::{CellRef, Val};

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Shared, mutable name table (globals, builtins).
///
/// Cloning shares the table; frames created for the same module see each
/// other's stores.
#[derive(Clone, Default)]
pub struct Namespace(Arc<RwLock<FastHashMap<Arc<str>, Val>>>);

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Val> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    pub fn set(&self, name: impl Into<Arc<str>>, value: Val) -> Option<Val> {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({} names)", self.len())
    }
}

/// Activation record for one run of a [`Code`] unit.
///
/// `localsplus` is owned by the frame: only the evaluator running the frame
/// (and the migrator, before evaluation starts) writes slot positions. The
/// values in those slots are shared handles and may be referenced from
/// other frames at the same time.
pub struct Frame {
    code: Arc<Code>,
    globals: Namespace,
    builtins: Namespace,
    localsplus: Vec<Option<Val>>,
    locals: Option<FastHashMap<Arc<str>, Val>>,
    pub(crate) stack: Vec<Val>,
    pub(crate) pc: usize,
}

impl Frame {
    /// Allocates a frame with every slot unbound.
    pub fn new(code: Arc<Code>, globals: Namespace, builtins: Namespace) -> Result<Self> {
        let nslots = code.nslots();
        let mut localsplus = Vec::new();
        localsplus
            .try_reserve_exact(nslots)
            .map_err(|e| anyhow!("MemoryError: cannot allocate {} slots for {}: {}", nslots, code.name(), e))?;
        localsplus.resize(nslots, None);
        Ok(Self {
            code,
            globals,
            builtins,
            localsplus,
            locals: None,
            stack: Vec::new(),
            pc: 0,
        })
    }

    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// `[locals | cells | frees]` in slot order.
    pub fn slots(&self) -> &[Option<Val>] {
        &self.localsplus
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<Val>] {
        &mut self.localsplus
    }

    pub fn slot(&self, idx: usize) -> Option<&Val> {
        self.localsplus.get(idx).and_then(Option::as_ref)
    }

    /// Looks up a bound local by name.
    pub fn local(&self, name: &str) -> Option<&Val> {
        let idx = self.code.varnames().iter().position(|v| &**v == name)?;
        self.slot(idx)
    }

    /// Cell handle at deref index `idx` (cells first, then frees).
    pub fn deref_cell(&self, idx: usize) -> Option<&CellRef> {
        match self.localsplus.get(self.code.nlocals() + idx)? {
            Some(Val::Cell(cell)) => Some(cell),
            _ => None,
        }
    }

    /// Materialized locals, present after [`Frame::fast_to_locals`].
    pub fn locals(&self) -> Option<&FastHashMap<Arc<str>, Val>> {
        self.locals.as_ref()
    }

    /// Rebuilds the name-keyed locals map from the fast slots.
    ///
    /// Unbound slots and empty cells are omitted; cell and free slots are
    /// dereferenced.
    pub fn fast_to_locals(&mut self) {
        let code = &self.code;
        let map = self.locals.get_or_insert_with(FastHashMap::default);
        map.clear();
        for (name, slot) in code.varnames().iter().zip(&self.localsplus) {
            if let Some(value) = slot {
                map.insert(name.clone(), value.clone());
            }
        }
        let derefs = code.cellvars().iter().chain(code.freevars().iter());
        for (name, slot) in derefs.zip(&self.localsplus[code.nlocals()..]) {
            if let Some(Val::Cell(cell)) = slot
                && let Some(value) = cell.get()
            {
                map.insert(name.clone(), value);
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("code", &self.code.name())
            .field("pc", &self.pc)
            .field("slots", &self.localsplus)
            .finish()
    }
}
