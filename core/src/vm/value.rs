use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use super::code::Code;
use super::frame::Namespace;

/// Native builtin signature. Natives run outside the frame machinery and are
/// never seen by the dispatch function.
pub type NativeFnPtr = fn(args: &[Val]) -> Result<Val>;

/// Runtime value.
///
/// Cloning a `Val` takes a new shared reference to heap payloads; nothing is
/// deep-copied. Slot arrays and the operand stack hold these handles.
#[derive(Clone)]
pub enum Val {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Code(Arc<Code>),
    Function(Arc<Function>),
    Native(NativeFn),
    Cell(CellRef),
}

impl Val {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Val::Str(s.into())
    }

    /// Only `Nil`, `false`, `0` and the empty string are falsey.
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Nil => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "nil",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "str",
            Val::Code(_) => "code",
            Val::Function(_) => "function",
            Val::Native(_) => "builtin",
            Val::Cell(_) => "cell",
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Int(a), Val::Float(b)) | (Val::Float(b), Val::Int(a)) => (*a as f64) == *b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Code(a), Val::Code(b)) => Arc::ptr_eq(a, b),
            (Val::Function(a), Val::Function(b)) => Arc::ptr_eq(a, b),
            (Val::Native(a), Val::Native(b)) => a.name == b.name && std::ptr::fn_addr_eq(a.func, b.func),
            (Val::Cell(a), Val::Cell(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => write!(f, "nil"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(i) => write!(f, "{}", i),
            Val::Float(x) => write!(f, "{}", x),
            Val::Str(s) => write!(f, "{}", s),
            Val::Code(c) => write!(f, "<code {} at {}>", c.name(), c.filename()),
            Val::Function(func) => write!(f, "<function {}>", func.code.name()),
            Val::Native(n) => write!(f, "<builtin {}>", n.name),
            Val::Cell(_) => write!(f, "<cell>"),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{:?}", s),
            Val::Cell(c) => write!(f, "Cell({:?})", c.get()),
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl From<i64> for Val {
    fn from(value: i64) -> Self {
        Val::Int(value)
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::Str(value.into())
    }
}

/// Shared storage for a cell or free variable.
///
/// The frame that owns the slot holding a `CellRef` never swaps the handle
/// itself; it reads and writes the cell contents. Every closure and frame
/// that holds a clone observes those writes.
#[derive(Clone, Default)]
pub struct CellRef(Arc<Mutex<Option<Val>>>);

impl CellRef {
    pub fn new(value: Option<Val>) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Option<Val> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: Val) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn ptr_eq(&self, other: &CellRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A callable bytecode unit bound to its defining globals and closure cells.
pub struct Function {
    pub code: Arc<Code>,
    pub globals: Namespace,
    pub closure: Vec<CellRef>,
}

impl Function {
    pub fn new(code: Arc<Code>, globals: Namespace) -> Self {
        Self {
            code,
            globals,
            closure: Vec::new(),
        }
    }

    pub fn with_closure(code: Arc<Code>, globals: Namespace, closure: Vec<CellRef>) -> Self {
        Self { code, globals, closure }
    }
}

#[derive(Clone, Copy)]
pub struct NativeFn {
    pub name: &'static str,
    pub func: NativeFnPtr,
}

impl NativeFn {
    pub const fn new(name: &'static str, func: NativeFnPtr) -> Self {
        Self { name, func }
    }
}
