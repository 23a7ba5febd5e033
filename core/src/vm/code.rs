use std::any::Any;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use anyhow::{Result, bail, ensure};

use super::extra::{ExtraIndex, ExtraSlots, ExtraValue};
use super::value::Val;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Stack-machine instruction set.
///
/// Deref-style operands (`LoadDeref`, `StoreDeref`, `LoadClosure`) index the
/// cell/free region: `0..ncells` are cell variables, `ncells..` free ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    LoadConst(u32),
    LoadFast(u32),
    StoreFast(u32),
    LoadDeref(u32),
    StoreDeref(u32),
    /// Push the cell handle itself, for `MakeFunction`.
    LoadClosure(u32),
    LoadGlobal(u32 /*name idx*/),
    StoreGlobal(u32 /*name idx*/),
    BinaryOp(BinOp),
    CompareOp(CmpOp),
    UnaryNot,
    UnaryNeg,
    PopTop,
    DupTop,
    Jump(u32),
    PopJumpIfFalse(u32),
    PopJumpIfTrue(u32),
    Call(u32 /*argc*/),
    /// Pops `nfree` cells (pushed in order) and builds a function from the
    /// code constant at `code`.
    MakeFunction {
        code: u32,
        nfree: u32,
    },
    Raise,
    ReturnValue,
}

/// A compiled, immutable bytecode unit.
///
/// Slot layout of a frame running this unit is
/// `[locals (nlocals) | cells (ncells) | frees (nfrees)]`.
/// The only interior mutability is the extra-slot table.
pub struct Code {
    name: Arc<str>,
    filename: Arc<str>,
    argcount: usize,
    varnames: Vec<Arc<str>>,
    cellvars: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    consts: Vec<Val>,
    names: Vec<Arc<str>>,
    instrs: Vec<Instr>,
    extra: ExtraSlots,
}

impl Code {
    pub fn builder(name: impl Into<Arc<str>>) -> CodeBuilder {
        CodeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn argcount(&self) -> usize {
        self.argcount
    }

    #[inline]
    pub fn nlocals(&self) -> usize {
        self.varnames.len()
    }

    #[inline]
    pub fn ncells(&self) -> usize {
        self.cellvars.len()
    }

    #[inline]
    pub fn nfrees(&self) -> usize {
        self.freevars.len()
    }

    /// Total slot count of a frame for this unit.
    #[inline]
    pub fn nslots(&self) -> usize {
        self.nlocals() + self.ncells() + self.nfrees()
    }

    pub fn varnames(&self) -> &[Arc<str>] {
        &self.varnames
    }

    pub fn cellvars(&self) -> &[Arc<str>] {
        &self.cellvars
    }

    pub fn freevars(&self) -> &[Arc<str>] {
        &self.freevars
    }

    pub fn consts(&self) -> &[Val] {
        &self.consts
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Name of the deref slot `idx` (cells first, then frees).
    pub fn deref_name(&self, idx: usize) -> Option<&str> {
        self.cellvars
            .iter()
            .chain(self.freevars.iter())
            .nth(idx)
            .map(|s| &**s)
    }

    pub fn get_extra<T: Any + Send + Sync>(&self, idx: ExtraIndex) -> Option<Arc<T>> {
        self.extra.get(idx)?.downcast::<T>().ok()
    }

    pub fn set_extra<T: Any + Send + Sync>(&self, idx: ExtraIndex, value: Arc<T>) {
        let value: ExtraValue = value;
        self.extra.set(idx, Some(value));
    }

    pub fn clear_extra(&self, idx: ExtraIndex) {
        self.extra.set(idx, None);
    }

    /// One line per instruction: offset, opcode, operand and a resolved hint.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "code {} ({}):", self.name, self.filename);
        for (pc, instr) in self.instrs.iter().enumerate() {
            let hint = match *instr {
                Instr::LoadConst(k) => self.consts.get(k as usize).map(|v| format!("{:?}", v)),
                Instr::LoadFast(i) | Instr::StoreFast(i) => {
                    self.varnames.get(i as usize).map(|s| s.to_string())
                }
                Instr::LoadDeref(i) | Instr::StoreDeref(i) | Instr::LoadClosure(i) => {
                    self.deref_name(i as usize).map(str::to_string)
                }
                Instr::LoadGlobal(n) | Instr::StoreGlobal(n) => {
                    self.names.get(n as usize).map(|s| s.to_string())
                }
                _ => None,
            };
            match hint {
                Some(hint) => {
                    let _ = writeln!(out, "{:>4} {:<28} ({})", pc, format!("{:?}", instr), hint);
                }
                None => {
                    let _ = writeln!(out, "{:>4} {:?}", pc, instr);
                }
            }
        }
        out
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("argcount", &self.argcount)
            .field("nlocals", &self.nlocals())
            .field("ncells", &self.ncells())
            .field("nfrees", &self.nfrees())
            .field("instrs", &self.instrs.len())
            .finish()
    }
}

pub struct CodeBuilder {
    name: Arc<str>,
    filename: Arc<str>,
    argcount: usize,
    varnames: Vec<Arc<str>>,
    cellvars: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    consts: Vec<Val>,
    names: Vec<Arc<str>>,
    instrs: Vec<Instr>,
}

impl CodeBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            filename: "<unknown>".into(),
            argcount: 0,
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            instrs: Vec::new(),
        }
    }

    pub fn filename(mut self, filename: impl Into<Arc<str>>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Declares the positional parameters; they occupy the first local slots.
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let params: Vec<Arc<str>> = params.into_iter().map(Into::into).collect();
        self.argcount = params.len();
        let rest = std::mem::take(&mut self.varnames);
        self.varnames = params;
        self.varnames.extend(rest);
        self
    }

    pub fn locals<I, S>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.varnames.extend(locals.into_iter().map(Into::into));
        self
    }

    pub fn cellvars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.cellvars.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn freevars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.freevars.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn consts(mut self, consts: impl IntoIterator<Item = Val>) -> Self {
        self.consts.extend(consts);
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn instrs(mut self, instrs: impl IntoIterator<Item = Instr>) -> Self {
        self.instrs.extend(instrs);
        self
    }

    pub fn build(self) -> Result<Arc<Code>> {
        self.validate()?;
        Ok(Arc::new(Code {
            name: self.name,
            filename: self.filename,
            argcount: self.argcount,
            varnames: self.varnames,
            cellvars: self.cellvars,
            freevars: self.freevars,
            consts: self.consts,
            names: self.names,
            instrs: self.instrs,
            extra: ExtraSlots::default(),
        }))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.argcount <= self.varnames.len(),
            "{}: argcount {} exceeds local count {}",
            self.name,
            self.argcount,
            self.varnames.len()
        );
        ensure!(!self.instrs.is_empty(), "{}: empty instruction stream", self.name);
        let nderef = self.cellvars.len() + self.freevars.len();
        let len = self.instrs.len();
        for (pc, instr) in self.instrs.iter().enumerate() {
            let (operand, bound, what) = match *instr {
                Instr::LoadConst(k) => (k, self.consts.len(), "constant"),
                Instr::LoadFast(i) | Instr::StoreFast(i) => (i, self.varnames.len(), "local"),
                Instr::LoadDeref(i) | Instr::StoreDeref(i) | Instr::LoadClosure(i) => (i, nderef, "deref slot"),
                Instr::LoadGlobal(n) | Instr::StoreGlobal(n) => (n, self.names.len(), "name"),
                Instr::Jump(t) | Instr::PopJumpIfFalse(t) | Instr::PopJumpIfTrue(t) => (t, len, "jump target"),
                Instr::MakeFunction { code, .. } => {
                    match self.consts.get(code as usize) {
                        Some(Val::Code(_)) => {}
                        Some(other) => bail!(
                            "{}@{}: MakeFunction constant is a {}, expected code",
                            self.name,
                            pc,
                            other.type_name()
                        ),
                        None => bail!("{}@{}: constant {} out of range", self.name, pc, code),
                    }
                    continue;
                }
                _ => continue,
            };
            ensure!(
                (operand as usize) < bound,
                "{}@{}: {} {} out of range ({} available)",
                self.name,
                pc,
                what,
                operand,
                bound
            );
        }
        Ok(())
    }
}
