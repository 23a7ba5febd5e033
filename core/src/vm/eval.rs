use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use tracing::trace;

use super::code::{BinOp, CmpOp, Code, Instr};
use super::frame::Frame;
use super::thread::ThreadState;
use super::value::{CellRef, Function, Val};

/// Error carrying the value passed to `Raise`. Recover it with
/// `err.downcast_ref::<Raised>()`.
#[derive(Debug, Clone)]
pub struct Raised(pub Val);

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raised {:?}", self.0)
    }
}

impl std::error::Error for Raised {}

/// The engine's built-in evaluator: runs `frame` to completion on `ts`.
pub fn eval_frame_default(ts: &mut ThreadState, mut frame: Frame) -> Result<Val> {
    ts.enter_frame(frame.code())?;
    trace!(target: "evalhook::vm", code = frame.code().name(), depth = ts.depth(), "eval frame");
    let result = run(ts, &mut frame);
    ts.leave_frame();
    result
}

fn run(ts: &mut ThreadState, frame: &mut Frame) -> Result<Val> {
    let code = frame.code().clone();
    let instrs = code.instrs();
    loop {
        let Some(&instr) = instrs.get(frame.pc) else {
            bail!("{}: execution ran past the last instruction", code.name());
        };
        frame.pc += 1;
        match instr {
            Instr::LoadConst(k) => frame.stack.push(code.consts()[k as usize].clone()),
            Instr::LoadFast(i) => {
                let value = frame.slot(i as usize).cloned().ok_or_else(|| {
                    anyhow!(
                        "UnboundLocalError: local variable '{}' referenced before assignment",
                        code.varnames()[i as usize]
                    )
                })?;
                frame.stack.push(value);
            }
            Instr::StoreFast(i) => {
                let value = pop(frame)?;
                frame.slots_mut()[i as usize] = Some(value);
            }
            Instr::LoadDeref(i) => {
                let value = deref(frame, &code, i)?.get().ok_or_else(|| {
                    anyhow!(
                        "NameError: free variable '{}' referenced before assignment",
                        code.deref_name(i as usize).unwrap_or("?")
                    )
                })?;
                frame.stack.push(value);
            }
            Instr::StoreDeref(i) => {
                let value = pop(frame)?;
                deref(frame, &code, i)?.set(value);
            }
            Instr::LoadClosure(i) => {
                let cell = deref(frame, &code, i)?.clone();
                frame.stack.push(Val::Cell(cell));
            }
            Instr::LoadGlobal(n) => {
                let name = &code.names()[n as usize];
                let value = frame
                    .globals()
                    .get(name)
                    .or_else(|| frame.builtins().get(name))
                    .ok_or_else(|| anyhow!("NameError: name '{}' is not defined", name))?;
                frame.stack.push(value);
            }
            Instr::StoreGlobal(n) => {
                let value = pop(frame)?;
                frame.globals().set(code.names()[n as usize].clone(), value);
            }
            Instr::BinaryOp(op) => {
                let rhs = pop(frame)?;
                let lhs = pop(frame)?;
                frame.stack.push(binary(op, &lhs, &rhs)?);
            }
            Instr::CompareOp(op) => {
                let rhs = pop(frame)?;
                let lhs = pop(frame)?;
                frame.stack.push(Val::Bool(compare(op, &lhs, &rhs)?));
            }
            Instr::UnaryNot => {
                let value = pop(frame)?;
                frame.stack.push(Val::Bool(!value.is_truthy()));
            }
            Instr::UnaryNeg => {
                let value = match pop(frame)? {
                    Val::Int(i) => Val::Int(i.checked_neg().ok_or_else(|| anyhow!("OverflowError: integer negation"))?),
                    Val::Float(f) => Val::Float(-f),
                    other => bail!("TypeError: bad operand type for unary -: '{}'", other.type_name()),
                };
                frame.stack.push(value);
            }
            Instr::PopTop => {
                pop(frame)?;
            }
            Instr::DupTop => {
                let top = frame
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| anyhow!("{}: stack underflow", code.name()))?;
                frame.stack.push(top);
            }
            Instr::Jump(target) => frame.pc = target as usize,
            Instr::PopJumpIfFalse(target) => {
                if !pop(frame)?.is_truthy() {
                    frame.pc = target as usize;
                }
            }
            Instr::PopJumpIfTrue(target) => {
                if pop(frame)?.is_truthy() {
                    frame.pc = target as usize;
                }
            }
            Instr::Call(argc) => {
                let args = pop_n(frame, argc as usize)?;
                let callee = pop(frame)?;
                let result = ts.call(&callee, args)?;
                frame.stack.push(result);
            }
            Instr::MakeFunction { code: k, nfree } => {
                let cells = pop_n(frame, nfree as usize)?
                    .into_iter()
                    .map(|v| match v {
                        Val::Cell(cell) => Ok(cell),
                        other => Err(anyhow!("MakeFunction expects cells, got {}", other.type_name())),
                    })
                    .collect::<Result<Vec<CellRef>>>()?;
                let Val::Code(inner) = &code.consts()[k as usize] else {
                    bail!("{}: MakeFunction constant is not code", code.name());
                };
                let func = Function::with_closure(inner.clone(), frame.globals().clone(), cells);
                frame.stack.push(Val::Function(Arc::new(func)));
            }
            Instr::Raise => {
                let value = pop(frame)?;
                return Err(Raised(value).into());
            }
            Instr::ReturnValue => return pop(frame),
        }
    }
}

#[inline]
fn pop(frame: &mut Frame) -> Result<Val> {
    frame
        .stack
        .pop()
        .ok_or_else(|| anyhow!("{}: stack underflow at {}", frame.code().name(), frame.pc - 1))
}

fn pop_n(frame: &mut Frame, n: usize) -> Result<Vec<Val>> {
    let len = frame.stack.len();
    if len < n {
        bail!("{}: stack underflow at {}", frame.code().name(), frame.pc - 1);
    }
    Ok(frame.stack.split_off(len - n))
}

fn deref<'f>(frame: &'f Frame, code: &Code, idx: u32) -> Result<&'f CellRef> {
    frame.deref_cell(idx as usize).ok_or_else(|| {
        anyhow!(
            "{}: deref slot {} ('{}') holds no cell",
            code.name(),
            idx,
            code.deref_name(idx as usize).unwrap_or("?")
        )
    })
}

/// Longest string `str * int` may produce.
const MAX_REPEAT_LEN: usize = 1 << 30;

fn repeat_str(s: &str, n: i64) -> Result<String> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(0) => Ok(String::new()),
        Some(len) if len <= MAX_REPEAT_LEN => Ok(s.repeat(count)),
        _ => bail!("OverflowError: repeated string is too long ({} * {})", s.len(), n),
    }
}

fn as_f64(v: &Val) -> Option<f64> {
    match v {
        Val::Int(i) => Some(*i as f64),
        Val::Float(f) => Some(*f),
        _ => None,
    }
}

fn binary(op: BinOp, lhs: &Val, rhs: &Val) -> Result<Val> {
    match (op, lhs, rhs) {
        (_, Val::Int(a), Val::Int(b)) => int_binary(op, *a, *b),
        (BinOp::Add, Val::Str(a), Val::Str(b)) => Ok(Val::str(format!("{}{}", a, b))),
        (BinOp::Mul, Val::Str(s), Val::Int(n)) | (BinOp::Mul, Val::Int(n), Val::Str(s)) => {
            Ok(Val::str(repeat_str(s, *n)?))
        }
        _ => {
            let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) else {
                bail!(
                    "TypeError: unsupported operand types for {:?}: '{}' and '{}'",
                    op,
                    lhs.type_name(),
                    rhs.type_name()
                );
            };
            if b == 0.0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
                bail!("ZeroDivisionError: float division by zero");
            }
            Ok(Val::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::FloorDiv => (a / b).floor(),
                BinOp::Mod => a - b * (a / b).floor(),
            }))
        }
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Val> {
    let overflow = || anyhow!("OverflowError: integer {:?} overflow", op);
    if b == 0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        bail!("ZeroDivisionError: division by zero");
    }
    Ok(match op {
        BinOp::Add => Val::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinOp::Sub => Val::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinOp::Mul => Val::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinOp::Div => Val::Float(a as f64 / b as f64),
        // Floor semantics: the quotient rounds toward negative infinity and
        // the remainder takes the divisor's sign.
        BinOp::FloorDiv => {
            let q = a.checked_div(b).ok_or_else(overflow)?;
            Val::Int(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        BinOp::Mod => {
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            Val::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
    })
}

fn compare(op: CmpOp, lhs: &Val, rhs: &Val) -> Result<bool> {
    match op {
        CmpOp::Eq => return Ok(lhs == rhs),
        CmpOp::Ne => return Ok(lhs != rhs),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Val::Int(a), Val::Int(b)) => a.partial_cmp(b),
        (Val::Str(a), Val::Str(b)) => a.partial_cmp(b),
        _ => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => bail!(
                "TypeError: '{:?}' not supported between '{}' and '{}'",
                op,
                lhs.type_name(),
                rhs.type_name()
            ),
        },
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
    })
}
