//! Stack-machine bytecode engine.
//!
//! Holds the code units, frames and default evaluator that the frame hook in
//! [`crate::hook`] intercepts. Every call into a bytecode unit goes through
//! the owning thread's [`EvalFrameFn`].

mod builtins;
mod code;
mod eval;
mod extra;
mod frame;
mod thread;
mod value;

pub use code::{BinOp, CmpOp, Code, CodeBuilder, Instr};
pub use eval::{Raised, eval_frame_default};
pub use extra::{ExtraIndex, ExtraRegistry, ExtraSlots, ExtraValue, MAX_EXTRA_USERS};
pub use frame::{FastHashMap, Frame, Namespace};
pub use thread::{DEFAULT_RECURSION_LIMIT, EvalFrameFn, Interpreter, ThreadState};
pub use value::{CellRef, Function, NativeFn, NativeFnPtr, Val};
