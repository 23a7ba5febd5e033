use anyhow::{Result, bail};

use super::frame::Namespace;
use super::value::{NativeFn, Val};

const BUILTINS: &[NativeFn] = &[
    NativeFn::new("abs", builtin_abs),
    NativeFn::new("len", builtin_len),
    NativeFn::new("max", builtin_max),
    NativeFn::new("str", builtin_str),
];

pub(super) fn install(ns: &Namespace) {
    for native in BUILTINS {
        ns.set(native.name, Val::Native(*native));
    }
}

fn arity_error(name: &str, n: usize, given: usize) -> anyhow::Error {
    anyhow::anyhow!("TypeError: {}() takes exactly {} argument(s) ({} given)", name, n, given)
}

fn builtin_abs(args: &[Val]) -> Result<Val> {
    match args {
        [Val::Int(i)] => i
            .checked_abs()
            .map(Val::Int)
            .ok_or_else(|| anyhow::anyhow!("OverflowError: abs() of {}", i)),
        [Val::Float(f)] => Ok(Val::Float(f.abs())),
        [other] => bail!("TypeError: bad operand type for abs(): '{}'", other.type_name()),
        _ => Err(arity_error("abs", 1, args.len())),
    }
}

fn builtin_len(args: &[Val]) -> Result<Val> {
    match args {
        [Val::Str(s)] => Ok(Val::Int(s.chars().count() as i64)),
        [other] => bail!("TypeError: object of type '{}' has no len()", other.type_name()),
        _ => Err(arity_error("len", 1, args.len())),
    }
}

fn builtin_max(args: &[Val]) -> Result<Val> {
    let Some((first, rest)) = args.split_first() else {
        bail!("TypeError: max expected at least 1 argument, got 0");
    };
    let mut best = first;
    for candidate in rest {
        let greater = match (best, candidate) {
            (Val::Int(a), Val::Int(b)) => b > a,
            (Val::Int(_) | Val::Float(_), Val::Int(_) | Val::Float(_)) => as_f64(candidate) > as_f64(best),
            _ => bail!(
                "TypeError: '>' not supported between '{}' and '{}'",
                candidate.type_name(),
                best.type_name()
            ),
        };
        if greater {
            best = candidate;
        }
    }
    Ok(best.clone())
}

fn as_f64(v: &Val) -> f64 {
    match v {
        Val::Int(i) => *i as f64,
        Val::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn builtin_str(args: &[Val]) -> Result<Val> {
    match args {
        [value] => Ok(Val::str(value.to_string())),
        _ => Err(arity_error("str", 1, args.len())),
    }
}
