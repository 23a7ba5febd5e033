use super::*;

/// `fact(n) = 1 if n <= 1 else n * fact(n - 1)`, resolved through globals.
fn fact_code() -> Arc<Code> {
    Code::builder("fact")
        .params(["n"])
        .names(["fact"])
        .consts([Val::Int(1)])
        .instrs([
            Instr::LoadFast(0),
            Instr::LoadConst(0),
            Instr::CompareOp(CmpOp::Le),
            Instr::PopJumpIfFalse(6),
            Instr::LoadConst(0),
            Instr::ReturnValue,
            Instr::LoadFast(0),
            Instr::LoadGlobal(0),
            Instr::LoadFast(0),
            Instr::LoadConst(0),
            Instr::BinaryOp(BinOp::Sub),
            Instr::Call(1),
            Instr::BinaryOp(BinOp::Mul),
            Instr::ReturnValue,
        ])
        .build()
        .unwrap()
}

#[test]
fn test_recursive_factorial() {
    let mut ts = new_thread();
    let globals = Namespace::new();
    let fact = function(fact_code(), &globals);
    globals.set("fact", fact.clone());
    assert_eq!(ts.call(&fact, vec![Val::Int(10)]).unwrap(), Val::Int(3_628_800));
}

#[test]
fn test_recursion_limit() {
    let config = HookConfig {
        recursion_limit: 8,
        ..HookConfig::default()
    };
    let mut ts = ThreadState::with_config(Interpreter::new(), &config);
    let globals = Namespace::new();
    let fact = function(fact_code(), &globals);
    globals.set("fact", fact.clone());
    assert_eq!(ts.call(&fact, vec![Val::Int(8)]).unwrap(), Val::Int(40_320));
    let err = ts.call(&fact, vec![Val::Int(9)]).unwrap_err();
    assert!(err.to_string().starts_with("RecursionError"));
    assert_eq!(ts.depth(), 0);
}

#[test]
fn test_default_recursion_limit_is_reachable() {
    let mut ts = new_thread();
    let limit = crate::vm::DEFAULT_RECURSION_LIMIT;
    assert_eq!(ts.recursion_limit(), limit);
    let globals = Namespace::new();
    let fact = function(fact_code(), &globals);
    globals.set("fact", fact.clone());
    // The limit trips on the way down, before any multiplication can overflow.
    let err = ts.call(&fact, vec![Val::Int(limit as i64 + 1)]).unwrap_err();
    assert!(err.to_string().starts_with("RecursionError"), "{err}");
    assert_eq!(ts.depth(), 0);
}

#[test]
fn test_loop_with_backward_jump() {
    // total = 0; i = n; while i: total = total + i; i = i - 1; return total
    let code = Code::builder("sum_to")
        .params(["n"])
        .locals(["total", "i"])
        .consts([Val::Int(0), Val::Int(1)])
        .instrs([
            Instr::LoadConst(0),
            Instr::StoreFast(1),
            Instr::LoadFast(0),
            Instr::StoreFast(2),
            Instr::LoadFast(2),
            Instr::PopJumpIfFalse(15),
            Instr::LoadFast(1),
            Instr::LoadFast(2),
            Instr::BinaryOp(BinOp::Add),
            Instr::StoreFast(1),
            Instr::LoadFast(2),
            Instr::LoadConst(1),
            Instr::BinaryOp(BinOp::Sub),
            Instr::StoreFast(2),
            Instr::Jump(4),
            Instr::LoadFast(1),
            Instr::ReturnValue,
        ])
        .build()
        .unwrap();
    let mut ts = new_thread();
    let f = function(code, &Namespace::new());
    assert_eq!(ts.call(&f, vec![Val::Int(100)]).unwrap(), Val::Int(5050));
}
