use super::*;

#[test]
fn test_call_binds_positional_args() {
    let mut ts = new_thread();
    let globals = Namespace::new();
    let add = function(add_code(), &globals);
    let out = ts.call(&add, vec![Val::Int(3), Val::Int(4)]).unwrap();
    assert_eq!(out, Val::Int(7));
    assert_eq!(ts.depth(), 0);
}

#[test]
fn test_call_arity_mismatch() {
    let mut ts = new_thread();
    let add = function(add_code(), &Namespace::new());
    let err = ts.call(&add, vec![Val::Int(1)]).unwrap_err();
    assert!(err.to_string().contains("takes 2 positional arguments but 1 were given"));
}

#[test]
fn test_floor_division_and_modulo_follow_divisor_sign() {
    let mut ts = new_thread();
    let code = Code::builder("divmod")
        .params(["a", "b"])
        .instrs([
            Instr::LoadFast(0),
            Instr::LoadFast(1),
            Instr::BinaryOp(BinOp::FloorDiv),
            Instr::LoadConst(0),
            Instr::BinaryOp(BinOp::Mul),
            Instr::LoadFast(0),
            Instr::LoadFast(1),
            Instr::BinaryOp(BinOp::Mod),
            Instr::BinaryOp(BinOp::Add),
            Instr::ReturnValue,
        ])
        .consts([Val::Int(100)])
        .build()
        .unwrap();
    let f = function(code, &Namespace::new());
    // -7 // 2 == -4, -7 % 2 == 1
    assert_eq!(ts.call(&f, vec![Val::Int(-7), Val::Int(2)]).unwrap(), Val::Int(-399));
    // 7 // -2 == -4, 7 % -2 == -1
    assert_eq!(ts.call(&f, vec![Val::Int(7), Val::Int(-2)]).unwrap(), Val::Int(-401));
    let err = ts.call(&f, vec![Val::Int(1), Val::Int(0)]).unwrap_err();
    assert!(err.to_string().starts_with("ZeroDivisionError"));
}

#[test]
fn test_unbound_local_is_an_error() {
    let mut ts = new_thread();
    let code = Code::builder("f")
        .locals(["x"])
        .instrs([Instr::LoadFast(0), Instr::ReturnValue])
        .build()
        .unwrap();
    let err = ts.run_code(code, &Namespace::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "UnboundLocalError: local variable 'x' referenced before assignment"
    );
}

#[test]
fn test_globals_and_builtins() {
    let mut ts = new_thread();
    let globals = Namespace::new();
    // n = abs(-5); return str(n) + "!"
    let code = Code::builder("<module>")
        .names(["abs", "n", "str"])
        .consts([Val::Int(-5), Val::from("!")])
        .instrs([
            Instr::LoadGlobal(0),
            Instr::LoadConst(0),
            Instr::Call(1),
            Instr::StoreGlobal(1),
            Instr::LoadGlobal(2),
            Instr::LoadGlobal(1),
            Instr::Call(1),
            Instr::LoadConst(1),
            Instr::BinaryOp(BinOp::Add),
            Instr::ReturnValue,
        ])
        .build()
        .unwrap();
    assert_eq!(ts.run_code(code, &globals).unwrap(), Val::from("5!"));
    assert_eq!(globals.get("n"), Some(Val::Int(5)));
    assert!(!globals.contains("abs"));
}

#[test]
fn test_missing_global_is_name_error() {
    let mut ts = new_thread();
    let code = Code::builder("<module>")
        .names(["nope"])
        .instrs([Instr::LoadGlobal(0), Instr::ReturnValue])
        .build()
        .unwrap();
    let err = ts.run_code(code, &Namespace::new()).unwrap_err();
    assert_eq!(err.to_string(), "NameError: name 'nope' is not defined");
}

#[test]
fn test_raise_carries_value() {
    let mut ts = new_thread();
    let code = Code::builder("boom")
        .consts([Val::from("bad input")])
        .instrs([Instr::LoadConst(0), Instr::Raise])
        .build()
        .unwrap();
    let err = ts.run_code(code, &Namespace::new()).unwrap_err();
    let raised = err.downcast_ref::<Raised>().expect("raised error");
    assert_eq!(raised.0, Val::from("bad input"));
    assert_eq!(ts.depth(), 0);
}

#[test]
fn test_builder_rejects_bad_operands() {
    let err = Code::builder("f")
        .instrs([Instr::LoadFast(0), Instr::ReturnValue])
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("local 0 out of range"));

    let err = Code::builder("f")
        .consts([Val::Int(1)])
        .instrs([Instr::MakeFunction { code: 0, nfree: 0 }, Instr::ReturnValue])
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("expected code"));

    let err = Code::builder("f")
        .instrs([Instr::Jump(9)])
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("jump target 9"));

    assert!(Code::builder("f").build().is_err());
}

#[test]
fn test_disassemble_resolves_operands() {
    let text = add_code().disassemble();
    assert!(text.starts_with("code add (<unknown>):"));
    assert!(text.contains("LoadFast(1)"));
    assert!(text.contains("(b)"));
    assert_eq!(text.lines().count(), 5);
}

#[test]
fn test_native_calls_bypass_dispatch() {
    fn refuse(_: &mut ThreadState, _: Frame) -> anyhow::Result<Val> {
        anyhow::bail!("dispatch should not run")
    }
    let mut ts = new_thread();
    ts.set_eval_frame_func(refuse);
    let abs = ts.interpreter().builtins().get("abs").unwrap();
    assert_eq!(ts.call(&abs, vec![Val::Int(-2)]).unwrap(), Val::Int(2));
    let add = function(add_code(), &Namespace::new());
    assert!(ts.call(&add, vec![Val::Int(1), Val::Int(2)]).is_err());
}

fn mul_consts(lhs: Val, rhs: Val) -> Arc<Code> {
    Code::builder("<module>")
        .consts([lhs, rhs])
        .instrs([
            Instr::LoadConst(0),
            Instr::LoadConst(1),
            Instr::BinaryOp(BinOp::Mul),
            Instr::ReturnValue,
        ])
        .build()
        .unwrap()
}

#[test]
fn test_string_repeat_bounds() {
    let mut ts = new_thread();
    let globals = Namespace::new();
    let out = ts.run_code(mul_consts(Val::from("ab"), Val::Int(3)), &globals).unwrap();
    assert_eq!(out, Val::from("ababab"));
    let out = ts.run_code(mul_consts(Val::Int(-1), Val::from("ab")), &globals).unwrap();
    assert_eq!(out, Val::from(""));
    let out = ts.run_code(mul_consts(Val::from(""), Val::Int(i64::MAX)), &globals).unwrap();
    assert_eq!(out, Val::from(""));

    let err = ts
        .run_code(mul_consts(Val::from("ab"), Val::Int(i64::MAX)), &globals)
        .unwrap_err();
    assert!(err.to_string().starts_with("OverflowError"));
    let err = ts
        .run_code(mul_consts(Val::from("ab"), Val::Int(1 << 40)), &globals)
        .unwrap_err();
    assert!(err.to_string().starts_with("OverflowError"));
    assert_eq!(ts.depth(), 0);
}

#[test]
fn test_abs_overflow_matches_negation() {
    let mut ts = new_thread();
    let abs = ts.interpreter().builtins().get("abs").unwrap();
    let err = ts.call(&abs, vec![Val::Int(i64::MIN)]).unwrap_err();
    assert!(err.to_string().starts_with("OverflowError"));

    let neg = Code::builder("<module>")
        .consts([Val::Int(i64::MIN)])
        .instrs([Instr::LoadConst(0), Instr::UnaryNeg, Instr::ReturnValue])
        .build()
        .unwrap();
    let err = ts.run_code(neg, &Namespace::new()).unwrap_err();
    assert!(err.to_string().starts_with("OverflowError"));
}
