use super::*;

#[test]
fn test_set_eval_frame_reports_previous_callback() {
    let mut h = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let first = counting_miss(&calls);
    let second = counting_miss(&calls);

    assert!(!is_intercepting(&h.ts));
    assert!(h.install(first.clone()).is_none());
    assert!(is_intercepting(&h.ts));
    assert_eq!(Arc::strong_count(&first), 2);

    let prev = h.install(second.clone()).expect("first callback returned");
    assert!(Arc::ptr_eq(&prev, &first));
    drop(prev);
    // The thread let go of its reference to the replaced callback.
    assert_eq!(Arc::strong_count(&first), 1);

    let prev = set_eval_frame(&mut h.ts, &h.module, None).expect("second callback returned");
    assert!(Arc::ptr_eq(&prev, &second));
    assert!(!is_intercepting(&h.ts));
    assert!(set_eval_frame(&mut h.ts, &h.module, None).is_none());
}

#[test]
fn test_disabled_hook_bypasses_callback_regardless_of_cache() {
    let mut h = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let add = h.function(&add_code());

    h.install(counting_miss(&calls));
    set_eval_frame(&mut h.ts, &h.module, None);
    assert_eq!(h.call(&add, &[3, 4]).unwrap(), Val::Int(7));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let Val::Function(func) = &add else { unreachable!() };
    assert!(matches!(*h.module.cache(&func.code), CacheState::Empty));
}

#[test]
fn test_run_with_callback_restores_outer_state() {
    let mut h = Harness::new();
    let outer_calls = Arc::new(AtomicUsize::new(0));
    let inner_calls = Arc::new(AtomicUsize::new(0));
    let outer = counting_miss(&outer_calls);
    h.install(outer.clone());

    let add = h.function(&add_code());
    let module = h.module.clone();
    let out = run_with_callback(&mut h.ts, &module, Some(counting_miss(&inner_calls)), |ts| {
        ts.call(&add, vec![Val::Int(1), Val::Int(1)])
    });
    assert_eq!(out.unwrap(), Val::Int(2));
    assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outer_calls.load(Ordering::SeqCst), 0);

    let restored = set_eval_frame(&mut h.ts, &h.module, None).unwrap();
    assert!(Arc::ptr_eq(&restored, &outer));
}

#[test]
fn test_run_with_callback_none_disables_temporarily() {
    let mut h = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    h.install(counting_miss(&calls));
    let add = h.function(&add_code());
    let module = h.module.clone();

    run_with_callback(&mut h.ts, &module, None, |ts| {
        assert!(!is_intercepting(ts));
        ts.call(&add, vec![Val::Int(2), Val::Int(2)]).unwrap();
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(is_intercepting(&h.ts));
}

const ABORT_CHILD_ENV: &str = "EVALHOOK_ABORT_CHILD";

fn foreign_eval(ts: &mut ThreadState, frame: Frame) -> Result<Val> {
    crate::vm::eval_frame_default(ts, frame)
}

/// Another hook owning the thread is a broken invariant: the process aborts.
/// Runs itself in a child process so the abort can be observed.
#[test]
fn test_foreign_dispatch_function_aborts() {
    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        let mut h = Harness::new();
        h.ts.set_eval_frame_func(foreign_eval);
        h.install(counting_miss(&Arc::new(AtomicUsize::new(0))));
        unreachable!("set_eval_frame returned over a foreign dispatch function");
    }

    let exe = std::env::current_exe().unwrap();
    let output = std::process::Command::new(exe)
        .args([
            "hook::hook_test::dispatch::test_foreign_dispatch_function_aborts",
            "--exact",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(ABORT_CHILD_ENV, "1")
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "child exited cleanly: {stderr}");
    assert!(
        stderr.contains("FATAL: set_eval_frame: thread dispatch function is neither"),
        "stderr: {stderr}"
    );
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(6));
    }
}
