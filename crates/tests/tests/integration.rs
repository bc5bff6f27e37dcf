//! Integration tests for the control plane end to end.
//!
//! These tests drive a real execution context thread through the controller:
//! Controller → channel → Dispatcher → Engine → Relay → Controller / Console

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use simterm_console::{ComponentKind, Frame, HandlerError, Key, ResetRegistry, RESET};
use simterm_engine::{StepOutcome, FAULT_EXIT_STATUS};
use simterm_tests::{ScriptedStep, TestHarness, SCRIPTED_MEMORY_BASE, SCRIPTED_MEMORY_BYTES};
use simterm_worker::{ControlError, PrintEvent};

fn print(text: &str) -> PrintEvent {
    PrintEvent {
        payload: text.to_string(),
    }
}

/// Any name outside the vocabulary is rejected, and the context keeps serving.
#[tokio::test]
async fn test_unknown_commands_fail_without_crashing() {
    let harness = TestHarness::machine();
    let controller = harness.controller();

    for name in ["run", "Step", "get_memory", "", "load_program", "💥"] {
        assert_eq!(
            controller.invoke_raw(name, Some(json!({ "junk": true }))).await,
            Err(ControlError::UnknownCommand(name.to_string()))
        );
    }
    assert_eq!(controller.ping().await, Ok("pong".to_string()));
    harness.shutdown();
}

/// Stepping a loaded program until it reports completion always ends with an
/// exit status, and asking for it early fails.
#[tokio::test]
async fn test_step_until_completed_yields_exit_status() {
    let harness = TestHarness::machine();
    let controller = harness.controller();

    let programs = [
        "ADD r1 r2",
        "add $r0 $r0 6\nloop: sub $r0 1\nbgt $r0 3 loop",
        "exit 17",
        "nop\nnop\nnop",
    ];
    for program in programs {
        controller.load(program).await.unwrap();
        assert_eq!(controller.exit_status().await, Err(ControlError::NotCompleted));

        let mut steps = 0;
        while !controller.is_completed().await.unwrap() {
            controller.step().await.unwrap();
            steps += 1;
            assert!(steps < 100, "program `{program}` did not complete");
        }
        let status = controller.exit_status().await.unwrap();
        assert!(status.is_some(), "program `{program}` completed without status");
    }
    assert_eq!(controller.exit_status().await, Ok(Some(0)));
    harness.shutdown();
}

/// A runtime fault still ends with a present exit status.
#[tokio::test]
async fn test_faulting_program_completes_with_exit_status() {
    let harness = TestHarness::machine();
    let controller = harness.controller();

    for program in ["div $t0 1 0", "move $t0 3\nrem $t1 $t0 0\nexit 0", "jump 99"] {
        controller.load(program).await.unwrap();
        let mut faults = 0;
        let mut steps = 0;
        while !controller.is_completed().await.unwrap() {
            if let Err(error) = controller.step().await {
                assert!(matches!(error, ControlError::ExecutionFault(_)), "{error:?}");
                faults += 1;
            }
            steps += 1;
            assert!(steps < 100, "program `{program}` did not complete");
        }
        assert_eq!(faults, 1);
        assert_eq!(controller.exit_status().await, Ok(Some(FAULT_EXIT_STATUS)));
        assert_eq!(
            controller.step().await,
            Ok(StepOutcome::Completed {
                exit_status: Some(FAULT_EXIT_STATUS)
            })
        );
    }
    harness.shutdown();
}

/// Output printed during a step is observable by the time the step resolves.
#[tokio::test]
async fn test_prints_arrive_no_later_than_step_result() {
    let mut harness = TestHarness::scripted(vec![
        ScriptedStep::executed(1).print("first ").print("second"),
        ScriptedStep::executed(2),
        ScriptedStep::completed(3).print("bye"),
    ]);
    harness.controller().load("anything").await.unwrap();

    let step = harness.controller().step().await;
    assert_eq!(step, Ok(StepOutcome::Executed { pc: 1 }));
    assert_eq!(harness.prints().drain(), vec![print("first "), print("second")]);

    harness.controller().step().await.unwrap();
    assert!(harness.prints().drain().is_empty());

    let step = harness.controller().step().await;
    assert_eq!(step, Ok(StepOutcome::Completed { exit_status: Some(3) }));
    assert_eq!(harness.prints().drain(), vec![print("bye")]);

    assert_eq!(
        harness.calls(),
        vec!["subscribe", "load anything", "step", "step", "step"]
    );
    harness.shutdown();
}

/// The `load`, `step`, `is_completed` exchange pairs correctly even with a
/// print arriving between the load result and the step request.
#[tokio::test]
async fn test_load_step_is_completed_with_interleaved_print() {
    let mut harness = TestHarness::machine();

    let load = harness
        .controller()
        .invoke_raw("load", Some(json!("ADD r1 r2")))
        .await;
    harness.inject_print("unrelated output");
    let step = harness.controller().invoke_raw("step", None).await;
    let completed = harness.controller().invoke_raw("is_completed", None).await;

    assert_eq!(load, Ok(Value::Null));
    assert_eq!(step, Ok(json!({ "status": "executed", "pc": 1 })));
    assert_eq!(completed, Ok(json!(false)));
    assert_eq!(harness.prints().drain(), vec![print("unrelated output")]);
    assert_eq!(harness.controller().pending(), 0);
    harness.shutdown();
}

/// Concurrent callers each get their own result.
#[tokio::test]
async fn test_concurrent_calls_keep_their_pairing() {
    let harness = TestHarness::machine();
    let controller = harness.controller();
    controller.load("move $t0 7\nmove $t1 9").await.unwrap();
    controller.step().await.unwrap();
    controller.step().await.unwrap();

    let (t0, word_size, t1, names, bounds) = tokio::join!(
        controller.register_value("t0"),
        controller.word_size(),
        controller.register_value("t1"),
        controller.register_names(),
        controller.memory_bounds(),
    );
    assert_eq!(t0, Ok(7));
    assert_eq!(word_size, Ok(4));
    assert_eq!(t1, Ok(9));
    assert_eq!(names.map(|names| names.len()), Ok(54));
    assert_eq!(bounds.map(|bounds| bounds.lower), Ok(0x1000));
    harness.shutdown();
}

/// A slice past the upper bound fails and leaves machine state untouched.
#[tokio::test]
async fn test_memory_slice_out_of_bounds_does_not_mutate() {
    let harness = TestHarness::machine();
    let controller = harness.controller();
    controller
        .load("store 0x01020304 0x1000\nmove $t3 5")
        .await
        .unwrap();
    controller.step().await.unwrap();

    let bounds = controller.memory_bounds().await.unwrap();
    let memory_before = controller.memory_slice(bounds.lower, bounds.len()).await.unwrap();
    let registers_before = controller.register_values().await.unwrap();

    for (address, length) in [(bounds.upper, 1), (bounds.upper + 64, 4), (bounds.upper - 2, 4)] {
        assert_eq!(
            controller.memory_slice(address, length).await,
            Err(ControlError::OutOfBounds { address, length })
        );
    }

    assert_eq!(
        controller.memory_slice(bounds.lower, bounds.len()).await.unwrap(),
        memory_before
    );
    assert_eq!(controller.register_values().await.unwrap(), registers_before);
    assert_eq!(controller.is_completed().await, Ok(false));
    assert_eq!(
        controller.memory_slice(bounds.lower, 4).await,
        Ok(vec![4, 3, 2, 1])
    );
    harness.shutdown();
}

/// The scripted engine's memory is served through the same bounds check.
#[tokio::test]
async fn test_scripted_memory_bounds() {
    let harness = TestHarness::scripted(Vec::new());
    let controller = harness.controller();
    let upper = SCRIPTED_MEMORY_BASE + SCRIPTED_MEMORY_BYTES as u64;

    assert_eq!(
        controller.memory_slice(SCRIPTED_MEMORY_BASE + 14, 2).await,
        Ok(vec![14, 15])
    );
    assert_eq!(
        controller.memory_slice(upper, 1).await,
        Err(ControlError::OutOfBounds {
            address: upper,
            length: 1
        })
    );
    harness.shutdown();
}

/// N keystrokes then Enter leave one fragment: the characters plus a newline.
#[tokio::test]
async fn test_keystrokes_then_enter_submit_one_fragment() {
    let mut harness = TestHarness::scripted(Vec::new());
    let mut session = harness.session(Arc::new(ResetRegistry::new()));

    for c in "hello".chars() {
        session.keystroke(Key::Char(c)).await.unwrap();
    }
    assert_eq!(session.frame().input, "hello");
    session.keystroke(Key::Enter).await.unwrap();

    assert_eq!(session.console().history(), &["hello\n".to_string()]);
    assert_eq!(session.console().pending_input(), "");
    // The submitted line reached the engine as input.
    assert!(harness.calls().contains(&"input hello".to_string()));
    drop(session);
    harness.shutdown();
}

/// Reset empties history and input, and doing it again changes nothing.
#[tokio::test]
async fn test_reset_is_idempotent() {
    let mut harness = TestHarness::scripted(vec![ScriptedStep::completed(2).print("out\n")]);
    let mut session = harness.session(Arc::new(ResetRegistry::new()));
    session.load("x").await.unwrap();
    session.run(None).await.unwrap();
    session.console().set_pending_input("unsent");
    assert_ne!(session.frame(), Frame::default());

    session.reset().await.unwrap();
    let after_first = session.frame();
    session.reset().await.unwrap();
    let after_second = session.frame();

    let empty = Frame {
        lines: vec![String::new()],
        input: String::new(),
    };
    assert_eq!(after_first, empty);
    assert_eq!(after_second, empty);
    assert_eq!(session.step().await, Err(ControlError::NotLoaded));
    drop(session);
    harness.shutdown();
}

/// Two components on `reset`: both run once, in order, though the first fails.
#[tokio::test]
async fn test_registry_isolates_failing_handler() {
    let mut harness = TestHarness::scripted(Vec::new());
    let registry = Arc::new(ResetRegistry::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    registry.register(RESET, ComponentKind::Registers, move || {
        log.lock().unwrap().push("registers");
        Err(HandlerError::Failed("register view detached".to_string()))
    });
    let mut session = harness.session(Arc::clone(&registry));
    let log = Arc::clone(&order);
    registry.register(RESET, ComponentKind::Memory, move || {
        log.lock().unwrap().push("memory");
        Ok(())
    });

    session.console().print("stale");
    let report = session.reset().await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["registers", "memory"]);
    assert_eq!(
        report.invoked,
        vec![
            ComponentKind::Registers,
            ComponentKind::Console,
            ComponentKind::Memory
        ]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, ComponentKind::Registers);
    assert!(session.console().history().is_empty());
    drop(session);
    harness.shutdown();
}

/// A stop request is consumed by the next step instead of an instruction.
#[tokio::test]
async fn test_stop_takes_effect_at_next_step() {
    let harness = TestHarness::scripted(vec![ScriptedStep::executed(1), ScriptedStep::executed(2)]);
    let controller = harness.controller();
    controller.load("x").await.unwrap();

    controller.stop().await.unwrap();
    assert_eq!(controller.step().await, Ok(StepOutcome::Stopped));
    assert_eq!(controller.step().await, Ok(StepOutcome::Executed { pc: 1 }));
    assert_eq!(controller.register_value("pc").await, Ok(1));
    harness.shutdown();
}

/// After disconnecting, calls fail with `ChannelUnavailable`.
#[tokio::test]
async fn test_disconnected_controller_reports_channel_unavailable() {
    let harness = TestHarness::machine();
    let controller = harness.controller().clone();
    controller.disconnect();

    assert_eq!(controller.ping().await, Err(ControlError::ChannelUnavailable));
    assert_eq!(controller.step().await, Err(ControlError::ChannelUnavailable));
    assert!(!controller.is_connected());
    harness.shutdown();
}
