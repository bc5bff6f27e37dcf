//! Program files run end to end through batch and interactive modes.

use std::io::Write;
use std::sync::Arc;

use simterm_console::{ResetRegistry, Session};
use simterm_engine::{Machine, MachineConfig, FAULT_EXIT_STATUS};
use simterm_run::{batch, interactive, read_program};
use simterm_worker::Controller;
use tempfile::NamedTempFile;

fn program_file(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(source.as_bytes())
        .expect("Failed to write program");
    file
}

async fn session_for(file: &NamedTempFile) -> Session {
    let source = read_program(file.path()).await.unwrap();
    let (controller, prints, _context) =
        Controller::spawn(|| Machine::new(MachineConfig::default())).unwrap();
    let mut session = Session::new(controller, prints, Arc::new(ResetRegistry::new()));
    session.start().await.unwrap();
    session.load(&source).await.unwrap();
    session
}

#[tokio::test]
async fn batch_streams_output_and_returns_status() {
    let file = program_file(
        "# count down from three\n\
         move $t0 3\n\
         loop: printi $t0\n\
         printc ' '\n\
         sub $t0 1\n\
         bgt $t0 0 loop\n\
         exit 9\n",
    );
    let mut session = session_for(&file).await;

    let mut output = Vec::new();
    let status = batch::run(&mut session, &b""[..], &mut output, None)
        .await
        .unwrap();

    assert_eq!(status, 9);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "3 2 1 \nProgram exited with exit code 9\n"
    );
}

#[tokio::test]
async fn batch_feeds_stdin_lines_without_echo() {
    let file = program_file("readi $t0\nreadi $t1\nadd $t0 $t1\nprinti $t0\nmove $r0 0\n");
    let mut session = session_for(&file).await;

    let mut output = Vec::new();
    let status = batch::run(&mut session, &b"40\n2\n"[..], &mut output, None)
        .await
        .unwrap();

    assert_eq!(status, 0);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "42\nProgram exited with exit code 0\n"
    );
}

#[tokio::test]
async fn batch_fails_when_input_runs_out() {
    let file = program_file("readi $t0\n");
    let mut session = session_for(&file).await;

    let mut output = Vec::new();
    let err = batch::run(&mut session, &b""[..], &mut output, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("stdin is closed"));
}

#[tokio::test]
async fn batch_honours_step_limit() {
    let file = program_file("spin: jump spin\n");
    let mut session = session_for(&file).await;

    let mut output = Vec::new();
    let err = batch::run(&mut session, &b""[..], &mut output, Some(50))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "step limit reached after 50 instructions");
}

#[tokio::test]
async fn batch_reports_fault_with_fault_status() {
    let file = program_file("printi 1\ndiv $t0 0\nexit 0\n");
    let mut session = session_for(&file).await;

    let mut output = Vec::new();
    let status = batch::run(&mut session, &b""[..], &mut output, None)
        .await
        .unwrap();
    assert_eq!(status, FAULT_EXIT_STATUS);

    let text = String::from_utf8(output).unwrap();
    assert!(text.starts_with("1\nerror: program error: line 2: "), "unexpected output {text:?}");
    assert!(text.ends_with("\nProgram exited with exit code -1\n"));
}

#[tokio::test]
async fn interactive_session_reloads_from_disk() {
    let file = program_file("printi 1\n");
    let mut session = session_for(&file).await;

    std::fs::write(file.path(), "printi 2\nexit 5\n").unwrap();
    let path = file.path().to_path_buf();

    let script = b":reload\n:run\n:status\n:reg r0\n:quit\n:run\n";
    let mut output = Vec::new();
    interactive::run(&mut session, &path, &script[..], &mut output, None)
        .await
        .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("reloaded"));
    assert!(text.contains("2\nProgram exited with exit code 5\n"));
    assert!(text.contains("completed: true\nexit status: 5\n"));
    assert!(text.contains("r0 = 5\n"));
    assert!(text.contains("instructions: 1\n"));
}

#[tokio::test]
async fn interactive_reports_errors_inline() {
    let file = program_file("nop\n");
    let mut session = session_for(&file).await;

    let script = b":reg $bogus\n:mem 0x0 4\n:fly\n";
    let mut output = Vec::new();
    interactive::run(&mut session, file.path(), &script[..], &mut output, None)
        .await
        .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("error: unrecognized register `$bogus`"));
    assert!(text.contains("error: address range 0x0+4 is outside of memory"));
    assert!(text.contains("unknown command `:fly`"));
}
