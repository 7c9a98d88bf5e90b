use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn debug_hello(commands: &str) -> Command {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("tests/files/hello.obj")
        .arg("--minimal")
        .arg("--command")
        .arg(commands);
    cmd
}

#[test]
fn registers_display_as_hex() {
    // PC has already been incremented past the first fetch
    debug_hello("r; c")
        .assert()
        .success()
        .stderr(contains("R0:  0x0000"))
        .stderr(contains("R7:  0x0000"))
        .stderr(contains("PC:  0x3001"))
        .stderr(contains("CC:  0x0002"));
}

#[test]
fn registers_update_between_steps() {
    // After LEA R0, #2 at 0x3000, R0 holds 0x3003
    debug_hello("s; r; c")
        .assert()
        .success()
        .stderr(contains("R0:  0x3003"))
        .stderr(contains("PC:  0x3002"));
}

#[test]
fn help_lists_commands() {
    debug_hello("h; c")
        .assert()
        .success()
        .stderr(contains("continue"))
        .stderr(contains("abbreviated to their first letter"));
}

#[test]
fn unrecognized_command_keeps_prompting() {
    debug_hello("x; c")
        .assert()
        .success()
        .stderr(contains("Unrecognized command: x"))
        .stdout(contains("Halted"));
}

#[test]
fn commands_are_case_sensitive() {
    debug_hello("C; c")
        .assert()
        .success()
        .stderr(contains("Unrecognized command: C"));
}

#[test]
fn memory_command_is_a_documented_noop() {
    debug_hello("m 0x3000 4; c")
        .assert()
        .success()
        .stderr(contains("`memory` is not yet implemented."))
        .stdout(contains("Halted"));
}

#[test]
fn piped_commands_keep_multibyte_characters() {
    // Errors echo the command verbatim, so a mangled decode would show up
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("tests/files/hello.obj")
        .arg("--minimal")
        .write_stdin("étape\nc\n");

    cmd.assert()
        .success()
        .stderr(contains("Unrecognized command: étape"))
        .stdout(contains("Halted"));
}

#[cfg(unix)]
#[test]
fn interrupt_at_the_prompt_reports_interruption() {
    use std::process::{Command as Process, Stdio};
    use std::thread;
    use std::time::Duration;

    let mut child = Process::new(assert_cmd::cargo::cargo_bin("weft"))
        .args(["tests/files/hello.obj", "--minimal"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Let the machine reach the prompt, then interrupt it. Closing stdin
    // unblocks the command read so the stop request is noticed.
    thread::sleep(Duration::from_millis(300));
    Process::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    drop(child.stdin.take());

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Interrupted. Exiting..."));
    assert!(!stderr.contains("End of input"));
}

#[test]
fn end_of_input_stops_without_executing() {
    // One step executes LEA only; EOF at the next prompt turns the machine
    // off before PUTS runs
    debug_hello("s")
        .assert()
        .success()
        .stderr(contains("End of input"))
        .stdout(contains("Hello, world!").not())
        .stdout(contains("Halted").not());
}
