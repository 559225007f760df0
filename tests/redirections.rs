use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_shell(lines: &[String]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_smash"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn smash");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait for output")
}

// Redirections apply to external commands; the echo *builtin* takes its
// whole line literally, so these tests spell out /bin/echo.

#[test]
fn stdout_redirect_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("out.txt");

    let output = run_shell(&[
        format!("/bin/echo hello > {}", file.display()),
        format!("cat < {}", file.display()),
    ]);

    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
    assert_eq!(fs::read_to_string(&file).expect("read out.txt"), "hello\n");
}

#[test]
fn append_creates_then_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("log.txt");

    run_shell(&[
        format!("/bin/echo a > {}", file.display()),
        format!("/bin/echo b >> {}", file.display()),
    ]);

    assert_eq!(fs::read_to_string(&file).expect("read log.txt"), "a\nb\n");
}

#[test]
fn append_without_existing_file_creates_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("fresh.txt");

    run_shell(&[format!("/bin/echo first >> {}", file.display())]);

    assert_eq!(fs::read_to_string(&file).expect("read fresh.txt"), "first\n");
}

#[test]
fn truncate_overwrites_previous_contents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("out.txt");

    run_shell(&[
        format!("/bin/echo long-first-line > {}", file.display()),
        format!("/bin/echo x > {}", file.display()),
    ]);

    assert_eq!(fs::read_to_string(&file).expect("read out.txt"), "x\n");
}

#[test]
fn fused_redirect_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("fused.txt");

    run_shell(&[format!("/bin/echo hi >{}", file.display())]);

    assert_eq!(fs::read_to_string(&file).expect("read fused.txt"), "hi\n");
}

#[test]
fn stderr_capture_leaves_shell_stderr_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("err.log");

    let output = run_shell(&[
        format!("cat no-such-file-xyz 2> {}", file.display()),
        "echo $?".to_string(),
    ]);

    let captured = fs::read_to_string(&file).expect("read err.log");
    assert!(captured.contains("no-such-file-xyz"), "captured: {captured}");

    // The child failed, and its noise went to the file, not to our stderr.
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1 \n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("no-such-file-xyz"),
        "stderr was: {stderr}"
    );
}

#[test]
fn pipeline_last_stage_redirects_to_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("head.txt");

    run_shell(&[format!("seq 5 | head -2 > {}", file.display())]);

    assert_eq!(fs::read_to_string(&file).expect("read head.txt"), "1\n2\n");
}

#[test]
fn input_redirect_feeds_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("in.txt");
    fs::write(&file, "line one\nline two\n").expect("write input");

    let output = run_shell(&[format!("wc -l < {}", file.display())]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "2");
}
