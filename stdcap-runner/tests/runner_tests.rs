//! Integration tests for the stdcap runner.
//!
//! Each test writes a YAML test file to a temporary directory and runs the `stdcap`
//! binary against it, so capture of the real descriptors 1 and 2 is exercised in a
//! process of its own.

#![cfg(unix)]
#![allow(clippy::panic_in_result_fn)]

use predicates::prelude::*;
use std::path::PathBuf;

struct Suite {
    dir: tempfile::TempDir,
    path: PathBuf,
}

fn suite(yaml: &str) -> anyhow::Result<Suite> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cases.yaml");
    std::fs::write(&path, yaml)?;
    Ok(Suite { dir, path })
}

fn stdcap() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("stdcap"));
    cmd.arg("--no-config");
    cmd
}

#[test]
fn passing_output_is_hidden() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: quiet
cases:
  - name: talks
    run: "echo secret; echo noise >&2"
"#,
    )?;

    stdcap()
        .arg(&suite.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("quiet::talks PASSED"))
        .stdout(predicate::str::contains("secret").not())
        .stderr(predicate::str::contains("noise").not());

    Ok(())
}

#[test]
fn failing_output_is_attributed_to_its_phase() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: loud
cases:
  - name: fails
    setup: "echo preparing"
    run: "echo hello; echo oops >&2; exit 1"
    teardown: "echo cleaning"
"#,
    )?;

    stdcap()
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("loud::fails FAILED"))
        .stdout(predicate::str::contains(" Captured stdout setup ").and(predicate::str::contains("preparing\n")))
        .stdout(predicate::str::contains(" Captured stdout call ").and(predicate::str::contains("hello\n")))
        .stdout(predicate::str::contains(" Captured stderr call ").and(predicate::str::contains("oops\n")))
        .stdout(predicate::str::contains(" Captured stdout teardown ").and(predicate::str::contains("cleaning\n")))
        .stdout(predicate::str::contains("1 failed, 0 passed"));

    Ok(())
}

#[test]
fn sys_capture_collects_output() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: sys
cases:
  - name: fails
    run: "echo via-pipe; exit 1"
"#,
    )?;

    stdcap()
        .args(["--capture", "sys"])
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(" Captured stdout call "))
        .stdout(predicate::str::contains("via-pipe\n"));

    Ok(())
}

#[test]
fn no_capture_passes_output_through() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: open
cases:
  - name: talks
    run: "echo visible"
"#,
    )?;

    stdcap()
        .arg("-s")
        .arg(&suite.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("visible\n"));

    Ok(())
}

#[test]
fn fixtures_see_their_own_output() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: fixtures
cases:
  - name: capfd
    run: "echo out; echo err >&2"
    fixtures: [capfd]
    expect_stdout: "out\n"
    expect_stderr: "err\n"
  - name: capsys
    run: "echo out"
    fixtures: [capsys]
    expect_stdout: "out\n"
  - name: mismatch
    run: "echo actual"
    fixtures: [capfd]
    expect_stdout: "expected\n"
"#,
    )?;

    for method in ["fd", "sys"] {
        stdcap()
            .args(["--capture", method])
            .arg(&suite.path)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("fixtures::capfd PASSED"))
            .stdout(predicate::str::contains("fixtures::capsys PASSED"))
            .stdout(predicate::str::contains("fixtures::mismatch FAILED"))
            .stdout(predicate::str::contains(r#"expected "expected\n", got "actual\n""#));
    }

    Ok(())
}

#[test]
fn requesting_both_fixtures_fails_before_running() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: both
cases:
  - name: greedy
    run: "touch ran"
    fixtures: [capsys, capfd]
"#,
    )?;

    stdcap()
        .current_dir(suite.dir.path())
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "cannot use capsys and capfd at the same time",
        ));

    assert!(!suite.dir.path().join("ran").exists());
    Ok(())
}

#[test]
fn captured_stdin_reads_nothing() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: input
cases:
  - name: captured
    run: "if read line; then echo got; else echo eof; fi"
    expect_stdout: "eof\n"
  - name: provided
    run: "if read line; then echo got $line; else echo eof; fi"
    stdin: "data\n"
    expect_stdout: "got data\n"
"#,
    )?;

    for method in ["fd", "sys"] {
        stdcap()
            .args(["--capture", method])
            .arg(&suite.path)
            .write_stdin("should never be read\n")
            .assert()
            .success();
    }

    Ok(())
}

#[test]
fn setup_show_reaches_the_terminal() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: shown
cases:
  - name: quiet
    run: "echo hidden"
    fixtures: [capsys]
"#,
    )?;

    stdcap()
        .arg("--setup-show")
        .arg(&suite.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("SETUP    quiet [capsys]"))
        .stdout(predicate::str::contains("TEARDOWN quiet [capsys]"))
        .stdout(predicate::str::contains("hidden").not());

    Ok(())
}

#[test]
fn terse_format_prints_markers() -> anyhow::Result<()> {
    let suite = suite(
        r#"
cases:
  - name: ok
    run: "true"
  - name: bad
    run: "false"
"#,
    )?;

    stdcap()
        .args(["--format", "terse"])
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with(".F\n"));

    Ok(())
}

#[test]
fn collection_errors_are_reported() -> anyhow::Result<()> {
    let suite = suite("cases: [this is not a case]")?;

    stdcap()
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("ERROR collecting"))
        .stdout(predicate::str::contains("1 error(s)"));

    Ok(())
}

#[test]
fn directories_are_searched() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: found
cases:
  - name: ok
    run: "true"
"#,
    )?;

    stdcap()
        .arg(suite.dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("found::ok PASSED"));

    Ok(())
}

#[test]
fn usage_errors_exit_with_two() -> anyhow::Result<()> {
    let suite = suite("cases: []")?;

    stdcap()
        .args(["--capture", "tee"])
        .arg(&suite.path)
        .assert()
        .code(2);

    stdcap().arg("/nonexistent/cases.yaml").assert().code(2);

    Ok(())
}

#[test]
fn configuration_selects_capture_method() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: configured
cases:
  - name: talks
    run: "echo through"
"#,
    )?;
    let config_path = suite.dir.path().join("config.toml");
    std::fs::write(&config_path, "[capture]\nmethod = \"no\"\n")?;

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("stdcap"))
        .arg("--config")
        .arg(&config_path)
        .arg(&suite.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("through\n"));

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("stdcap"))
        .arg("--config")
        .arg(suite.dir.path().join("missing.toml"))
        .arg(&suite.path)
        .assert()
        .code(2);

    Ok(())
}

#[test]
fn bundled_cases_pass() -> anyhow::Result<()> {
    let cases = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/cases");

    for method in ["fd", "sys"] {
        stdcap()
            .args(["--capture", method])
            .arg(&cases)
            .assert()
            .success()
            .stdout(predicate::str::contains("6 passed"));
    }

    Ok(())
}

#[test]
fn each_phase_gets_only_its_own_output() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: phases
cases:
  - name: fails
    setup: "echo preparing"
    run: "echo hello; exit 1"
    teardown: "echo cleaning"
"#,
    )?;

    for method in ["fd", "sys"] {
        stdcap()
            .args(["--capture", method])
            .arg(&suite.path)
            .assert()
            .code(1)
            .stdout(predicate::str::is_match(
                r"-+ Captured stdout setup -+\npreparing\n-+ Captured stdout call -+\nhello\n-+ Captured stdout teardown -+\ncleaning\n1 failed",
            )?);
    }

    Ok(())
}

#[test]
fn passing_fixture_output_stays_hidden() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: hidden
cases:
  - name: capfd
    run: "echo fixture-out; echo fixture-err >&2"
    fixtures: [capfd]
    expect_stdout: "fixture-out\n"
  - name: capsys
    run: "echo fixture-out"
    fixtures: [capsys]
"#,
    )?;

    for method in ["fd", "sys"] {
        stdcap()
            .args(["--capture", method])
            .arg(&suite.path)
            .assert()
            .success()
            .stdout(predicate::str::contains("hidden::capfd PASSED"))
            .stdout(predicate::str::contains("fixture-out").not())
            .stderr(predicate::str::contains("fixture-err").not());
    }

    Ok(())
}

#[test]
fn failing_fixture_output_is_reported() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: shown
cases:
  - name: capfd
    run: "echo fixture-out; exit 1"
    fixtures: [capfd]
"#,
    )?;

    stdcap()
        .args(["--capture", "sys"])
        .arg(&suite.path)
        .assert()
        .code(1)
        .stdout(predicate::str::is_match(
            r"-+ Captured stdout call -+\nfixture-out\n",
        )?);

    Ok(())
}

#[test]
fn interrupt_stops_the_running_case() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: stopped
cases:
  - name: first
    setup: "kill -INT $PPID; sleep 0.2"
    run: "touch call-ran"
    teardown: "touch teardown-ran"
  - name: second
    run: "touch second-ran"
"#,
    )?;

    stdcap()
        .current_dir(suite.dir.path())
        .arg(&suite.path)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("interrupted"))
        .stdout(predicate::str::contains("PASSED").not())
        .stdout(predicate::str::contains("0 passed"));

    for marker in ["call-ran", "teardown-ran", "second-ran"] {
        assert!(!suite.dir.path().join(marker).exists(), "{marker} exists");
    }
    Ok(())
}

#[test]
fn pause_on_failure_does_not_wait_without_a_terminal() -> anyhow::Result<()> {
    let suite = suite(
        r#"
name: paused
cases:
  - name: fails
    run: "false"
"#,
    )?;

    stdcap()
        .arg("--pause-on-failure")
        .arg(&suite.path)
        .write_stdin("")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not pausing"));

    Ok(())
}
