//! Tests for the process invoker, driven through `/bin/sh`.

use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use super::*;
use crate::context::InvocationContext;
use crate::error::ErrorKind;

fn shell(body: &str) -> ProcessSpec {
    ProcessSpec::new("Query.test", "/bin/sh").with_args(vec![
        "-c".to_owned(),
        body.to_owned(),
        "resolver".to_owned(),
    ])
}

fn shell_with_args(body: &str, args: &[&str]) -> ProcessSpec {
    let mut argv = vec!["-c".to_owned(), body.to_owned(), "resolver".to_owned()];
    argv.extend(args.iter().map(|arg| (*arg).to_owned()));
    ProcessSpec::new("Query.test", "/bin/sh").with_args(argv)
}

#[fixture]
fn limits() -> InvocationLimits {
    InvocationLimits::new(Duration::from_secs(5), 64 * 1024)
}

#[rstest]
fn captures_stdout_and_forwards_arguments(limits: InvocationLimits) {
    let spec = shell_with_args("printf '%s=%s' \"$1\" \"$2\"", &["--string", "hi"]);
    let output = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, b"--string=hi");
}

#[rstest]
fn exports_environment(limits: InvocationLimits) {
    let spec = shell("printf '%s' \"$SCRIPT_NAME\"").with_env("SCRIPT_NAME", "Query/f.sh");
    let output = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, b"Query/f.sh");
}

#[rstest]
fn delivers_parent_on_stdin(limits: InvocationLimits) {
    let spec = shell("cat").with_stdin(br#"{"count":2}"#.to_vec());
    let output = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, br#"{"count":2}"#);
}

#[rstest]
fn stdin_is_empty_without_parent(limits: InvocationLimits) {
    let output = ProcessInvoker::new()
        .invoke(&shell("wc -c | tr -d ' '"), &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, b"0\n");
}

#[rstest]
fn exposes_context_on_descriptor_three(limits: InvocationLimits) {
    let payload = InvocationContext::anonymous().to_payload();
    let spec = shell("cat <&3").with_context(payload.clone());
    let output = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, payload.as_bytes());
}

#[rstest]
fn runs_in_working_directory(limits: InvocationLimits) {
    let dir = tempfile::tempdir().expect("tempdir");
    let expected = dir.path().canonicalize().expect("canonical path");
    let spec = shell("pwd -P").with_working_dir(expected.clone());
    let output = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect("resolver runs");
    let printed = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(printed.trim_end(), expected.to_string_lossy());
}

#[rstest]
fn non_zero_exit_reports_stderr(limits: InvocationLimits) {
    let err = ProcessInvoker::new()
        .invoke(&shell("echo 'no such user' >&2; exit 3"), &limits)
        .expect_err("resolver fails");
    assert!(
        matches!(&err, ResolverError::Failed { status: Some(3), stderr, .. } if stderr == "no such user"),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.detail(), "no such user");
}

#[rstest]
fn silent_failure_reports_unknown(limits: InvocationLimits) {
    let err = ProcessInvoker::new()
        .invoke(&shell("exit 1"), &limits)
        .expect_err("resolver fails");
    assert_eq!(err.kind(), ErrorKind::ResolverFailed);
    assert_eq!(err.detail(), "unknown");
}

#[test]
fn timeout_kills_the_resolver() {
    let limits = InvocationLimits::new(Duration::from_millis(200), 1024);
    let started = Instant::now();
    let err = ProcessInvoker::new()
        .invoke(&shell("sleep 10"), &limits)
        .expect_err("resolver times out");
    assert!(matches!(err, ResolverError::Timeout { timeout_ms: 200, .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[rstest]
fn background_children_do_not_hold_the_call_open(limits: InvocationLimits) {
    let started = Instant::now();
    let output = ProcessInvoker::new()
        .invoke(&shell("sleep 10 & echo done"), &limits)
        .expect("resolver runs");
    assert_eq!(output.stdout, b"done\n");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(target_os = "linux")]
#[test]
fn escaped_descendants_cannot_outlive_the_deadline() {
    let Some(setsid) = ["/usr/bin/setsid", "/bin/setsid"]
        .into_iter()
        .find(|path| std::path::Path::new(path).exists())
    else {
        return;
    };
    let limits = InvocationLimits::new(Duration::from_millis(500), 1024);
    let started = Instant::now();
    let err = ProcessInvoker::new()
        .invoke(&shell(&format!("{setsid} sleep 6 & echo done")), &limits)
        .expect_err("held pipes time the call out");
    assert!(matches!(err, ResolverError::Timeout { timeout_ms: 500, .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn oversized_output_is_rejected() {
    let limits = InvocationLimits::new(Duration::from_secs(5), 1024);
    let started = Instant::now();
    let err = ProcessInvoker::new()
        .invoke(&shell("yes"), &limits)
        .expect_err("output exceeds limit");
    assert!(matches!(err, ResolverError::ResponseTooLarge { limit: 1024, .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn output_at_the_limit_is_accepted() {
    let limits = InvocationLimits::new(Duration::from_secs(5), 4);
    let output = ProcessInvoker::new()
        .invoke(&shell("printf abcd"), &limits)
        .expect("output fits");
    assert_eq!(output.stdout, b"abcd");
}

#[rstest]
fn missing_executable_fails_to_spawn(limits: InvocationLimits) {
    let spec = ProcessSpec::new("Query.gone", "/nonexistent/graphqld-resolver");
    let err = ProcessInvoker::new()
        .invoke(&spec, &limits)
        .expect_err("spawn fails");
    assert!(matches!(err, ResolverError::SpawnFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::ResolverFailed);
}
