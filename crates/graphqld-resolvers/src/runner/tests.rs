//! Unit tests for invocation limits and invoker forwarding.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use super::*;
use crate::tests::ScriptedInvoker;

#[rstest]
#[case::lowers(Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(1))]
#[case::keeps(Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(1))]
fn capped_takes_the_smaller_timeout(
    #[case] timeout: Duration,
    #[case] ceiling: Duration,
    #[case] expected: Duration,
) {
    let limits = InvocationLimits::new(timeout, 1024).capped(ceiling);
    assert_eq!(limits.timeout(), expected);
    assert_eq!(limits.max_payload_bytes(), 1024);
}

#[test]
fn timeout_ms_saturates() {
    let limits = InvocationLimits::new(Duration::MAX, 1);
    assert_eq!(limits.timeout_ms(), u64::MAX);
}

#[test]
fn arc_and_reference_forward_to_inner_invoker() {
    let invoker = Arc::new(ScriptedInvoker::new().respond("/bin/f", "ok"));
    let spec = ProcessSpec::new("Query.f", "/bin/f");
    let limits = InvocationLimits::new(Duration::from_secs(1), 64);

    let via_arc = invoker.invoke(&spec, &limits).expect("arc invoke");
    let via_ref = (&*invoker).invoke(&spec, &limits).expect("ref invoke");

    assert_eq!(via_arc.stdout, b"ok");
    assert_eq!(via_ref.stdout, b"ok");
    assert_eq!(invoker.calls().len(), 2);
}
