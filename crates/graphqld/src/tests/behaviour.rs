//! Behaviour-driven tests for request dispatch.

use std::sync::Arc;
use std::time::Duration;

use graphqld_resolvers::ResolverRegistry;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;

use super::{StubInvoker, registry};
use crate::dispatch::{DispatchEngine, DispatchSettings};
use crate::response::{PathSegment, Response};
use crate::selection::SelectionNode;
use crate::shared_registry::SharedRegistry;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    invoker: StubInvoker,
    entries: Vec<(String, String, String)>,
    settings: DispatchSettings,
    calls: Option<Arc<StubInvoker>>,
    response: Option<Response>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unquote(text: &str) -> &str {
    text.trim_matches('"')
}

fn add_resolver(world: &mut TestWorld, label: &str, declared: &str) -> String {
    let (type_name, _) = unquote(label)
        .split_once('.')
        .expect("label is Type.field");
    let program = format!("/srv/graphqld/{}", unquote(label).replace('.', "/"));
    world.entries.push((
        type_name.to_owned(),
        unquote(declared).to_owned(),
        program.clone(),
    ));
    program
}

fn built_registry(world: &TestWorld) -> ResolverRegistry {
    let entries: Vec<(&str, &str, &str)> = world
        .entries
        .iter()
        .map(|(type_name, declared, program)| {
            (type_name.as_str(), declared.as_str(), program.as_str())
        })
        .collect();
    registry(&entries)
}

/// Parses `a, b/c` into root `a` and root `b` with child `c`.
fn selections(fields: &str) -> Vec<SelectionNode> {
    unquote(fields)
        .split(',')
        .map(str::trim)
        .map(|item| {
            let mut names = item.split('/');
            let root = SelectionNode::field(names.next().unwrap_or_default());
            names.fold(root, |node, child| node.with_selection(SelectionNode::field(child)))
        })
        .collect()
}

fn response(world: &TestWorld) -> &Response {
    world.response.as_ref().expect("request not executed")
}

fn pointer(path: &str) -> String {
    format!("/{}", unquote(path).replace('.', "/"))
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a resolver {label} declaring {declared} that prints {output}")]
fn given_printing(world: &mut TestWorld, label: String, declared: String, output: String) {
    let program = add_resolver(world, &label, &declared);
    let invoker = std::mem::take(&mut world.invoker);
    world.invoker = invoker.prints(&program, unquote(&output));
}

#[given("a resolver {label} declaring {declared} that sleeps {millis} ms")]
fn given_sleeping(world: &mut TestWorld, label: String, declared: String, millis: u64) {
    let program = add_resolver(world, &label, &declared);
    let invoker = std::mem::take(&mut world.invoker);
    world.invoker = invoker.slow(&program, Duration::from_millis(millis), "late");
}

#[given("a resolver {label} declaring {declared} that fails with {stderr}")]
fn given_failing(world: &mut TestWorld, label: String, declared: String, stderr: String) {
    let program = add_resolver(world, &label, &declared);
    let invoker = std::mem::take(&mut world.invoker);
    world.invoker = invoker.fails(&program, unquote(&stderr));
}

#[given("the call timeout is {millis} ms")]
fn given_call_timeout(world: &mut TestWorld, millis: u64) {
    world.settings.call_timeout = Duration::from_millis(millis);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the fields {fields} are requested")]
fn when_requested(world: &mut TestWorld, fields: String) {
    let invoker = Arc::new(std::mem::take(&mut world.invoker));
    let engine = DispatchEngine::new(
        SharedRegistry::new(built_registry(world)),
        Arc::clone(&invoker),
        world.settings.clone(),
    );
    world.response = Some(engine.execute(&selections(&fields), None));
    world.calls = Some(invoker);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("field {path} is {expected}")]
fn then_value(world: &mut TestWorld, path: String, expected: String) {
    let literal = unquote(&expected);
    let expected_value =
        serde_json::from_str(literal).unwrap_or_else(|_| Value::String(literal.to_owned()));
    let data = response(world).data_json();
    assert_eq!(data.pointer(&pointer(&path)), Some(&expected_value), "data: {data}");
}

#[then("field {path} failed with {kind}")]
fn then_failed(world: &mut TestWorld, path: String, kind: String) {
    let wanted: Vec<String> = unquote(&path).split('.').map(str::to_owned).collect();
    let error = response(world)
        .errors()
        .into_iter()
        .find(|error| {
            let keys: Vec<String> = error
                .path
                .iter()
                .map(|segment| match segment {
                    PathSegment::Key(key) => key.clone(),
                    PathSegment::Index(index) => index.to_string(),
                })
                .collect();
            keys == wanted
        })
        .unwrap_or_else(|| panic!("no error at {path}"));
    assert_eq!(error.kind.to_string(), unquote(&kind));
}

#[then("resolver {label} was never invoked")]
fn then_never_invoked(world: &mut TestWorld, label: String) {
    let program = format!("/srv/graphqld/{}", unquote(&label).replace('.', "/"));
    let calls = world.calls.as_ref().expect("request not executed");
    assert!(calls.calls_to(&program).is_empty(), "{label} was invoked");
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/timeout_isolation.feature")]
fn timeout_isolation_behaviour(world: TestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/failed_parent.feature")]
fn failed_parent_behaviour(world: TestWorld) {
    let _ = world;
}
