//! Behaviour-driven tests for building the resolver registry.

use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::location::ResolverLocation;
use crate::protocol::ProtocolVersion;
use crate::registry::ResolverRegistry;
use crate::runner::InvocationLimits;

use super::ScriptedInvoker;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    invoker: ScriptedInvoker,
    locations: Vec<ResolverLocation>,
    registry: Option<ResolverRegistry>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn split_label(label: &str) -> (String, String) {
    let (type_name, field) = label
        .trim_matches('"')
        .split_once('.').expect("label is Type.field");
    (type_name.to_owned(), field.to_owned())
}

fn add_location(world: &mut TestWorld, label: &str) -> String {
    let (type_name, field) = split_label(label);
    let program = format!("/srv/graphqld/{type_name}/{field}.py");
    world
        .locations
        .push(ResolverLocation::new(type_name, field, program.clone()).with_root("/srv/graphqld"));
    program
}

fn registry(world: &TestWorld) -> &ResolverRegistry {
    world.registry.as_ref().expect("registry not built")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a resolver {label} declaring {declared}")]
fn given_declaring(world: &mut TestWorld, label: String, declared: String) {
    let program = add_location(world, &label);
    let invoker = std::mem::take(&mut world.invoker);
    world.invoker =
        invoker.introspects(program, ProtocolVersion::Graphqld, declared.trim_matches('"'));
}

#[given("a resolver {label} that prints {output}")]
fn given_printing(world: &mut TestWorld, label: String, output: String) {
    let program = add_location(world, &label);
    let invoker = std::mem::take(&mut world.invoker);
    world.invoker = invoker.respond(program, output.trim_matches('"').to_owned());
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the registry is built")]
fn when_built(world: &mut TestWorld) {
    let limits = InvocationLimits::new(Duration::from_secs(1), 1024);
    let built = ResolverRegistry::build(&world.locations, &world.invoker, &limits)
        .expect("static source never fails");
    world.registry = Some(built);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("resolver {label} is available")]
fn then_registered(world: &mut TestWorld, label: String) {
    let (type_name, field) = split_label(&label);
    assert!(
        registry(world).lookup(&type_name, &field).is_ok(),
        "expected {label} to be registered"
    );
}

#[then("resolver {label} is excluded")]
fn then_not_registered(world: &mut TestWorld, label: String) {
    let (type_name, field) = split_label(&label);
    assert!(
        registry(world).lookup(&type_name, &field).is_err(),
        "expected {label} to be excluded"
    );
}

#[then("{count} warning of kind {kind} is recorded")]
fn then_warning(world: &mut TestWorld, count: usize, kind: String) {
    let expected = kind.trim_matches('"');
    let matching = registry(world)
        .warnings()
        .iter()
        .filter(|warning| warning.kind.to_string() == expected)
        .count();
    assert_eq!(matching, count, "warnings: {:?}", registry(world).warnings());
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/registry_build.feature")]
fn registry_build_behaviour(world: TestWorld) {
    let _ = world;
}
