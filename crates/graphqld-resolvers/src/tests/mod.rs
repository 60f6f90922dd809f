//! Crate-level test doubles, end-to-end checks, and BDD scenarios.

use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::json;

use crate::error::ResolverError;
use crate::protocol::{ProcessSpec, ProtocolVersion};
use crate::runner::{InvocationLimits, ProcessOutput, ResolverInvoker};

mod behaviour;

struct Rule {
    program: PathBuf,
    first_arg: Option<String>,
    outcome: Result<Vec<u8>, ResolverError>,
}

/// Invoker double that answers from a table keyed by program and first
/// argument, recording every spec it receives.
#[derive(Default)]
pub(crate) struct ScriptedInvoker {
    rules: Vec<Rule>,
    calls: Mutex<Vec<ProcessSpec>>,
}

impl ScriptedInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answers any call to `program` with `stdout`.
    pub(crate) fn respond(mut self, program: impl Into<PathBuf>, stdout: impl Into<Vec<u8>>) -> Self {
        self.rules.push(Rule {
            program: program.into(),
            first_arg: None,
            outcome: Ok(stdout.into()),
        });
        self
    }

    /// Answers calls whose first argument is `first_arg`.
    pub(crate) fn respond_to(
        mut self,
        program: impl Into<PathBuf>,
        first_arg: &str,
        stdout: impl Into<Vec<u8>>,
    ) -> Self {
        self.rules.push(Rule {
            program: program.into(),
            first_arg: Some(first_arg.to_owned()),
            outcome: Ok(stdout.into()),
        });
        self
    }

    /// Answers introspection for `version` with a one-entry signature list.
    pub(crate) fn introspects(
        self,
        program: impl Into<PathBuf>,
        version: ProtocolVersion,
        declared: &str,
    ) -> Self {
        let listing = json!([declared]).to_string();
        self.respond_to(program, version.introspection_flag(), listing)
    }

    /// Fails any call to `program` with `error`.
    pub(crate) fn fail(mut self, program: impl Into<PathBuf>, error: ResolverError) -> Self {
        self.rules.push(Rule {
            program: program.into(),
            first_arg: None,
            outcome: Err(error),
        });
        self
    }

    pub(crate) fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn find(&self, spec: &ProcessSpec) -> Option<&Rule> {
        let first = spec.args().first();
        self.rules
            .iter()
            .filter(|rule| rule.program == spec.program())
            .find(|rule| rule.first_arg.is_some() && rule.first_arg.as_ref() == first)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|rule| rule.program == spec.program() && rule.first_arg.is_none())
            })
    }
}

impl ResolverInvoker for ScriptedInvoker {
    fn invoke(
        &self,
        spec: &ProcessSpec,
        _limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        match self.find(spec) {
            Some(rule) => rule.outcome.clone().map(ProcessOutput::from_stdout),
            None => Err(ResolverError::failed(
                spec.label(),
                Some(127),
                "no scripted response",
            )),
        }
    }
}
