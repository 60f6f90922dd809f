//! Shared doubles for the engine tests and the BDD scenarios.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use graphqld_resolvers::{
    FieldSignature, InvocationLimits, ProcessOutput, ProcessSpec, ProtocolVersion, ResolverError,
    ResolverInvoker, ResolverLocation, ResolverRegistry, SignatureDecl, TypeDefinition,
};

mod behaviour;

type Responder = Box<dyn Fn(&ProcessSpec) -> Result<String, ResolverError> + Send + Sync>;

struct Script {
    delay: Duration,
    respond: Responder,
}

/// Invoker double answering per program, recording every call.
///
/// Delays honour the call's timeout the way a real process kill would: a
/// script slower than its budget sleeps for the budget and then times out.
#[derive(Default)]
pub(crate) struct StubInvoker {
    scripts: HashMap<PathBuf, Script>,
    calls: Mutex<Vec<ProcessSpec>>,
}

impl StubInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `program` prints `stdout` and exits zero.
    pub(crate) fn prints(self, program: &str, stdout: &str) -> Self {
        let owned = stdout.to_owned();
        self.answer(program, Duration::ZERO, move |_| Ok(owned.clone()))
    }

    /// `program` takes `delay` and then prints `stdout`.
    pub(crate) fn slow(self, program: &str, delay: Duration, stdout: &str) -> Self {
        let owned = stdout.to_owned();
        self.answer(program, delay, move |_| Ok(owned.clone()))
    }

    /// `program` exits non-zero with `stderr`.
    pub(crate) fn fails(self, program: &str, stderr: &str) -> Self {
        let owned = stderr.to_owned();
        self.answer(program, Duration::ZERO, move |spec| {
            Err(ResolverError::failed(spec.label(), Some(1), &owned))
        })
    }

    /// `program` computes its output from the `ProcessSpec` it receives.
    pub(crate) fn answer(
        mut self,
        program: &str,
        delay: Duration,
        respond: impl Fn(&ProcessSpec) -> Result<String, ResolverError> + Send + Sync + 'static,
    ) -> Self {
        self.scripts.insert(
            PathBuf::from(program),
            Script {
                delay,
                respond: Box::new(respond),
            },
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn calls_to(&self, program: &str) -> Vec<ProcessSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.program() == Path::new(program))
            .collect()
    }

    pub(crate) fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl ResolverInvoker for StubInvoker {
    fn invoke(
        &self,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        let Some(script) = self.scripts.get(spec.program()) else {
            return Err(ResolverError::SpawnFailed {
                resolver: spec.label().to_owned(),
                source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
            });
        };
        if script.delay > limits.timeout() {
            thread::sleep(limits.timeout());
            return Err(ResolverError::Timeout {
                resolver: spec.label().to_owned(),
                timeout_ms: limits.timeout_ms(),
            });
        }
        thread::sleep(script.delay);
        (script.respond)(spec).map(ProcessOutput::from_stdout)
    }
}

/// Builds a registry from `(type, declaration, program)` triples.
pub(crate) fn registry(entries: &[(&str, &str, &str)]) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    for (type_name, declared, program) in entries {
        let decl = SignatureDecl::parse(declared).expect("valid declaration");
        let field = decl.name().to_owned();
        let signature = FieldSignature::new(*type_name, field.as_str(), decl, ProtocolVersion::Graphqld);
        registry.register(ResolverLocation::new(*type_name, field, *program).into_handle(signature));
    }
    registry
}

/// Builds a registry from `entries` plus the types declared in `document`.
pub(crate) fn typed_registry(entries: &[(&str, &str, &str)], document: &str) -> ResolverRegistry {
    let mut built = registry(entries);
    for definition in TypeDefinition::parse_document(document).expect("valid document") {
        built.declare(definition);
    }
    built
}
