//! Field resolver dispatch for graphqld.
//!
//! Every field of the schema is served by an executable. At startup the
//! server walks the document root, asks each executable for its field
//! signature, and builds a registry keyed by `(type, field)`. A request is
//! a selection tree; the [`DispatchEngine`] plans each field against the
//! registry, runs the resolvers concurrently as child processes, and
//! assembles a [`Response`] with the same shape as the selection.
//!
//! Per-field failures stay local: a resolver that times out or exits
//! non-zero leaves `null` at its position plus an error entry, while its
//! siblings carry on. Descendants of a failed field are never started.
//!
//! Mutation root fields run one at a time in selection order; see
//! [`Operation`].
//!
//! The binary front end reads one request as JSON, or one per line in
//! stream mode, and writes response documents to standard output; see
//! [`run`].

mod bootstrap;
mod cli;
mod context;
mod dispatch;
mod health;
mod response;
mod selection;
mod shared_registry;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Server, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use cli::{CliError, CliRunner, run};
pub use context::{ContextError, ContextProvider, ExecContextProvider, StaticContextProvider};
pub use dispatch::{DISPATCH_TARGET, DispatchEngine, DispatchSettings, InvocationPool, PoolPermit};
pub use health::{HealthEvent, HealthReporter, StructuredHealthReporter};
pub use response::{
    FieldError, FieldPhase, Gap, PathSegment, Response, ResponseAssembler, ResponseField,
    ResponseValue,
};
pub use selection::{Operation, OperationKind, SelectionNode, SelectionSet, parse_operation};
pub use shared_registry::SharedRegistry;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
