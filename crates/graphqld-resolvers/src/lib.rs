//! Resolver discovery, calling convention, and process execution for
//! graphqld.
//!
//! A resolver is a standalone executable that implements one schema field.
//! The server learns the field's signature by running the executable in
//! introspection mode, then resolves the field by running it again with the
//! field arguments on its command line, the parent object on standard input,
//! and the request context on file descriptor 3. The resolver answers on
//! standard output.
//!
//! # Architecture
//!
//! - [`signature`] parses the small declaration language resolvers print
//!   when introspected (`charCount(string: String!): CharCountResponse!`).
//! - [`protocol`] is the codec: introspection flags per
//!   [`ProtocolVersion`], argument encoding, the context side channel, and
//!   response decoding.
//! - [`discovery`] enumerates resolver executables;
//!   [`registry::ResolverRegistry`] introspects them and keys the resulting
//!   [`ResolverHandle`]s by type and field.
//! - [`runner::ResolverInvoker`] abstracts running one process;
//!   [`process::ProcessInvoker`] is the production implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use graphqld_resolvers::discovery::DirectoryDiscovery;
//! use graphqld_resolvers::process::ProcessInvoker;
//! use graphqld_resolvers::registry::ResolverRegistry;
//! use graphqld_resolvers::runner::InvocationLimits;
//!
//! let discovery = DirectoryDiscovery::new(["/var/graphqld"], "Query");
//! let limits = InvocationLimits::new(Duration::from_secs(2), 64 * 1024);
//! let registry = ResolverRegistry::build(&discovery, &ProcessInvoker::default(), &limits)
//!     .expect("document root is readable");
//! assert!(registry.lookup("Query", "charCount").is_ok());
//! ```

pub mod context;
pub mod discovery;
pub mod error;
pub mod location;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod signature;

#[cfg(test)]
mod tests;

pub use self::context::{ContextPayload, InvocationContext};
pub use self::discovery::{
    Discovered, DirectoryDiscovery, DiscoveryError, ResolverSource, RootFingerprint,
};
pub use self::error::{ErrorKind, ResolverError};
pub use self::location::{ResolverHandle, ResolverLocation};
pub use self::process::ProcessInvoker;
pub use self::protocol::{
    ArgumentEncoding, CallInput, DecodedResponse, ProcessSpec, ProtocolVersion, ResponseMetadata,
    decode_response, encode_call,
};
pub use self::registry::{FieldKey, RegistryWarning, ResolverRegistry, WarningKind};
pub use self::runner::{InvocationLimits, ProcessOutput, ResolverInvoker};
pub use self::signature::{
    ArgumentDecl, EnumDef, FieldSignature, InputDef, ObjectDef, ScalarType, SignatureDecl,
    SignatureError, TypeDefinition, TypeDefinitions, TypeRef,
};

/// Result of one resolver call: a decoded value or a per-field error.
pub type ResolverResult<T = serde_json::Value> = Result<T, ResolverError>;
