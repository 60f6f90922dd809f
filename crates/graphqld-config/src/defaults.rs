//! Default values for [`crate::Config`] fields.

use camino::Utf8PathBuf;

use crate::logging::{DEFAULT_LOG_FILTER, LogFormat};

/// Directory scanned for resolvers when none is configured.
pub const DEFAULT_DOCUMENT_ROOT: &str = "/var/graphqld";

/// Name of the root object type every top-level selection belongs to.
pub const DEFAULT_ROOT_TYPE: &str = "Query";

/// Name of the root object type mutation selections belong to.
pub const DEFAULT_MUTATION_TYPE: &str = "Mutation";

/// Per-resolver wall-clock budget.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

/// Whole-request budget shared by every field of one query.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Budget for a single introspection call during registry build.
pub const DEFAULT_INTROSPECTION_TIMEOUT_MS: u64 = 2_000;

/// Upper bound on concurrently running resolver processes.
pub const DEFAULT_MAX_CONCURRENT_RESOLVERS: usize = 16;

/// Largest standard output accepted from one resolver.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Default document root.
#[must_use]
pub fn default_document_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DOCUMENT_ROOT)
}

/// Default root type name.
#[must_use]
pub fn default_root_type() -> String {
    String::from(DEFAULT_ROOT_TYPE)
}

/// Default mutation root type name.
#[must_use]
pub fn default_mutation_type() -> String {
    String::from(DEFAULT_MUTATION_TYPE)
}

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> String {
    String::from(DEFAULT_LOG_FILTER)
}

/// Default log format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
