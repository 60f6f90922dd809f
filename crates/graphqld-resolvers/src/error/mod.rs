//! Errors raised while introspecting, invoking, or decoding resolvers.
//!
//! [`ResolverError`] carries structured context for logging and tests.
//! [`ErrorKind`] is the coarse classification that ends up in a response's
//! error list. I/O errors are wrapped in `Arc` so the error stays cheap to
//! clone into per-field results.

use std::sync::Arc;

use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// Detail reported for a failed resolver that wrote nothing to stderr.
pub const UNKNOWN_FAILURE: &str = "unknown";

/// Classification of a per-field failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No resolver or parent property exists for the selected field.
    UnknownField,
    /// Introspection output was missing or did not parse.
    MalformedSignature,
    /// Resolver output did not match the declared return type.
    MalformedResponse,
    /// The resolver could not be started or exited unsuccessfully.
    ResolverFailed,
    /// The resolver exceeded its time budget.
    Timeout,
    /// The resolver wrote more than the configured payload limit.
    ResponseTooLarge,
    /// Supplied arguments do not match the declared signature.
    InvalidArgument,
    /// Sub-selections were requested on a scalar field, or two selections
    /// clash on one response key.
    InvalidSelection,
}

/// Errors arising from resolver operations.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// No resolver is registered for the requested field.
    #[error("no resolver registered for {type_name}.{field_name}")]
    NotFound {
        /// Object type that was looked up.
        type_name: String,
        /// Field that was looked up.
        field_name: String,
    },

    /// Introspection did not yield a usable signature.
    #[error("resolver '{resolver}' returned a malformed signature: {message}")]
    MalformedSignature {
        /// Resolver label or path.
        resolver: String,
        /// Description of the problem.
        message: String,
    },

    /// Resolver output could not be decoded for the declared return type.
    #[error("resolver '{resolver}' returned a malformed response: {message}")]
    MalformedResponse {
        /// Resolver label.
        resolver: String,
        /// Description of the problem.
        message: String,
    },

    /// The resolver exited with a non-zero status.
    #[error("resolver '{resolver}' failed: {}", failure_detail(.stderr))]
    Failed {
        /// Resolver label.
        resolver: String,
        /// Exit code, absent when the process was killed by a signal.
        status: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The resolver did not finish within its budget.
    #[error("resolver '{resolver}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Resolver label.
        resolver: String,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// The resolver wrote more than the payload limit to stdout.
    #[error("resolver '{resolver}' response exceeded {limit} bytes")]
    ResponseTooLarge {
        /// Resolver label.
        resolver: String,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// Supplied arguments do not satisfy the declared signature.
    #[error("invalid arguments for {field}: {message}")]
    InvalidArgument {
        /// Field path (`Type.field`).
        field: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The selection cannot apply: the value has no fields, or another
    /// selection claims the same response key.
    #[error("invalid selection on {field}: {message}")]
    InvalidSelection {
        /// Field path or response key.
        field: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The resolver process could not be started.
    #[error("resolver '{resolver}' failed to start: {source}")]
    SpawnFailed {
        /// Resolver label.
        resolver: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Communicating with the resolver process failed.
    #[error("I/O error communicating with resolver '{resolver}': {source}")]
    Io {
        /// Resolver label.
        resolver: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

fn failure_detail(stderr: &str) -> &str {
    if stderr.is_empty() {
        UNKNOWN_FAILURE
    } else {
        stderr
    }
}

impl ResolverError {
    /// Builds a [`ResolverError::Failed`] from raw exit information.
    #[must_use]
    pub fn failed(resolver: impl Into<String>, status: Option<i32>, stderr: &str) -> Self {
        Self::Failed {
            resolver: resolver.into(),
            status,
            stderr: stderr.trim().to_owned(),
        }
    }

    /// Coarse classification used in responses.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::UnknownField,
            Self::MalformedSignature { .. } => ErrorKind::MalformedSignature,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Failed { .. } | Self::SpawnFailed { .. } | Self::Io { .. } => {
                ErrorKind::ResolverFailed
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidSelection { .. } => ErrorKind::InvalidSelection,
        }
    }

    /// Message placed in the response for this error.
    ///
    /// A failed resolver reports its stderr verbatim (or `unknown`), which is
    /// what resolver authors write for their callers. Every other variant
    /// uses its display form.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Failed { stderr, .. } => failure_detail(stderr).to_owned(),
            other => other.to_string(),
        }
    }
}
