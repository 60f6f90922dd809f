//! Producing the per-request invocation context.
//!
//! A provider runs once per request, before any resolver starts. Its
//! result is shared read-only by every resolver the request invokes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use graphqld_resolvers::{
    InvocationContext, InvocationLimits, ProcessSpec, ResolverError, ResolverInvoker,
};
use thiserror::Error;
use tracing::debug;

/// Errors raised while producing a context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A context file could not be read.
    #[error("failed to read context file '{}': {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The context document was not valid.
    #[error("invalid context from {origin}: {source}")]
    Parse {
        /// Where the document came from.
        origin: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The context executable failed.
    #[error("context executable failed: {source}")]
    Exec {
        /// Invocation error.
        #[source]
        source: ResolverError,
    },
}

/// Supplies the context for one request.
pub trait ContextProvider: Send + Sync {
    /// Produces the context, or `None` when the request has none.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] when the context cannot be produced. The
    /// request is not executed in that case.
    fn context(&self) -> Result<Option<InvocationContext>, ContextError>;
}

impl<T: ContextProvider + ?Sized> ContextProvider for Arc<T> {
    fn context(&self) -> Result<Option<InvocationContext>, ContextError> {
        (**self).context()
    }
}

/// Provider returning a fixed context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticContextProvider {
    context: Option<InvocationContext>,
}

impl StaticContextProvider {
    /// Always yields `context`.
    #[must_use]
    pub const fn new(context: InvocationContext) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// Yields no context.
    #[must_use]
    pub const fn none() -> Self {
        Self { context: None }
    }

    /// Loads a context document from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Read`] or [`ContextError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ContextError> {
        let body = fs::read(path).map_err(|source| ContextError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let context = parse_context(&body, &path.display().to_string())?;
        Ok(Self::new(context))
    }
}

impl ContextProvider for StaticContextProvider {
    fn context(&self) -> Result<Option<InvocationContext>, ContextError> {
        Ok(self.context.clone())
    }
}

/// Provider that runs an authentication executable per request.
///
/// The executable inherits the server's environment and prints
/// `{"user": {...}, "loggedIn": bool}` on standard output.
#[derive(Debug, Clone)]
pub struct ExecContextProvider<I> {
    program: PathBuf,
    invoker: I,
    limits: InvocationLimits,
}

impl<I> ExecContextProvider<I> {
    /// Runs `program` through `invoker` within `limits`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, invoker: I, limits: InvocationLimits) -> Self {
        Self {
            program: program.into(),
            invoker,
            limits,
        }
    }
}

impl<I: ResolverInvoker> ContextProvider for ExecContextProvider<I> {
    fn context(&self) -> Result<Option<InvocationContext>, ContextError> {
        let label = self.program.display().to_string();
        let spec = ProcessSpec::new(label.clone(), &self.program);
        let output = self
            .invoker
            .invoke(&spec, &self.limits)
            .map_err(|source| ContextError::Exec { source })?;
        let context = parse_context(&output.stdout, &label)?;
        debug!(
            target: "graphqld::context",
            program = %label,
            logged_in = context.logged_in,
            "context produced"
        );
        Ok(Some(context))
    }
}

fn parse_context(body: &[u8], origin: &str) -> Result<InvocationContext, ContextError> {
    serde_json::from_slice(body).map_err(|source| ContextError::Parse {
        origin: origin.to_owned(),
        source,
    })
}
