//! Abstraction over running one resolver process.
//!
//! [`ResolverInvoker`] is the seam between the codec and the operating
//! system. The production implementation is
//! [`ProcessInvoker`](crate::process::ProcessInvoker); tests substitute
//! doubles that return canned output without spawning anything.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ResolverError;
use crate::protocol::ProcessSpec;

/// Resource limits applied to a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
    timeout: Duration,
    max_payload_bytes: usize,
}

impl InvocationLimits {
    /// Creates limits with a wall-clock timeout and a stdout size cap.
    #[must_use]
    pub const fn new(timeout: Duration, max_payload_bytes: usize) -> Self {
        Self {
            timeout,
            max_payload_bytes,
        }
    }

    /// Wall-clock budget for the process.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Largest accepted stdout payload in bytes.
    #[must_use]
    pub const fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// The same limits with the timeout reduced to at most `ceiling`.
    #[must_use]
    pub fn capped(self, ceiling: Duration) -> Self {
        Self {
            timeout: self.timeout.min(ceiling),
            ..self
        }
    }

    /// Timeout in whole milliseconds, saturating.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Captured output of a process that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output bytes.
    pub stdout: Vec<u8>,
    /// Standard error bytes.
    pub stderr: Vec<u8>,
    /// Time from spawn to exit.
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Output consisting only of `stdout`.
    #[must_use]
    pub fn from_stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

/// Runs a process described by a [`ProcessSpec`].
///
/// Implementations must be usable from many threads at once.
///
/// # Example
///
/// ```
/// use graphqld_resolvers::{InvocationLimits, ProcessOutput, ProcessSpec, ResolverError};
/// use graphqld_resolvers::runner::ResolverInvoker;
///
/// struct Echo;
///
/// impl ResolverInvoker for Echo {
///     fn invoke(
///         &self,
///         spec: &ProcessSpec,
///         _limits: &InvocationLimits,
///     ) -> Result<ProcessOutput, ResolverError> {
///         Ok(ProcessOutput::from_stdout(spec.args().join(" ")))
///     }
/// }
/// ```
pub trait ResolverInvoker: Send + Sync {
    /// Runs the process to completion within `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::SpawnFailed`] when the process cannot start,
    /// [`ResolverError::Timeout`] or [`ResolverError::ResponseTooLarge`]
    /// when a limit is exceeded, and [`ResolverError::Failed`] for a
    /// non-zero exit.
    fn invoke(
        &self,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError>;
}

impl<T: ResolverInvoker + ?Sized> ResolverInvoker for &T {
    fn invoke(
        &self,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError> {
        (**self).invoke(spec, limits)
    }
}

impl<T: ResolverInvoker + ?Sized> ResolverInvoker for Arc<T> {
    fn invoke(
        &self,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError> {
        (**self).invoke(spec, limits)
    }
}

#[cfg(test)]
mod tests;
