//! Layered configuration for the graphqld resolver server.
//!
//! [`Config`] is loaded through `ortho_config`, which merges built-in
//! defaults, an optional configuration file, `GRAPHQLD_*` environment
//! variables, and command-line flags (highest precedence). The dispatch
//! limits are stored as plain integers so every layer can express them; the
//! accessors convert them into [`Duration`] values for callers.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod mode;

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_DOCUMENT_ROOT, DEFAULT_INTROSPECTION_TIMEOUT_MS,
    DEFAULT_MAX_CONCURRENT_RESOLVERS, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_MUTATION_TYPE,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_ROOT_TYPE, default_document_root, default_log_filter,
    default_log_format, default_mutation_type, default_root_type,
};
pub use logging::{DEFAULT_LOG_FILTER, LogFormat, LogFormatParseError, LogSettings};
pub use mode::RequestMode;

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "GRAPHQLD")]
pub struct Config {
    /// Directory holding one sub-directory of resolvers per object type.
    #[ortho_config(default = defaults::default_document_root())]
    pub document_root: Utf8PathBuf,
    /// Object type that top-level selections are resolved against.
    #[ortho_config(default = defaults::default_root_type())]
    pub root_type: String,
    /// Object type that top-level mutation selections are resolved against.
    #[ortho_config(default = defaults::default_mutation_type())]
    pub mutation_type: String,
    /// Per-resolver timeout in milliseconds.
    #[ortho_config(default = DEFAULT_CALL_TIMEOUT_MS)]
    pub call_timeout_ms: u64,
    /// Whole-request deadline in milliseconds.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Timeout for each introspection call in milliseconds.
    #[ortho_config(default = DEFAULT_INTROSPECTION_TIMEOUT_MS)]
    pub introspection_timeout_ms: u64,
    /// Maximum number of resolver processes running at once.
    #[ortho_config(default = DEFAULT_MAX_CONCURRENT_RESOLVERS)]
    pub max_concurrent_resolvers: usize,
    /// Maximum accepted size of one resolver's standard output.
    #[ortho_config(default = DEFAULT_MAX_PAYLOAD_BYTES)]
    pub max_payload_bytes: usize,
    /// Working directory for resolver processes; inherited when unset.
    pub working_dir: Option<Utf8PathBuf>,
    /// File holding the selection tree as JSON; standard input when unset.
    pub selection: Option<Utf8PathBuf>,
    /// File holding the invocation context as JSON.
    pub context: Option<Utf8PathBuf>,
    /// Executable whose standard output is the invocation context.
    pub context_exec_path: Option<Utf8PathBuf>,
    /// Whether to answer one request or a stream of them.
    #[ortho_config(default = RequestMode::Single)]
    pub request_mode: RequestMode,
    /// `tracing` filter directive.
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Log output encoding.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_root: default_document_root(),
            root_type: default_root_type(),
            mutation_type: default_mutation_type(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            introspection_timeout_ms: DEFAULT_INTROSPECTION_TIMEOUT_MS,
            max_concurrent_resolvers: DEFAULT_MAX_CONCURRENT_RESOLVERS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            working_dir: None,
            selection: None,
            context: None,
            context_exec_path: None,
            request_mode: RequestMode::Single,
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Directory scanned for resolvers.
    #[must_use]
    pub fn document_root(&self) -> &Utf8Path {
        self.document_root.as_path()
    }

    /// Root object type name.
    #[must_use]
    pub fn root_type(&self) -> &str {
        self.root_type.as_str()
    }

    /// Mutation root object type name.
    #[must_use]
    pub fn mutation_type(&self) -> &str {
        self.mutation_type.as_str()
    }

    /// Request intake mode.
    #[must_use]
    pub const fn request_mode(&self) -> RequestMode {
        self.request_mode
    }

    /// Per-resolver timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Whole-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Introspection call timeout.
    #[must_use]
    pub const fn introspection_timeout(&self) -> Duration {
        Duration::from_millis(self.introspection_timeout_ms)
    }

    /// Concurrency cap, never below one.
    #[must_use]
    pub fn max_concurrent_resolvers(&self) -> usize {
        self.max_concurrent_resolvers.max(1)
    }

    /// Payload size cap in bytes.
    #[must_use]
    pub const fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Working directory for resolver processes.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Logging filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Logging output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Logging settings as a single borrowed value.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings<'_> {
        LogSettings {
            filter: self.log_filter(),
            format: self.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.document_root(), Utf8Path::new("/var/graphqld"));
        assert_eq!(config.root_type(), "Query");
        assert_eq!(config.mutation_type(), "Mutation");
        assert_eq!(config.request_mode(), RequestMode::Single);
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.introspection_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_payload_bytes(), 1_048_576);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.working_dir().is_none());
    }

    #[test]
    fn concurrency_cap_is_at_least_one() {
        let config = Config {
            max_concurrent_resolvers: 0,
            ..Config::default()
        };
        assert_eq!(config.max_concurrent_resolvers(), 1);
    }

    #[test]
    fn log_settings_mirror_fields() {
        let config = Config {
            log_filter: String::from("graphqld=debug"),
            log_format: LogFormat::Compact,
            ..Config::default()
        };
        let settings = config.log_settings();
        assert_eq!(settings.filter, "graphqld=debug");
        assert_eq!(settings.format, LogFormat::Compact);
    }
}
