//! Process-wide tracing setup.
//!
//! The subscriber is a registry with two layers: an [`EnvFilter`] built
//! from the configured directives and a `fmt` layer in the configured
//! [`LogFormat`]. Events always go to standard error because standard
//! output carries response documents.

use std::io::{self, IsTerminal};

use graphqld_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer};

/// Format chosen by the first successful initialisation.
static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Output format of the installed subscriber.
    ///
    /// This is the format of the first initialisation, which may differ
    /// from the configuration passed to a later call.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Failures while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive list.
    #[error("invalid log filter '{directives}': {message}")]
    InvalidFilter {
        /// Directives as configured.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Some other global subscriber got there first.
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[source] TryInitError),
}

/// Installs the global subscriber once per process.
///
/// Subsequent calls are no-ops that report the format already installed.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the configured filter
/// does not parse, and [`TelemetryError::Install`] when a subscriber was
/// installed by something else.
///
/// # Examples
///
/// ```rust
/// use graphqld::telemetry;
/// use graphqld_config::Config;
///
/// # fn main() -> Result<(), graphqld::TelemetryError> {
/// let handle = telemetry::initialise(&Config::default())?;
/// assert_eq!(telemetry::initialise(&Config::default())?, handle);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let settings = config.log_settings();
    let filter = parse_filter(settings.filter)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(event_layer(settings.format))
        .try_init()
        .map_err(TelemetryError::Install)?;
    Ok(settings.format)
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|error| TelemetryError::InvalidFilter {
        directives: directives.to_owned(),
        message: error.to_string(),
    })
}

fn event_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .boxed(),
        LogFormat::Compact => layer.compact().with_target(true).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::unknown_level("graphqld=loudest")]
    #[case::unknown_target_level("graphqld::dispatch=chatty")]
    fn rejects_unparsable_filters(#[case] directives: &str) {
        let error = parse_filter(directives).expect_err("filter must be rejected");

        assert!(
            matches!(&error, TelemetryError::InvalidFilter { directives: seen, .. } if seen == directives)
        );
    }

    #[test]
    fn later_calls_report_the_first_format() {
        let first = initialise(&Config::default()).expect("first install");
        let compact = Config {
            log_format: LogFormat::Compact,
            ..Config::default()
        };

        let second = initialise(&compact).expect("second install");

        assert_eq!(second, first);
    }
}
