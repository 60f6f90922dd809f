//! Lifecycle events and the reporters that observe them.

use std::sync::Arc;
use std::time::Duration;

use graphqld_config::Config;
use graphqld_resolvers::ResolverRegistry;
use strum::IntoStaticStr;

use crate::bootstrap::BootstrapError;
use crate::response::Response;

const HEALTH_TARGET: &str = "graphqld::health";

/// Something worth reporting about the server's state.
#[derive(Debug, Clone, Copy, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum HealthEvent<'a> {
    /// Bootstrap has begun; nothing is loaded yet.
    BootstrapStarting,
    /// The server is ready to take requests.
    BootstrapSucceeded(&'a Config),
    /// Bootstrap stopped at the stage named by the error.
    BootstrapFailed(&'a BootstrapError),
    /// A registry was built at startup or by a refresh.
    RegistryBuilt(&'a ResolverRegistry),
    /// A request finished, possibly with field errors.
    RequestCompleted {
        /// The assembled response.
        response: &'a Response,
        /// Wall time from planning to assembly.
        elapsed: Duration,
    },
}

impl HealthEvent<'_> {
    /// Stable event name used in structured logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Observer for [`HealthEvent`]s.
pub trait HealthReporter: Send + Sync {
    /// Records one event.
    fn report(&self, event: &HealthEvent<'_>);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn report(&self, event: &HealthEvent<'_>) {
        (**self).report(event);
    }
}

/// Reporter that turns every event into a `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Creates the reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn report(&self, event: &HealthEvent<'_>) {
        let name = event.name();
        match *event {
            HealthEvent::BootstrapStarting => {
                tracing::info!(target: HEALTH_TARGET, event = name, "bootstrapping graphqld");
            }
            HealthEvent::BootstrapSucceeded(config) => tracing::info!(
                target: HEALTH_TARGET,
                event = name,
                document_root = %config.document_root(),
                root_type = config.root_type(),
                max_concurrent = config.max_concurrent_resolvers(),
                log_format = %config.log_format(),
                "graphqld ready"
            ),
            HealthEvent::BootstrapFailed(error) => {
                tracing::error!(target: HEALTH_TARGET, event = name, %error, "bootstrap failed");
            }
            HealthEvent::RegistryBuilt(registry) => registry_built(name, registry),
            HealthEvent::RequestCompleted { response, elapsed } => tracing::info!(
                target: HEALTH_TARGET,
                event = name,
                fields = response.fields().len(),
                errors = response.errors().len(),
                partial = response.is_partial(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request resolved"
            ),
        }
    }
}

fn registry_built(name: &'static str, registry: &ResolverRegistry) {
    for (key, handle) in registry.iter() {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "resolver_registered",
            field = %key,
            signature = handle.signature().declared(),
            executable = %handle.executable().display(),
            "resolver registered"
        );
    }
    for definition in registry.types().iter() {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "type_declared",
            name = definition.name(),
            kind = definition.keyword(),
            "type declared"
        );
    }
    for warning in registry.warnings() {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "registry_warning",
            kind = %warning.kind,
            resolver = %warning.resolver,
            message = %warning.message,
            "resolver excluded or overridden"
        );
    }
    tracing::info!(
        target: HEALTH_TARGET,
        event = name,
        resolvers = registry.len(),
        types = registry.types().len(),
        warnings = registry.warnings().len(),
        "resolver registry ready"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_have_snake_case_names() {
        let registry = ResolverRegistry::new();
        let response = Response::new(Vec::new());
        let names: Vec<&str> = [
            HealthEvent::BootstrapStarting,
            HealthEvent::RegistryBuilt(&registry),
            HealthEvent::RequestCompleted {
                response: &response,
                elapsed: Duration::from_millis(3),
            },
        ]
        .iter()
        .map(HealthEvent::name)
        .collect();

        assert_eq!(
            names,
            ["bootstrap_starting", "registry_built", "request_completed"]
        );
    }
}
