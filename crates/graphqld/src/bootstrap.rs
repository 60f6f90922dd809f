//! Server bootstrap orchestration.

use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use graphqld_config::Config;
use graphqld_resolvers::{
    DirectoryDiscovery, DiscoveryError, InvocationContext, InvocationLimits, ResolverInvoker,
    ResolverRegistry, RootFingerprint,
};
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use crate::dispatch::{DispatchEngine, DispatchSettings};
use crate::health::{HealthEvent, HealthReporter};
use crate::response::Response;
use crate::selection::Operation;
use crate::shared_registry::SharedRegistry;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Abstracts configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration from `args` and the ambient layers.
    ///
    /// # Errors
    ///
    /// Returns the `ortho_config` error when a layer fails to parse.
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load_from_iter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(args.iter().cloned())
    }
}

/// Loader that always yields the same configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The document root could not be enumerated.
    #[error("failed to discover resolvers: {source}")]
    Discovery {
        /// Underlying discovery error.
        #[source]
        source: DiscoveryError,
    },
}

/// A bootstrapped server ready to resolve requests.
pub struct Server<I> {
    config: Config,
    discovery: DirectoryDiscovery,
    /// Document root state the current registry was built from.
    fingerprint: Mutex<RootFingerprint>,
    engine: DispatchEngine<I>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl<I> Server<I> {
    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatch engine.
    #[must_use]
    pub const fn engine(&self) -> &DispatchEngine<I> {
        &self.engine
    }

    /// Handle for the installed tracing subscriber.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

impl<I: ResolverInvoker> Server<I> {
    /// Resolves one operation and reports it.
    #[must_use]
    pub fn execute(&self, operation: &Operation, context: Option<&InvocationContext>) -> Response {
        let started = Instant::now();
        let response = self.engine.execute_operation(operation, context);
        self.reporter.report(&HealthEvent::RequestCompleted {
            response: &response,
            elapsed: started.elapsed(),
        });
        response
    }

    /// Rescans the document root and swaps in the new registry.
    ///
    /// Requests already running keep the registry they started with.
    ///
    /// # Errors
    ///
    /// Returns the [`DiscoveryError`] when the root cannot be enumerated;
    /// the previous registry stays active.
    pub fn refresh(&self) -> Result<(), DiscoveryError> {
        let fingerprint = self.discovery.fingerprint()?;
        self.rebuild(fingerprint)
    }

    /// Rebuilds the registry only when the document root has changed since
    /// the last build.
    ///
    /// Returns `true` when a new registry was installed.
    ///
    /// # Errors
    ///
    /// Returns the [`DiscoveryError`] when the root cannot be scanned; the
    /// previous registry stays active and the next call tries again.
    pub fn refresh_if_changed(&self) -> Result<bool, DiscoveryError> {
        let fingerprint = self.discovery.fingerprint()?;
        if *self.fingerprint.lock().unwrap_or_else(PoisonError::into_inner) == fingerprint {
            return Ok(false);
        }
        tracing::info!(
            target: "graphqld::registry",
            entries = fingerprint.len(),
            "document root changed"
        );
        self.rebuild(fingerprint).map(|()| true)
    }

    fn rebuild(&self, fingerprint: RootFingerprint) -> Result<(), DiscoveryError> {
        let registry = self.engine.registry().refresh(
            &self.discovery,
            self.engine.invoker(),
            &introspection_limits(&self.config),
        )?;
        *self.fingerprint.lock().unwrap_or_else(PoisonError::into_inner) = fingerprint;
        self.reporter.report(&HealthEvent::RegistryBuilt(&registry));
        Ok(())
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// Loads configuration, initialises telemetry, and builds the registry by
/// introspecting every executable under the document root. Resolvers that
/// fail introspection are excluded with a warning; only an unreadable
/// document root stops the server.
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the stage that failed.
pub fn bootstrap_with<I: ResolverInvoker>(
    loader: &dyn ConfigLoader,
    args: &[OsString],
    reporter: Arc<dyn HealthReporter>,
    invoker: I,
) -> Result<Server<I>, BootstrapError> {
    reporter.report(&HealthEvent::BootstrapStarting);
    let stage = Stage { reporter: &*reporter };

    let config = stage.check(loader.load(args), |source| BootstrapError::Configuration {
        source,
    })?;
    let telemetry = stage.check(telemetry::initialise(&config), |source| {
        BootstrapError::Telemetry { source }
    })?;
    let discovery = DirectoryDiscovery::new(
        [config.document_root().as_std_path()],
        config.root_type(),
    );
    let limits = introspection_limits(&config);
    let fingerprint = stage.check(discovery.fingerprint(), |source| {
        BootstrapError::Discovery { source }
    })?;
    let registry = stage.check(
        ResolverRegistry::build(&discovery, &invoker, &limits),
        |source| BootstrapError::Discovery { source },
    )?;
    reporter.report(&HealthEvent::RegistryBuilt(&registry));

    let engine = DispatchEngine::new(
        SharedRegistry::new(registry),
        invoker,
        DispatchSettings::from_config(&config),
    );
    reporter.report(&HealthEvent::BootstrapSucceeded(&config));

    Ok(Server {
        config,
        discovery,
        fingerprint: Mutex::new(fingerprint),
        engine,
        telemetry,
        reporter,
    })
}

/// Reports a stage failure before handing it back to the caller.
struct Stage<'r> {
    reporter: &'r dyn HealthReporter,
}

impl Stage<'_> {
    fn check<T, E>(
        &self,
        outcome: Result<T, E>,
        wrap: impl FnOnce(E) -> BootstrapError,
    ) -> Result<T, BootstrapError> {
        outcome.map_err(|source| {
            let error = wrap(source);
            self.reporter.report(&HealthEvent::BootstrapFailed(&error));
            error
        })
    }
}

fn introspection_limits(config: &Config) -> InvocationLimits {
    InvocationLimits::new(config.introspection_timeout(), config.max_payload_bytes())
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::tests::StubInvoker;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn names(&self) -> Vec<&'static str> {
            self.events.lock().expect("events lock").clone()
        }
    }

    impl HealthReporter for Recorder {
        fn report(&self, event: &HealthEvent<'_>) {
            self.events.lock().expect("events lock").push(event.name());
        }
    }

    fn config_for(root: &Path) -> Config {
        Config {
            document_root: root.to_str().expect("utf-8 root").to_owned().into(),
            ..Config::default()
        }
    }

    fn document_root() -> (TempDir, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("charCount.sh");
        fs::write(&script, "#!/bin/sh\n").expect("write resolver");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        let canonical = fs::canonicalize(&script).expect("canonical path");
        let program = canonical.to_str().expect("utf-8 path").to_owned();
        (dir, program)
    }

    #[test]
    fn builds_the_registry_and_reports_each_stage() {
        let (dir, program) = document_root();
        let invoker = StubInvoker::new()
            .prints(&program, r#"["charCount(string: String!): Int"]"#)
            .into_shared();
        let recorder = Arc::new(Recorder::default());
        let loader = StaticConfigLoader::new(config_for(dir.path()));

        let server = bootstrap_with(&loader, &[], Arc::<Recorder>::clone(&recorder), Arc::clone(&invoker))
            .expect("bootstrap succeeds");

        assert!(server.engine().registry().snapshot().lookup("Query", "charCount").is_ok());
        assert_eq!(
            recorder.names(),
            ["bootstrap_starting", "registry_built", "bootstrap_succeeded"]
        );

        let response = server.execute(&Operation::query(Vec::new()), None);
        assert!(response.fields().is_empty());
        assert_eq!(recorder.names().last(), Some(&"request_completed"));
    }

    #[test]
    fn unreadable_document_root_fails_the_discovery_stage() {
        let recorder = Arc::new(Recorder::default());
        let loader = StaticConfigLoader::new(config_for(Path::new("/nonexistent/graphqld")));

        let Err(error) = bootstrap_with(&loader, &[], Arc::<Recorder>::clone(&recorder), StubInvoker::new()) else {
            panic!("a missing document root must fail bootstrap");
        };

        assert!(matches!(error, BootstrapError::Discovery { .. }));
        assert_eq!(recorder.names(), ["bootstrap_starting", "bootstrap_failed"]);
    }

    #[test]
    fn refresh_picks_up_new_resolvers() {
        let (dir, program) = document_root();
        let later = dir.path().join("isEven.sh");
        let invoker = StubInvoker::new()
            .prints(&program, r#"["charCount(string: String!): Int"]"#)
            .prints(
                &fs::canonicalize(dir.path())
                    .expect("canonical root")
                    .join("isEven.sh")
                    .to_string_lossy(),
                r#"["isEven(value: Int!): Boolean"]"#,
            )
            .into_shared();
        let recorder = Arc::new(Recorder::default());
        let loader = StaticConfigLoader::new(config_for(dir.path()));
        let server = bootstrap_with(&loader, &[], Arc::<Recorder>::clone(&recorder), Arc::clone(&invoker))
            .expect("bootstrap succeeds");
        assert!(server.engine().registry().snapshot().get("Query", "isEven").is_none());

        fs::write(&later, "#!/bin/sh\n").expect("write resolver");
        fs::set_permissions(&later, fs::Permissions::from_mode(0o755)).expect("chmod");
        server.refresh().expect("refresh");

        assert!(server.engine().registry().snapshot().get("Query", "isEven").is_some());
        assert_eq!(recorder.names().last(), Some(&"registry_built"));
    }

    #[test]
    fn refresh_if_changed_rebuilds_only_after_the_root_changes() {
        let (dir, program) = document_root();
        let invoker = StubInvoker::new()
            .prints(&program, r#"["charCount(string: String!): Int"]"#)
            .into_shared();
        let recorder = Arc::new(Recorder::default());
        let loader = StaticConfigLoader::new(config_for(dir.path()));
        let server = bootstrap_with(&loader, &[], Arc::<Recorder>::clone(&recorder), Arc::clone(&invoker))
            .expect("bootstrap succeeds");
        let introspections = invoker.calls_to(&program).len();

        assert!(!server.refresh_if_changed().expect("unchanged root"));
        assert_eq!(invoker.calls_to(&program).len(), introspections);

        fs::write(dir.path().join("Query.graphql"), "enum Order { ASC DESC }\n")
            .expect("write declaration");

        assert!(server.refresh_if_changed().expect("changed root"));
        assert!(server.engine().registry().snapshot().types().get("Order").is_some());
        assert!(!server.refresh_if_changed().expect("settled root"));
        assert_eq!(
            recorder
                .names()
                .iter()
                .filter(|name| **name == "registry_built")
                .count(),
            2
        );
    }
}
