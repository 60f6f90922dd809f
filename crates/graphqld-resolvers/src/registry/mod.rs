//! Introspected resolvers keyed by `(type, field)`.
//!
//! [`ResolverRegistry::build`] asks a [`ResolverSource`] for locations,
//! introspects each one, and keeps the handles that answered with a valid
//! signature. Failures never abort the build: the affected resolver is left
//! out and a [`RegistryWarning`] records why, so one broken executable
//! degrades the schema instead of preventing startup.
//!
//! When two locations claim the same field, the later one wins and a
//! [`WarningKind::RegistryConflict`] warning is recorded. Handles are kept
//! in a `BTreeMap` so iteration order does not depend on hashing.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::thread;

use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

use crate::discovery::{DiscoveryError, ResolverSource};
use crate::error::ResolverError;
use crate::location::{ResolverHandle, ResolverLocation};
use crate::protocol::introspect;
use crate::runner::{InvocationLimits, ResolverInvoker};
use crate::signature::{FieldSignature, TypeDefinition, TypeDefinitions};

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = "graphqld_resolvers::registry";

/// Locations introspected concurrently while building.
const INTROSPECTION_BATCH: usize = 16;

/// Outcome of introspecting one location.
enum Introspection {
    Invalid(ResolverError),
    Failed(ResolverError),
    Ready(FieldSignature),
}

fn inspect<I>(invoker: &I, location: &ResolverLocation, limits: &InvocationLimits) -> Introspection
where
    I: ResolverInvoker + ?Sized,
{
    if let Err(err) = location.validate() {
        return Introspection::Invalid(err);
    }
    match introspect(invoker, location, limits) {
        Ok(signature) => Introspection::Ready(signature),
        Err(err) => Introspection::Failed(err),
    }
}

/// Registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    type_name: String,
    field_name: String,
}

impl FieldKey {
    /// Key for `type_name.field_name`.
    #[must_use]
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }

    /// Object type.
    #[must_use]
    pub const fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Field name.
    #[must_use]
    pub const fn field_name(&self) -> &str {
        self.field_name.as_str()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// Why a registry warning was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    /// Introspection failed; the resolver was excluded.
    MalformedSignature,
    /// A later location replaced an earlier one for the same field.
    RegistryConflict,
    /// The declared field name differs from the location's field name.
    SignatureMismatch,
    /// The location itself is unusable; it was never introspected.
    InvalidLocation,
    /// A `.graphql` document could not be read or parsed; none of its
    /// types were declared.
    MalformedDeclaration,
}

/// A non-fatal problem found while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryWarning {
    /// Classification.
    pub kind: WarningKind,
    /// Resolver label (`Type.field`), type name, or declaration path.
    pub resolver: String,
    /// Human-readable detail.
    pub message: String,
}

impl RegistryWarning {
    fn new(kind: WarningKind, resolver: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            resolver: resolver.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RegistryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.resolver, self.message)
    }
}

/// Read-only map from `(type, field)` to an invocable resolver.
///
/// # Example
///
/// ```
/// use graphqld_resolvers::{FieldSignature, ProtocolVersion, ResolverLocation, SignatureDecl};
/// use graphqld_resolvers::registry::ResolverRegistry;
///
/// let decl = SignatureDecl::parse("charCount(string: String!): CharCountResponse!")
///     .expect("valid signature");
/// let signature = FieldSignature::new("Query", "charCount", decl, ProtocolVersion::Graphqld);
/// let handle = ResolverLocation::new("Query", "charCount", "/srv/Query/charCount.py")
///     .into_handle(signature);
///
/// let mut registry = ResolverRegistry::new();
/// registry.register(handle);
/// assert!(registry.lookup("Query", "charCount").is_ok());
/// assert!(registry.lookup("Query", "missing").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    handles: BTreeMap<FieldKey, ResolverHandle>,
    types: TypeDefinitions,
    warnings: Vec<RegistryWarning>,
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers and introspects every resolver offered by `source`.
    ///
    /// Type declaration documents are loaded first. Locations are then
    /// introspected concurrently in small batches and registered in the
    /// order the source listed them.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] only when the source cannot be
    /// enumerated. Per-resolver problems become warnings.
    pub fn build<S, I>(
        source: &S,
        invoker: &I,
        limits: &InvocationLimits,
    ) -> Result<Self, DiscoveryError>
    where
        S: ResolverSource + ?Sized,
        I: ResolverInvoker + ?Sized,
    {
        let found = source.discover()?;
        let locations = found.locations;
        let mut registry = Self::new();
        registry.load_declarations(&found.declarations);

        for batch in locations.chunks(INTROSPECTION_BATCH) {
            let outcomes: Vec<Introspection> = thread::scope(|scope| {
                let calls: Vec<_> = batch
                    .iter()
                    .map(|location| scope.spawn(move || inspect(invoker, location, limits)))
                    .collect();
                calls
                    .into_iter()
                    .zip(batch)
                    .map(|(handle, location)| {
                        handle.join().unwrap_or_else(|_| {
                            Introspection::Failed(ResolverError::MalformedSignature {
                                resolver: location.label(),
                                message: "introspection panicked".to_owned(),
                            })
                        })
                    })
                    .collect()
            });

            for (location, outcome) in batch.iter().zip(outcomes) {
                registry.admit(location.clone(), outcome);
            }
        }

        info!(
            target: REGISTRY_TARGET,
            resolvers = registry.len(),
            types = registry.types.len(),
            warnings = registry.warnings.len(),
            "resolver registry built"
        );
        Ok(registry)
    }

    /// Reads and declares every type in `documents`, in order.
    ///
    /// A document that cannot be read or parsed contributes nothing and is
    /// reported as a warning.
    pub fn load_declarations(&mut self, documents: &[PathBuf]) {
        for path in documents {
            let parsed = fs::read_to_string(path)
                .map_err(|err| err.to_string())
                .and_then(|text| {
                    TypeDefinition::parse_document(&text).map_err(|err| err.to_string())
                });
            match parsed {
                Ok(definitions) => {
                    for definition in definitions {
                        self.declare(definition);
                    }
                }
                Err(message) => self.warn(RegistryWarning::new(
                    WarningKind::MalformedDeclaration,
                    path.display().to_string(),
                    message,
                )),
            }
        }
    }

    /// Declares a type, replacing any earlier type of the same name.
    ///
    /// Returns the replaced definition, if any.
    pub fn declare(&mut self, definition: TypeDefinition) -> Option<TypeDefinition> {
        let name = definition.name().to_owned();
        let keyword = definition.keyword();
        let previous = self.types.insert(definition)?;
        self.warn(RegistryWarning::new(
            WarningKind::RegistryConflict,
            name,
            format!("{keyword} replaces an earlier {}", previous.keyword()),
        ));
        Some(previous)
    }

    /// Introspects a single location and registers it on success.
    ///
    /// Returns `true` when the resolver was registered.
    pub fn add_location<I>(
        &mut self,
        invoker: &I,
        location: ResolverLocation,
        limits: &InvocationLimits,
    ) -> bool
    where
        I: ResolverInvoker + ?Sized,
    {
        let outcome = inspect(invoker, &location, limits);
        self.admit(location, outcome)
    }

    fn admit(&mut self, location: ResolverLocation, outcome: Introspection) -> bool {
        match outcome {
            Introspection::Ready(signature) => {
                if signature.decl().name() != location.field_name() {
                    self.warn(RegistryWarning::new(
                        WarningKind::SignatureMismatch,
                        location.label(),
                        format!(
                            "resolver declares '{}'; registered as '{}'",
                            signature.decl().name(),
                            location.field_name()
                        ),
                    ));
                }
                self.register(location.into_handle(signature));
                true
            }
            Introspection::Invalid(err) => {
                self.warn(RegistryWarning::new(
                    WarningKind::InvalidLocation,
                    location.label(),
                    err.detail(),
                ));
                false
            }
            Introspection::Failed(err) => {
                self.warn(RegistryWarning::new(
                    WarningKind::MalformedSignature,
                    location.label(),
                    err.detail(),
                ));
                false
            }
        }
    }

    /// Registers a handle, replacing any previous handle for the same field.
    ///
    /// Returns the replaced handle, if any.
    pub fn register(&mut self, handle: ResolverHandle) -> Option<ResolverHandle> {
        let signature = handle.signature();
        let key = FieldKey::new(signature.type_name(), signature.field_name());
        match self.handles.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(handle);
                None
            }
            Entry::Occupied(mut slot) => {
                let message = format!(
                    "'{}' replaces '{}'",
                    handle.executable().display(),
                    slot.get().executable().display()
                );
                let label = slot.key().to_string();
                let previous = slot.insert(handle);
                self.warn(RegistryWarning::new(
                    WarningKind::RegistryConflict,
                    label,
                    message,
                ));
                Some(previous)
            }
        }
    }

    fn warn(&mut self, warning: RegistryWarning) {
        warn!(
            target: REGISTRY_TARGET,
            kind = %warning.kind,
            resolver = %warning.resolver,
            message = %warning.message,
            "resolver registry warning"
        );
        self.warnings.push(warning);
    }

    /// Finds the resolver for `type_name.field_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::NotFound`] when no resolver is registered.
    pub fn lookup(&self, type_name: &str, field_name: &str) -> Result<&ResolverHandle, ResolverError> {
        self.get(type_name, field_name)
            .ok_or_else(|| ResolverError::NotFound {
                type_name: type_name.to_owned(),
                field_name: field_name.to_owned(),
            })
    }

    /// Like [`Self::lookup`] but returns `None` on a miss.
    #[must_use]
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&ResolverHandle> {
        self.handles.get(&FieldKey::new(type_name, field_name))
    }

    /// Types declared in `.graphql` documents.
    #[must_use]
    pub const fn types(&self) -> &TypeDefinitions {
        &self.types
    }

    /// Handles in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &ResolverHandle)> {
        self.handles.iter()
    }

    /// Warnings recorded while building, in the order they occurred.
    #[must_use]
    pub fn warnings(&self) -> &[RegistryWarning] {
        &self.warnings
    }

    /// Number of registered resolvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` when no resolvers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
