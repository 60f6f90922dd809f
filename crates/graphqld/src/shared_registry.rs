//! A registry that can be rebuilt while requests are running.

use std::sync::{Arc, PoisonError, RwLock};

use graphqld_resolvers::{
    DiscoveryError, InvocationLimits, ResolverInvoker, ResolverRegistry, ResolverSource,
};
use tracing::info;

/// Holds the current registry snapshot.
///
/// Requests take an `Arc` snapshot at the start and keep using it even if a
/// refresh replaces the registry halfway through.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<ResolverRegistry>>>,
}

impl SharedRegistry {
    /// Wraps an already built registry.
    #[must_use]
    pub fn new(registry: ResolverRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The registry requests should use right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ResolverRegistry> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `registry`, returning the previous snapshot.
    pub fn replace(&self, registry: ResolverRegistry) -> Arc<ResolverRegistry> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(registry))
    }

    /// Rebuilds from `source` and installs the result.
    ///
    /// The previous registry stays in place when discovery fails.
    ///
    /// # Errors
    ///
    /// Returns the [`DiscoveryError`] from [`ResolverRegistry::build`].
    pub fn refresh<S, I>(
        &self,
        source: &S,
        invoker: &I,
        limits: &InvocationLimits,
    ) -> Result<Arc<ResolverRegistry>, DiscoveryError>
    where
        S: ResolverSource + ?Sized,
        I: ResolverInvoker + ?Sized,
    {
        let rebuilt = ResolverRegistry::build(source, invoker, limits)?;
        info!(
            target: "graphqld::registry",
            resolvers = rebuilt.len(),
            warnings = rebuilt.warnings().len(),
            "registry refreshed"
        );
        self.replace(rebuilt);
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use graphqld_resolvers::{FieldSignature, ProtocolVersion, ResolverLocation, SignatureDecl};

    use super::*;

    fn registry_with(field: &str) -> ResolverRegistry {
        let decl = SignatureDecl::parse(&format!("{field}: Int")).expect("signature");
        let signature = FieldSignature::new("Query", field, decl, ProtocolVersion::Graphqld);
        let mut registry = ResolverRegistry::new();
        registry.register(
            ResolverLocation::new("Query", field, format!("/srv/{field}")).into_handle(signature),
        );
        registry
    }

    #[test]
    fn snapshots_survive_replacement() {
        let shared = SharedRegistry::new(registry_with("old"));
        let before = shared.snapshot();

        let previous = shared.replace(registry_with("new"));

        assert!(before.get("Query", "old").is_some());
        assert!(Arc::ptr_eq(&before, &previous));
        assert!(shared.snapshot().get("Query", "new").is_some());
        assert!(shared.snapshot().get("Query", "old").is_none());
    }

    #[test]
    fn clones_share_the_same_slot() {
        let shared = SharedRegistry::default();
        let other = shared.clone();
        other.replace(registry_with("f"));
        assert_eq!(shared.snapshot().len(), 1);
    }
}
