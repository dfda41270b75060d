use std::collections::HashSet;
use std::sync::Arc;

use brick_core::{ComposedSchema, SchemaComposer, SchemaError};
use parking_lot::RwLock;
use tracing::info;

// ---------------------------------------------------------------------------
// FeatureModule trait
// ---------------------------------------------------------------------------

/// A feature that contributes resolvers and one schema fragment.
///
/// Feature modules are registered with a [`FeatureRegistry`] during
/// bootstrap. Their fragments are merged in registration order, which fixes
/// the order of root fields and auxiliary types in the composed schema.
pub trait FeatureModule: Send + Sync {
    /// Unique name of this feature (e.g., `"user"`, `"billing"`).
    fn name(&self) -> &'static str;

    /// Schema fragment declaring this feature's types and entry points.
    fn schema(&self) -> &str;
}

/// Errors from registering a feature module.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("feature already registered: {name}")]
    Duplicate { name: &'static str },
    #[error("invalid schema fragment in feature {name}: {source}")]
    Schema {
        name: &'static str,
        #[source]
        source: SchemaError,
    },
}

// ---------------------------------------------------------------------------
// FeatureRegistry
// ---------------------------------------------------------------------------

/// Registry of feature modules feeding a [`SchemaComposer`].
///
/// Each fragment is merged at registration time, so a malformed fragment is
/// reported by the `register` call that introduced it.
pub struct FeatureRegistry {
    composer: SchemaComposer,
    /// Registration order, used for deterministic composition and reporting.
    order: RwLock<Vec<Arc<dyn FeatureModule>>>,
    names: RwLock<HashSet<&'static str>>,
}

impl FeatureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_composer(SchemaComposer::new())
    }

    /// Creates a registry on top of an already seeded composer.
    #[must_use]
    pub fn with_composer(composer: SchemaComposer) -> Self {
        Self {
            composer,
            order: RwLock::new(Vec::new()),
            names: RwLock::new(HashSet::new()),
        }
    }

    /// Register a feature and merge its fragment.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a feature with the same name
    /// is already registered, or [`RegistryError::Schema`] if its fragment is
    /// malformed. Neither case changes the registry.
    pub fn register<T: FeatureModule + 'static>(&self, feature: T) -> Result<(), RegistryError> {
        let name = feature.name();
        let mut names = self.names.write();
        if names.contains(name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.composer
            .merge(feature.schema())
            .map_err(|source| RegistryError::Schema { name, source })?;
        names.insert(name);
        self.order.write().push(Arc::new(feature));
        info!(feature = name, "registered feature");
        Ok(())
    }

    /// Names of registered features in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.order.read().iter().map(|f| f.name()).collect()
    }

    /// Retrieve a registered feature by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn FeatureModule>> {
        self.order
            .read()
            .iter()
            .find(|f| f.name() == name)
            .cloned()
    }

    /// Current rendering of the combined schema.
    #[must_use]
    pub fn render(&self) -> String {
        self.composer.render()
    }

    /// Ends registration and freezes the composed schema.
    #[must_use]
    pub fn compose(self) -> ComposedSchema {
        let features = self.order.read().len();
        let schema = self.composer.finish();
        info!(features, bytes = schema.as_str().len(), "schema composed");
        schema
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
