//! Pass registry
//!
//! Passes are registered under the key `"<backend>:<name>"` during setup and
//! looked up by backend afterwards. A pass owns the factory that builds its
//! pattern graph, a priority and an enabled flag.
//!
//! # Example
//!
//! ```
//! use graph_fusion::pass::PassRegistry;
//! use graph_fusion::pattern::in_edge;
//!
//! let mut registry = PassRegistry::new();
//! registry
//!     .register_pass("fake", "reorder_relu", |pg| {
//!         let reorder = pg.append_op("reorder", &[]);
//!         pg.append_op("relu", &[in_edge(0, reorder, 0)]);
//!     })
//!     .unwrap()
//!     .set_priority(8.0);
//!
//! assert!(registry.validate().is_ok());
//! assert_eq!(registry.get_passes_for("fake").len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{FusionError, FusionResult};
use crate::pattern::PatternGraph;

/// Builds the pattern graph of a pass into a fresh, named graph
pub type PatternFactory = Arc<dyn Fn(&mut PatternGraph) + Send + Sync>;

/// Registry key of a pass
pub fn pass_key(backend: &str, name: &str) -> String {
    format!("{}:{}", backend, name)
}

/// A registered transformation pass
#[derive(Clone)]
pub struct Pass {
    backend: String,
    name: String,
    factories: Vec<PatternFactory>,
    priority: f32,
    enabled: bool,
}

impl Pass {
    fn new(backend: &str, name: &str) -> Self {
        Self {
            backend: backend.to_string(),
            name: name.to_string(),
            factories: Vec::new(),
            priority: 0.0,
            enabled: true,
        }
    }

    /// Backend the pass belongs to
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Pass name, also used as the pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key `"<backend>:<name>"`
    pub fn key(&self) -> String {
        pass_key(&self.backend, &self.name)
    }

    /// Ordering priority, higher runs first
    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// Whether the pass takes part in pipelines
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of attached pattern factories
    pub fn pattern_count(&self) -> usize {
        self.factories.len()
    }

    /// The single pattern factory of the pass
    pub fn factory(&self) -> FusionResult<&PatternFactory> {
        match self.factories.as_slice() {
            [factory] => Ok(factory),
            other => Err(FusionError::PatternCount {
                pass: self.key(),
                count: other.len(),
            }),
        }
    }

    /// Build and validate a fresh pattern graph named after the pass
    pub fn build_pattern(&self) -> FusionResult<PatternGraph> {
        let factory = self.factory()?;
        let mut pattern = PatternGraph::new(self.name.as_str());
        factory(&mut pattern);
        pattern.validate()?;
        Ok(pattern)
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("key", &self.key())
            .field("patterns", &self.factories.len())
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Mutable access to a pass during registration
pub struct PassHandle<'a> {
    pass: &'a mut Pass,
}

impl PassHandle<'_> {
    /// Attach a pattern factory
    pub fn add_pattern<F>(self, factory: F) -> Self
    where
        F: Fn(&mut PatternGraph) + Send + Sync + 'static,
    {
        self.pass.factories.push(Arc::new(factory));
        self
    }

    /// Attach an already shared pattern factory
    pub fn add_shared_pattern(self, factory: PatternFactory) -> Self {
        self.pass.factories.push(factory);
        self
    }

    /// Set the ordering priority
    pub fn set_priority(self, priority: f32) -> Self {
        self.pass.priority = priority;
        self
    }

    /// Enable or disable the pass
    pub fn set_enabled(self, enabled: bool) -> Self {
        self.pass.enabled = enabled;
        self
    }

    /// The pass being configured
    pub fn pass(&self) -> &Pass {
        self.pass
    }
}

/// Registry of passes keyed by `"<backend>:<name>"`
#[derive(Debug, Clone, Default)]
pub struct PassRegistry {
    passes: IndexMap<String, Pass>,
}

impl PassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass with its pattern factory
    ///
    /// Fails with [`FusionError::DuplicatePass`] if the key is taken.
    pub fn register_pass<F>(
        &mut self,
        backend: &str,
        name: &str,
        factory: F,
    ) -> FusionResult<PassHandle<'_>>
    where
        F: Fn(&mut PatternGraph) + Send + Sync + 'static,
    {
        Ok(self.declare_pass(backend, name)?.add_pattern(factory))
    }

    /// Register a pass without a factory; attach one through the handle
    pub fn declare_pass(&mut self, backend: &str, name: &str) -> FusionResult<PassHandle<'_>> {
        let key = pass_key(backend, name);
        if self.passes.contains_key(&key) {
            return Err(FusionError::DuplicatePass { key });
        }
        log::debug!("registering pass {}", key);
        let pass = self.passes.entry(key).or_insert(Pass::new(backend, name));
        Ok(PassHandle { pass })
    }

    /// Reopen a registered pass for configuration
    pub fn pass_mut(&mut self, backend: &str, name: &str) -> Option<PassHandle<'_>> {
        self.passes
            .get_mut(&pass_key(backend, name))
            .map(|pass| PassHandle { pass })
    }

    /// Look up a pass
    pub fn get(&self, backend: &str, name: &str) -> Option<&Pass> {
        self.passes.get(&pass_key(backend, name))
    }

    /// All passes in registration order
    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.passes.values()
    }

    /// Number of registered passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Check if any pass is registered for a backend
    pub fn has_backend(&self, backend: &str) -> bool {
        self.passes.values().any(|p| p.backend == backend)
    }

    /// Check that every pass owns exactly one pattern factory
    pub fn validate(&self) -> FusionResult<()> {
        for pass in self.passes.values() {
            pass.factory()?;
        }
        Ok(())
    }

    /// Enabled passes of a backend, highest priority first
    ///
    /// Passes with equal priority keep their registration order.
    pub fn get_passes_for(&self, backend: &str) -> Vec<&Pass> {
        let mut passes: Vec<&Pass> = self
            .passes
            .values()
            .filter(|p| p.backend == backend && p.enabled)
            .collect();
        passes.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relu(pg: &mut PatternGraph) {
        pg.append_op("relu", &[]);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PassRegistry::new();
        registry.register_pass("fake", "relu", relu).unwrap();

        let pass = registry.get("fake", "relu").unwrap();
        assert_eq!(pass.key(), "fake:relu");
        assert_eq!(pass.pattern_count(), 1);
        assert!(pass.is_enabled());
        assert!(registry.has_backend("fake"));
        assert!(!registry.has_backend("dnnl"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = PassRegistry::new();
        registry.register_pass("fake", "relu", relu).unwrap();
        let err = registry.register_pass("fake", "relu", relu).err().unwrap();
        assert!(matches!(err, FusionError::DuplicatePass { ref key } if key == "fake:relu"));

        // same name on another backend is a different key
        assert!(registry.register_pass("dnnl", "relu", relu).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_validate_pattern_count() {
        let mut registry = PassRegistry::new();
        registry.declare_pass("fake", "empty").unwrap();
        let err = registry.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("fake:empty"));

        registry.pass_mut("fake", "empty").unwrap().add_pattern(relu);
        assert!(registry.validate().is_ok());

        registry.pass_mut("fake", "empty").unwrap().add_pattern(relu);
        assert!(matches!(
            registry.validate(),
            Err(FusionError::PatternCount { count: 2, .. })
        ));
    }

    #[test]
    fn test_passes_ordered_by_priority() {
        let mut registry = PassRegistry::new();
        registry.register_pass("fake", "low", relu).unwrap().set_priority(1.0);
        registry.register_pass("fake", "high", relu).unwrap().set_priority(9.0);
        registry.register_pass("fake", "tie_a", relu).unwrap().set_priority(5.0);
        registry.register_pass("fake", "tie_b", relu).unwrap().set_priority(5.0);
        registry
            .register_pass("fake", "off", relu)
            .unwrap()
            .set_priority(10.0)
            .set_enabled(false);
        registry.register_pass("other", "x", relu).unwrap();

        let names: Vec<&str> = registry.get_passes_for("fake").iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["high", "tie_a", "tie_b", "low"]);
    }

    #[test]
    fn test_build_pattern_named_after_pass() {
        let mut registry = PassRegistry::new();
        registry.register_pass("fake", "relu_only", relu).unwrap();
        let pattern = registry.get("fake", "relu_only").unwrap().build_pattern().unwrap();
        assert_eq!(pattern.name(), "relu_only");
        assert_eq!(pattern.len(), 1);
    }

    #[test]
    fn test_build_pattern_rejects_invalid_graph() {
        let mut registry = PassRegistry::new();
        registry.register_pass("fake", "nothing", |_| {}).unwrap();
        let err = registry.get("fake", "nothing").unwrap().build_pattern().unwrap_err();
        assert!(matches!(err, FusionError::InvalidPattern { .. }));
    }
}
