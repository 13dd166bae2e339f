//! Capability Registry
//!
//! Thread-safe name → capability store. Every operation takes the same
//! mutex, so each one is atomic with respect to the others.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capability::{Capability, ToolDefinition};
use crate::error::{AssistantError, Result};

type CapabilityMap = HashMap<String, Arc<dyn Capability>>;

/// Registry for available capabilities
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: Mutex<CapabilityMap>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CapabilityMap> {
        self.capabilities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a capability, failing if the name is taken
    pub fn register(&self, capability: Arc<dyn Capability>) -> Result<()> {
        let name = capability.name().to_string();
        let mut capabilities = self.lock();

        if capabilities.contains_key(&name) {
            return Err(AssistantError::DuplicateCapability(name));
        }

        tracing::debug!(capability = %name, "Registered capability");
        capabilities.insert(name, capability);
        Ok(())
    }

    /// Register a concrete capability value
    pub fn register_capability<C: Capability + 'static>(&self, capability: C) -> Result<()> {
        self.register(Arc::new(capability))
    }

    /// Register a batch of capabilities
    ///
    /// All-or-nothing: a name clash with the registry or within the batch
    /// rejects the whole batch and nothing is inserted.
    pub fn register_range<I>(&self, capabilities: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Capability>>,
    {
        let batch: Vec<_> = capabilities.into_iter().collect();
        let mut registered = self.lock();

        let mut seen = HashSet::with_capacity(batch.len());
        for capability in &batch {
            let name = capability.name();
            if registered.contains_key(name) || !seen.insert(name) {
                return Err(AssistantError::DuplicateCapability(name.to_string()));
            }
        }

        for capability in batch {
            registered.insert(capability.name().to_string(), capability);
        }
        Ok(())
    }

    /// Get a capability by name, failing if absent
    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.try_get(name)
            .ok_or_else(|| AssistantError::CapabilityNotFound(name.to_string()))
    }

    /// Get a capability by name
    pub fn try_get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.lock().get(name).cloned()
    }

    /// All registered capabilities
    pub fn get_all(&self) -> Vec<Arc<dyn Capability>> {
        self.lock().values().cloned().collect()
    }

    /// One tool definition per registered capability
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.lock().values().map(|c| c.tool_definition()).collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Remove a capability; returns whether it was present
    pub fn unregister(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered capabilities
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityContext, CapabilityResult, InputSchema, PropertySchema};
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl Capability for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test capability"
        }

        fn input_schema(&self) -> InputSchema {
            InputSchema::new().property("input", PropertySchema::string("anything"))
        }

        async fn execute(&self, _context: CapabilityContext) -> Result<CapabilityResult> {
            Ok(CapabilityResult::success(self.reply))
        }
    }

    fn named(name: &'static str, reply: &'static str) -> Arc<dyn Capability> {
        Arc::new(Named { name, reply })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = CapabilityRegistry::new();
        registry.register(named("hello_world", "hi")).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.is_registered("hello_world"));
        assert!(registry.get("hello_world").is_ok());
        assert!(registry.try_get("hello_world").is_some());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = CapabilityRegistry::new();
        registry.register(named("Echo", "upper")).unwrap();

        assert!(registry.try_get("echo").is_none());
        registry.register(named("echo", "lower")).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_register_leaves_registry_unchanged() {
        let registry = CapabilityRegistry::new();
        registry.register(named("echo", "original")).unwrap();

        let err = registry.register(named("echo", "impostor")).unwrap_err();
        assert!(matches!(err, AssistantError::DuplicateCapability(ref n) if n == "echo"));
        assert_eq!(registry.count(), 1);

        let kept = registry.get("echo").unwrap();
        let result = kept.execute(CapabilityContext::default()).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("original"));
    }

    #[test]
    fn test_get_missing_fails_try_get_does_not() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(AssistantError::CapabilityNotFound(ref n)) if n == "nope"
        ));
        assert!(registry.try_get("nope").is_none());
    }

    #[test]
    fn test_register_range_is_all_or_nothing() {
        let registry = CapabilityRegistry::new();
        registry.register(named("a", "a")).unwrap();

        let clash = registry.register_range([named("b", "b"), named("a", "again")]);
        assert!(clash.is_err());
        assert_eq!(registry.names(), ["a"]);

        let inner_clash = registry.register_range([named("c", "c"), named("c", "c2")]);
        assert!(inner_clash.is_err());
        assert_eq!(registry.count(), 1);

        registry.register_range([named("b", "b"), named("c", "c")]).unwrap();
        assert_eq!(registry.names(), ["a", "b", "c"]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = CapabilityRegistry::new();
        registry.register(named("echo", "x")).unwrap();

        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert!(!registry.unregister("never-there"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_tool_definitions() {
        let registry = CapabilityRegistry::new();
        registry.register(named("one", "1")).unwrap();
        registry.register(named("two", "2")).unwrap();

        let mut defs = registry.to_tool_definitions();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "one");
        assert_eq!(defs[0].description, "test capability");
        assert!(defs[0].input_schema.properties.contains_key("input"));
    }

    #[test]
    fn test_clear() {
        let registry = CapabilityRegistry::new();
        registry.register_range([named("a", "a"), named("b", "b")]).unwrap();
        assert_eq!(registry.get_all().len(), 2);

        registry.clear();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_concurrent_registration_has_single_winner() {
        let registry = Arc::new(CapabilityRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(named("race", "x")).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.count(), 1);
    }
}
