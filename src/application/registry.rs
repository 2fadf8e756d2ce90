use crate::domain::ports::PayoutProcessor;
use std::collections::HashMap;
use std::sync::Arc;

/// Payout drivers keyed by method name, assembled once at startup.
///
/// Lookups are case-insensitive so `"Stripe"` on a payout finds the `stripe` driver.
#[derive(Debug, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn PayoutProcessor>>,
    fallback: Arc<dyn PayoutProcessor>,
}

impl ProcessorRegistry {
    /// Creates a registry whose `fallback` handles methods nobody registered.
    /// The fallback is itself registered under its own name.
    pub fn new(fallback: Arc<dyn PayoutProcessor>) -> Self {
        let mut processors = HashMap::new();
        processors.insert(fallback.name().to_lowercase(), Arc::clone(&fallback));
        Self {
            processors,
            fallback,
        }
    }

    pub fn register(mut self, processor: Arc<dyn PayoutProcessor>) -> Self {
        self.processors
            .insert(processor.name().to_lowercase(), processor);
        self
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn PayoutProcessor>> {
        self.processors.get(&method.to_lowercase()).cloned()
    }

    /// Driver for `method`, or the fallback when the method is unknown.
    pub fn resolve(&self, method: &str) -> Arc<dyn PayoutProcessor> {
        self.get(method)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::processors::{DisabledProcessor, ManualProcessor};

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ProcessorRegistry::new(Arc::new(DisabledProcessor))
            .register(Arc::new(ManualProcessor::new()));

        assert_eq!(registry.get("Manual").unwrap().name(), "manual");
        assert_eq!(registry.get("DISABLED").unwrap().name(), "disabled");
        assert!(registry.get("stripe").is_none());
        assert_eq!(registry.names(), vec!["disabled", "manual"]);
    }

    #[test]
    fn test_unknown_method_resolves_to_fallback() {
        let registry = ProcessorRegistry::new(Arc::new(DisabledProcessor));
        assert_eq!(registry.resolve("paypal").name(), "disabled");
    }
}
