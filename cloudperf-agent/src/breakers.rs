//! One circuit breaker per monitored instance

use cloudperf_config::CircuitBreakerSettings;
use cloudperf_resilience::{CircuitBreaker, CircuitBreakerBuilder};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Breakers keyed by `(service, instance)`, created on first use
pub struct BreakerRegistry {
    settings: CircuitBreakerSettings,
    breakers: Mutex<HashMap<(String, String), CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, service: &str, instance: &str) -> CircuitBreaker {
        self.breakers
            .lock()
            .entry((service.to_string(), instance.to_string()))
            .or_insert_with(|| {
                CircuitBreakerBuilder::new(format!("{}/{}", service, instance))
                    .max_failures(self.settings.max_failures)
                    .success_threshold(self.settings.success_threshold)
                    .reset_timeout(self.settings.reset_timeout)
                    .build()
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudperf_resilience::CircuitState;

    #[test]
    fn test_breakers_are_shared_per_instance() {
        let registry = BreakerRegistry::new(CircuitBreakerSettings {
            max_failures: 1,
            ..CircuitBreakerSettings::default()
        });

        registry.get("nextcloud", "nc-1").record_failure();

        assert_eq!(registry.get("nextcloud", "nc-1").state(), CircuitState::Open);
        assert_eq!(registry.get("nextcloud", "nc-2").state(), CircuitState::Closed);
        assert_eq!(registry.get("hidrive", "nc-1").state(), CircuitState::Closed);
        assert_eq!(registry.len(), 3);
    }
}
