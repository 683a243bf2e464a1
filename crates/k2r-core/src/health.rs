//! Health check system for monitoring component status.

use crate::cache::CacheHealth;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Component name for the stream source.
pub const KAFKA_COMPONENT: &str = "kafka";

/// Component name for the recent-window cache.
pub const CACHE_COMPONENT: &str = "cache";

/// Health status of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    /// Component is healthy
    Healthy,
    /// Component is degraded but operational
    Degraded(String),
    /// Component is unhealthy
    Unhealthy(String),
    /// Component status is unknown
    Unknown,
}

impl From<&CacheHealth> for ComponentStatus {
    fn from(health: &CacheHealth) -> Self {
        match health {
            CacheHealth::Healthy => ComponentStatus::Healthy,
            CacheHealth::Degraded(reason) => ComponentStatus::Degraded(reason.clone()),
        }
    }
}

/// Overall system health status.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// All components healthy
    Healthy,
    /// Some components degraded
    Degraded,
    /// System is unhealthy
    Unhealthy,
}

/// Health check manager for tracking component health.
pub struct HealthCheck {
    components: RwLock<HashMap<String, ComponentStatus>>,
    loop_running: RwLock<bool>,
}

impl HealthCheck {
    /// Create a new health check manager.
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            loop_running: RwLock::new(false),
        }
    }

    /// Create a manager tracking the pipeline's components.
    pub fn for_pipeline() -> Self {
        let health = Self::new();
        health.register_component(KAFKA_COMPONENT);
        health.register_component(CACHE_COMPONENT);
        health
    }

    /// Register a component to track.
    pub fn register_component(&self, name: &str) {
        let mut components = self.components.write();
        components.insert(name.to_string(), ComponentStatus::Unknown);
    }

    /// Set a component's status.
    pub fn set_status(&self, name: &str, status: ComponentStatus) {
        self.components.write().insert(name.to_string(), status);
    }

    /// Mark a component as healthy.
    pub fn mark_healthy(&self, name: &str) {
        self.set_status(name, ComponentStatus::Healthy);
    }

    /// Mark a component as degraded.
    pub fn mark_degraded(&self, name: &str, reason: &str) {
        self.set_status(name, ComponentStatus::Degraded(reason.to_string()));
    }

    /// Mark a component as unhealthy.
    pub fn mark_unhealthy(&self, name: &str, reason: &str) {
        self.set_status(name, ComponentStatus::Unhealthy(reason.to_string()));
    }

    /// Mirror the window's health into the cache component.
    pub fn record_cache(&self, health: &CacheHealth) {
        self.set_status(CACHE_COMPONENT, health.into());
    }

    /// Get the status of a specific component.
    pub fn get_component_status(&self, name: &str) -> Option<ComponentStatus> {
        let components = self.components.read();
        components.get(name).cloned()
    }

    /// Get all component statuses.
    pub fn get_all_statuses(&self) -> HashMap<String, ComponentStatus> {
        self.components.read().clone()
    }

    /// Get overall system health status.
    pub fn overall_status(&self) -> HealthStatus {
        let components = self.components.read();

        let mut has_degraded = false;
        for status in components.values() {
            match status {
                ComponentStatus::Unhealthy(_) => return HealthStatus::Unhealthy,
                ComponentStatus::Degraded(_) => has_degraded = true,
                _ => {}
            }
        }

        if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Check if the system is operational (healthy or degraded).
    pub fn is_operational(&self) -> bool {
        matches!(
            self.overall_status(),
            HealthStatus::Healthy | HealthStatus::Degraded
        )
    }

    /// Mark the consumer loop as started.
    pub fn loop_started(&self) {
        *self.loop_running.write() = true;
    }

    /// Mark the consumer loop as stopped.
    pub fn loop_stopped(&self) {
        *self.loop_running.write() = false;
    }

    /// Check if the consumer loop is running.
    pub fn is_loop_running(&self) -> bool {
        *self.loop_running.read()
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
