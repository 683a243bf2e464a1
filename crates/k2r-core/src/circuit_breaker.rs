//! Circuit breaker guarding calls to the remote list store.
//!
//! After a run of consecutive failures the breaker opens and calls are
//! skipped outright, so a dead store costs the consumer loop nothing per
//! record. Once the reset timeout elapses a single probe call is let
//! through; other callers are refused until it reports back. Enough probe
//! successes close the breaker again.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    /// Calls proceed normally
    Closed,
    /// Calls are skipped
    Open,
    /// One probe call at a time is allowed
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Duration to wait before allowing a probe
    pub reset_timeout: Duration,

    /// Number of probe successes required to close from half-open
    pub success_threshold: u32,

    /// Name for logging
    pub name: String,
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 1,
            name: name.into(),
        }
    }

    /// Set failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    probe_started: Option<Instant>,
}

/// Circuit breaker for store calls.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!(name = %config.name, "Circuit breaker created");
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                probe_started: None,
            }),
        }
    }

    /// Check if the circuit allows a call, moving Open -> HalfOpen when due.
    pub fn is_allowed(&self) -> bool {
        let mut state = self.state.lock();
        let current = state.state;

        match current {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                // A probe that never reported back is replaced after the reset timeout.
                let free = state
                    .probe_started
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if free {
                    state.probe_started = Some(Instant::now());
                }
                free
            }
            CircuitState::Open => {
                let due = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if due {
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    state.probe_started = Some(Instant::now());
                    info!(name = %self.config.name, "Circuit breaker half-open, probing store");
                }
                due
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.probe_started = None;

        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                state.state = CircuitState::Closed;
                state.success_count = 0;
                state.opened_at = None;
                info!(name = %self.config.name, "Circuit breaker closed (recovered)");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.probe_started = None;
        let tripped = state.failure_count >= self.config.failure_threshold;
        let current = state.state;

        match current {
            CircuitState::Closed if tripped => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                warn!(
                    name = %self.config.name,
                    failures = state.failure_count,
                    "Circuit breaker opened due to failures"
                );
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.success_count = 0;
                state.opened_at = Some(Instant::now());
                warn!(name = %self.config.name, "Probe failed, circuit breaker reopened");
            }
            _ => {
                debug!(
                    name = %self.config.name,
                    failures = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker recorded failure"
                );
            }
        }
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Get the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}
