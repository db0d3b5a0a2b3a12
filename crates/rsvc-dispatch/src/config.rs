//! Dispatcher configuration

use crate::parking::{new_park, StatePark};
use rsvc_core::error::{DispatchError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default poll budget: how long a worker actively polls for new work
/// before it puts itself to sleep. This period should be much longer than
/// typical RPC round-trip times, so a worker in an ongoing conversation
/// with a single client never parks, and much longer than the park/unpark
/// round trip (tens of microseconds on contemporary hardware).
pub const DEFAULT_POLL_BUDGET: Duration = Duration::from_micros(10_000);

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
///
/// The parker is part of the record so tests can substitute an
/// instrumented implementation instead of rebinding a global.
#[derive(Clone)]
pub struct DispatchConfig {
    /// Time a worker spin-waits before parking.
    pub poll_budget: Duration,

    /// Park/unpark primitive shared by all workers.
    pub parker: Arc<dyn StatePark>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_budget: DEFAULT_POLL_BUDGET,
            parker: new_park(),
        }
    }
}

impl DispatchConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll budget
    pub fn poll_budget(mut self, d: Duration) -> Self {
        self.poll_budget = d;
        self
    }

    /// Set the park/unpark primitive
    pub fn parker(mut self, parker: Arc<dyn StatePark>) -> Self {
        self.parker = parker;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_budget.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "poll_budget must be non-zero",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("poll_budget", &self.poll_budget)
            .field("parker", &"<StatePark>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.poll_budget, Duration::from_micros(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::new().poll_budget(Duration::from_micros(100));
        assert_eq!(config.poll_budget, Duration::from_micros(100));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = DispatchConfig::new().poll_budget(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(DispatchError::InvalidConfig("poll_budget must be non-zero"))
        );
    }

    #[test]
    fn test_debug() {
        let debug = format!("{:?}", DispatchConfig::default());
        assert!(debug.contains("DispatchConfig"));
        assert!(debug.contains("poll_budget"));
    }
}
