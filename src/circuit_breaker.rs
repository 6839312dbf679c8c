use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding one external provider.
pub type ProviderBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Default number of consecutive failures before a provider is skipped.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Creates a circuit breaker for one provider to stop paying for calls that
/// keep failing.
///
/// # Configuration
///
/// - **Failure threshold**: `threshold` consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, calls pass through.
/// - **OPEN**: Too many failures, the provider answers `NoCandidate` without a request.
/// - **HALF_OPEN**: Testing if the provider recovered.
pub fn create_provider_circuit_breaker(threshold: u32) -> ProviderBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(threshold.max(1), backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
