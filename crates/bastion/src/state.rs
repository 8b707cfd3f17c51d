//! Run state tracking and retry helpers.
//!
//! A provisioning run moves through a fixed list of steps. Each step issues
//! exactly one creation call; the calls that configure the new resource
//! (tagging, attaching, associating) belong to the same step.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::ResourceKind;

/// Provisioning steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    /// Network (VPC) creation and tagging.
    Network,
    /// Internet gateway creation and attachment.
    Gateway,
    /// Private subnet `n` (0 or 1).
    PrivateSubnet(u8),
    /// Route table for private subnet `n`, associated without routes.
    PrivateRouteTable(u8),
    /// Public subnet with public IPs on launch.
    PublicSubnet,
    /// Public route table with a default route via the gateway.
    PublicRouteTable,
    /// Security group admitting SSH to the instance.
    InstanceSecurityGroup,
    /// Bastion compute instance.
    Instance,
    /// Database subnet group over the private subnets.
    DatabaseSubnetGroup,
    /// Security group admitting the instance to the database port.
    DatabaseSecurityGroup,
    /// Managed database instance.
    DatabaseInstance,
}

impl ProvisionStep {
    /// Every step of a full run.
    pub const PLAN: [Self; 13] = [
        Self::Network,
        Self::Gateway,
        Self::PrivateSubnet(0),
        Self::PrivateRouteTable(0),
        Self::PrivateSubnet(1),
        Self::PrivateRouteTable(1),
        Self::PublicSubnet,
        Self::PublicRouteTable,
        Self::InstanceSecurityGroup,
        Self::Instance,
        Self::DatabaseSubnetGroup,
        Self::DatabaseSecurityGroup,
        Self::DatabaseInstance,
    ];

    /// 1-based position in the plan.
    #[must_use]
    pub fn number(self) -> usize {
        Self::PLAN
            .iter()
            .position(|step| *step == self)
            .map_or(0, |index| index + 1)
    }

    /// Kind of resource the step creates.
    #[must_use]
    pub fn creates(self) -> ResourceKind {
        match self {
            Self::Network => ResourceKind::Network,
            Self::Gateway => ResourceKind::Gateway,
            Self::PrivateSubnet(_) | Self::PublicSubnet => ResourceKind::Subnet,
            Self::PrivateRouteTable(_) | Self::PublicRouteTable => ResourceKind::RouteTable,
            Self::InstanceSecurityGroup | Self::DatabaseSecurityGroup => {
                ResourceKind::SecurityGroup
            }
            Self::Instance => ResourceKind::ComputeInstance,
            Self::DatabaseSubnetGroup => ResourceKind::DatabaseSubnetGroup,
            Self::DatabaseInstance => ResourceKind::DatabaseInstance,
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Gateway => f.write_str("internet gateway"),
            Self::PrivateSubnet(n) => write!(f, "private subnet {n}"),
            Self::PrivateRouteTable(n) => write!(f, "private route table {n}"),
            Self::PublicSubnet => f.write_str("public subnet"),
            Self::PublicRouteTable => f.write_str("public route table"),
            Self::InstanceSecurityGroup => f.write_str("instance security group"),
            Self::Instance => f.write_str("compute instance"),
            Self::DatabaseSubnetGroup => f.write_str("database subnet group"),
            Self::DatabaseSecurityGroup => f.write_str("database security group"),
            Self::DatabaseInstance => f.write_str("database instance"),
        }
    }
}

/// Lifecycle of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    InProgress(ProvisionStep),
    Completed,
    Failed,
    RollingBack,
    RolledBack,
}

impl RunState {
    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::NotStarted, Self::InProgress(step)) => step.number() == 1,
            (Self::InProgress(current), Self::InProgress(step)) => {
                step.number() == current.number() + 1
            }
            (Self::InProgress(current), Self::Completed) => {
                current.number() == ProvisionStep::PLAN.len()
            }
            (Self::InProgress(_), Self::Failed)
            | (Self::Failed, Self::RollingBack)
            | (Self::RollingBack, Self::RolledBack) => true,
            _ => false,
        }
    }

    /// Whether the run has stopped for good.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::InProgress(step) => write!(f, "in progress ({step})"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::RollingBack => f.write_str("rolling back"),
            Self::RolledBack => f.write_str("rolled back"),
        }
    }
}

/// A transition the run state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal run state transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Current state of a run plus the checked transition into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTracker {
    state: RunState,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            state: RunState::NotStarted,
        }
    }
}

impl RunTracker {
    /// Start tracking a run that has not begun.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    /// Returns an error, leaving the state unchanged, if the transition is illegal.
    pub fn advance(&mut self, next: RunState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        info!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
        Ok(())
    }
}

/// Retry configuration for teardown calls.
///
/// The default budget waits about two minutes per record before giving up,
/// enough for a terminated instance or deleted database to release the
/// groups and subnets it held.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay that follows `delay` under this backoff policy.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            self.max_delay,
            Duration::from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier),
        )
    }

    /// Total time spent sleeping when every attempt fails.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts {
            total += delay;
            delay = self.next_delay(delay);
        }
        total
    }
}

/// Final error of a retried operation and the number of attempts made.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Execute an async function, retrying errors that `is_retryable` accepts.
///
/// Returns the value together with the number of attempts it took.
///
/// # Errors
/// Returns the last error once it is not retryable or attempts run out.
pub async fn with_retry_async<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    mut f: F,
) -> Result<(T, u32), Exhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok((result, attempt)),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(Exhausted {
                        attempts: attempt,
                        error: e,
                    });
                }

                warn!(
                    "{operation_name} failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}...",
                    config.max_attempts
                );

                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_plan_numbers_are_sequential() {
        for (index, step) in ProvisionStep::PLAN.iter().enumerate() {
            assert_eq!(step.number(), index + 1);
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut run = RunTracker::new();
        for step in ProvisionStep::PLAN {
            run.advance(RunState::InProgress(step)).unwrap();
        }
        run.advance(RunState::Completed).unwrap();
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_failure_transitions() {
        let mut run = RunTracker::new();
        run.advance(RunState::InProgress(ProvisionStep::Network))
            .unwrap();
        run.advance(RunState::Failed).unwrap();
        run.advance(RunState::RollingBack).unwrap();
        run.advance(RunState::RolledBack).unwrap();
        assert_eq!(run.state(), RunState::RolledBack);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut run = RunTracker::new();
        assert!(run.advance(RunState::Completed).is_err());
        assert!(run.advance(RunState::RollingBack).is_err());
        assert!(run
            .advance(RunState::InProgress(ProvisionStep::Gateway))
            .is_err());
        assert_eq!(run.state(), RunState::NotStarted);

        run.advance(RunState::InProgress(ProvisionStep::Network))
            .unwrap();
        // Skipping a step or completing early is not allowed.
        assert!(run
            .advance(RunState::InProgress(ProvisionStep::PrivateSubnet(0)))
            .is_err());
        assert!(run.advance(RunState::Completed).is_err());
        // Rolling back requires a failure first.
        assert!(run.advance(RunState::RollingBack).is_err());

        run.advance(RunState::Failed).unwrap();
        assert!(run.advance(RunState::Completed).is_err());
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_total_backoff() {
        // 2 + 4 + 8 + 16 + 30 + 30 + 30
        assert_eq!(RetryConfig::default().total_backoff(), Duration::from_secs(120));
        assert_eq!(RetryConfig::none().total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(config.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let (value, attempts) = with_retry_async(
            &fast_retry(3),
            "flaky",
            |_: &String| true,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("busy".to_string())
                } else {
                    Ok(7)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = &AtomicU32::new(0);
        let err = with_retry_async(
            &fast_retry(5),
            "gone",
            |_: &String| false,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("not found".to_string())
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let err = with_retry_async(
            &fast_retry(2),
            "down",
            |_: &String| true,
            || async { Err::<(), _>("unavailable".to_string()) },
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.error, "unavailable");
    }
}
