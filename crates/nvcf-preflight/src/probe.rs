//! Readiness probing.
//!
//! A [`HealthProbe`] makes one attempt; [`wait_healthy`] spreads a fixed
//! number of attempts across the wait budget and stops at the first success.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::{debug, info};

use crate::error::ProbeError;

/// How readiness attempts are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Number of attempts.
    pub attempts: u32,
    /// Sleep after each failed attempt.
    pub interval: Duration,
}

impl PollSchedule {
    /// Spread `attempts` evenly over `budget`, never sleeping less than
    /// `min_interval`. `attempts * interval` is never below `budget`.
    #[must_use]
    pub fn spread(budget: Duration, attempts: u32, min_interval: Duration) -> Self {
        let attempts = attempts.max(1);
        let nanos = budget.as_nanos().div_ceil(u128::from(attempts));
        let interval = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        Self {
            attempts,
            interval: interval.max(min_interval),
        }
    }

    /// Total sleep if every attempt fails.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

/// Result of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Attempt that succeeded, starting at 1.
    pub attempts: u32,
    /// Time from the first attempt to success.
    pub elapsed: Duration,
}

/// One readiness check against a target.
pub trait HealthProbe {
    /// What is being probed, for logs.
    fn target(&self) -> &str;

    /// Make one attempt. `Err` carries why the target is not ready yet.
    fn check(&mut self) -> impl Future<Output = Result<(), String>> + Send;
}

/// Attempt `probe` on `schedule` until it succeeds or attempts run out.
///
/// # Errors
///
/// Returns [`ProbeError::NotHealthyInTime`] after the last failed attempt.
pub async fn wait_healthy<P: HealthProbe>(
    probe: &mut P,
    schedule: PollSchedule,
) -> Result<ProbeOutcome, ProbeError> {
    let started = Instant::now();
    info!(
        probe = probe.target(),
        attempts = schedule.attempts,
        interval_ms = schedule.interval.as_millis(),
        "waiting for container to become healthy"
    );

    for attempt in 1..=schedule.attempts {
        match probe.check().await {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(attempt, elapsed_ms = elapsed.as_millis(), "container is healthy");
                return Ok(ProbeOutcome {
                    attempts: attempt,
                    elapsed,
                });
            }
            Err(reason) => debug!(attempt, %reason, "not healthy yet"),
        }
        tokio::time::sleep(schedule.interval).await;
    }

    Err(ProbeError::NotHealthyInTime {
        attempts: schedule.attempts,
        waited: started.elapsed(),
    })
}

/// `GET` a URL; healthy only on status 200.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    /// Probe `url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidTarget`] if the client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::InvalidTarget {
                target: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

impl HealthProbe for HttpHealthProbe {
    fn target(&self) -> &str {
        &self.url
    }

    async fn check(&mut self) -> Result<(), String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status() == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(format!("status {}", response.status()))
        }
    }
}

/// Standard gRPC health check; healthy only on `SERVING`.
///
/// Holds one lazily-connected channel for the whole wait, so an early
/// connection refusal does not fail the probe.
#[derive(Debug, Clone)]
pub struct GrpcHealthProbe {
    client: HealthClient<Channel>,
    target: String,
}

impl GrpcHealthProbe {
    /// Probe `target` (e.g. `http://127.0.0.1:18080`).
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidTarget`] if `target` is not a valid URI.
    pub fn new(
        target: impl Into<String>,
        connect_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let target = target.into();
        let channel = Endpoint::from_shared(target.clone())
            .map_err(|e| ProbeError::InvalidTarget {
                target: target.clone(),
                reason: e.to_string(),
            })?
            .connect_timeout(connect_timeout)
            .timeout(rpc_timeout)
            .connect_lazy();

        Ok(Self {
            client: HealthClient::new(channel),
            target,
        })
    }
}

impl HealthProbe for GrpcHealthProbe {
    fn target(&self) -> &str {
        &self.target
    }

    async fn check(&mut self) -> Result<(), String> {
        let response = self
            .client
            .check(HealthCheckRequest {
                service: String::new(),
            })
            .await
            .map_err(|status| status.to_string())?;

        match response.into_inner().status() {
            ServingStatus::Serving => Ok(()),
            other => Err(format!("status {}", other.as_str_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use test_case::test_case;

    struct ScriptedProbe {
        results: VecDeque<bool>,
        calls: u32,
    }

    impl ScriptedProbe {
        fn new(results: impl IntoIterator<Item = bool>) -> Self {
            Self {
                results: results.into_iter().collect(),
                calls: 0,
            }
        }
    }

    impl HealthProbe for ScriptedProbe {
        fn target(&self) -> &str {
            "scripted"
        }

        async fn check(&mut self) -> Result<(), String> {
            self.calls += 1;
            match self.results.pop_front() {
                Some(true) => Ok(()),
                _ => Err("not ready".to_string()),
            }
        }
    }

    #[test_case(600, 100, 6_000 ; "default budget")]
    #[test_case(5, 100, 100 ; "floored at minimum")]
    #[test_case(1, 1, 1_000 ; "single attempt")]
    fn test_spread(budget_secs: u64, attempts: u32, expected_ms: u64) {
        let schedule = PollSchedule::spread(
            Duration::from_secs(budget_secs),
            attempts,
            Duration::from_millis(100),
        );
        assert_eq!(schedule.attempts, attempts);
        assert_eq!(schedule.interval, Duration::from_millis(expected_ms));
        assert!(schedule.total() >= Duration::from_secs(budget_secs));
    }

    #[test]
    fn test_spread_rounds_up() {
        let schedule = PollSchedule::spread(Duration::from_secs(1), 3, Duration::from_nanos(1));
        assert_eq!(schedule.interval, Duration::from_nanos(333_333_334));
        assert!(schedule.total() >= Duration::from_secs(1));
    }

    #[test]
    fn test_spread_zero_attempts() {
        let schedule = PollSchedule::spread(Duration::from_secs(1), 0, Duration::from_millis(1));
        assert_eq!(schedule.attempts, 1);
        assert_eq!(schedule.interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_on_first_success() {
        let mut probe = ScriptedProbe::new([false, false, true]);
        let schedule = PollSchedule {
            attempts: 10,
            interval: Duration::from_secs(1),
        };

        let outcome = wait_healthy(&mut probe, schedule).await.expect("healthy");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(probe.calls, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_full_budget() {
        let mut probe = ScriptedProbe::new([]);
        let schedule = PollSchedule::spread(Duration::from_secs(3), 3, Duration::from_millis(100));

        let started = Instant::now();
        let err = wait_healthy(&mut probe, schedule).await.expect_err("unhealthy");
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(probe.calls, 3);
        assert!(err.to_string().contains("did not become healthy in time"));
    }

    #[test]
    fn test_invalid_grpc_target() {
        let result = GrpcHealthProbe::new(
            "not a uri",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ProbeError::InvalidTarget { .. })));
    }
}
