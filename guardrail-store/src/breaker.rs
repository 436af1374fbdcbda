//! Circuit breaker wrapping calls to the rule/failure store and the shared
//! cache (§4.5). Each breaker instance tracks its own rolling window and
//! transitions independently; callers must handle the short-circuit error
//! explicitly rather than treat it like any other failure (§9: "tagged error
//! variant handled at the caller").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Width of the rolling window used to decide whether to trip.
    pub window: Duration,
    /// Minimum number of requests in the window before tripping is considered.
    pub min_requests: u32,
    /// Failure ratio, in `[0, 1]`, above which the breaker trips.
    pub failure_ratio: f64,
    /// How long the breaker stays `open` before probing again.
    pub cooldown: Duration,
    /// Number of probes allowed in `half_open` before deciding.
    pub max_probes: u32,
}

impl BreakerConfig {
    /// Defaults for the rule/failure store breaker (§4.5: 10s window, 3
    /// requests, 60% failure ratio, 30s cooldown, 3 probes).
    pub fn store_defaults() -> Self {
        Self {
            window: Duration::from_secs(10),
            min_requests: 3,
            failure_ratio: 0.6,
            cooldown: Duration::from_secs(30),
            max_probes: 3,
        }
    }

    /// Defaults for the shared-cache breaker (§4.5: same window/ratio, 5s
    /// cooldown since cache unavailability is cheaper to recover from).
    pub fn cache_defaults() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            ..Self::store_defaults()
        }
    }
}

struct Inner {
    state: BreakerState,
    events: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
}

/// A circuit breaker around a single backend dependency.
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug, thiserror::Error)]
#[error("backend `{0}` is unavailable: circuit breaker is open")]
pub struct BreakerOpenError(pub &'static str);

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                events: VecDeque::new(),
                opened_at: None,
                probes_in_flight: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.advance_from_open_if_cooled_down();
        self.inner.lock().state
    }

    /// Run `call` through the breaker. Returns `BreakerOpenError` without
    /// invoking `call` when the breaker is open; otherwise runs `call` and
    /// records the outcome.
    pub async fn call<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.advance_from_open_if_cooled_down();

        if !self.admit() {
            return Err(BreakerCallError::Open(BreakerOpenError(self.name)));
        }

        match call().await {
            Ok(value) => {
                self.record(true);
                Ok(value)
            }
            Err(err) => {
                self.record(false);
                Err(BreakerCallError::Backend(err))
            }
        }
    }

    /// Whether a call should be admitted right now. `open` rejects; `closed`
    /// and `half_open` (within the probe budget) admit.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < self.config.max_probes {
                    inner.probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        match inner.state {
            BreakerState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                if success {
                    if inner.probes_in_flight == 0 {
                        inner.state = BreakerState::Closed;
                        inner.events.clear();
                        inner.opened_at = None;
                        tracing::info!(breaker = self.name, "circuit breaker closed after probes succeeded");
                    }
                } else {
                    trip(&mut inner, self.name);
                }
            }
            BreakerState::Closed => {
                inner.events.push_back((now, success));
                prune_window(&mut inner.events, now, self.config.window);

                let total = inner.events.len() as u32;
                let failures = inner.events.iter().filter(|(_, ok)| !ok).count() as u32;
                if total >= self.config.min_requests
                    && f64::from(failures) / f64::from(total) >= self.config.failure_ratio
                {
                    trip(&mut inner, self.name);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn advance_from_open_if_cooled_down(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.cooldown
        {
            inner.state = BreakerState::HalfOpen;
            inner.probes_in_flight = 0;
            tracing::info!(breaker = self.name, "circuit breaker half-open, probing");
        }
    }
}

fn trip(inner: &mut Inner, name: &'static str) {
    inner.state = BreakerState::Open;
    inner.opened_at = Some(Instant::now());
    inner.events.clear();
    tracing::warn!(breaker = name, "circuit breaker opened");
}

fn prune_window(events: &mut VecDeque<(Instant, bool)>, now: Instant, window: Duration) {
    while let Some((ts, _)) = events.front() {
        if now.duration_since(*ts) > window {
            events.pop_front();
        } else {
            break;
        }
    }
}

/// Error returned by [`CircuitBreaker::call`]: either the breaker was open, or
/// the wrapped call itself failed.
#[derive(Debug, thiserror::Error)]
pub enum BreakerCallError<E> {
    #[error(transparent)]
    Open(#[from] BreakerOpenError),
    #[error(transparent)]
    Backend(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            window: Duration::from_secs(10),
            min_requests: 3,
            failure_ratio: 0.6,
            cooldown: Duration::from_millis(20),
            max_probes: 2,
        }
    }

    #[tokio::test]
    async fn trips_open_after_sustained_failure() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> =
                breaker.call(|| async { Err("boom") }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let result: Result<(), BreakerCallError<&str>> =
            breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(BreakerCallError::Open(_))));
    }

    #[tokio::test]
    async fn closes_again_after_successful_probes() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..3 {
            let _: Result<(), BreakerCallError<&str>> =
                breaker.call(|| async { Err("boom") }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        for _ in 0..2 {
            let result: Result<(), BreakerCallError<&str>> =
                breaker.call(|| async { Ok(()) }).await;
            assert!(result.is_ok());
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn stays_closed_below_minimum_requests() {
        let breaker = CircuitBreaker::new("test", fast_config());
        let _: Result<(), BreakerCallError<&str>> = breaker.call(|| async { Err("boom") }).await;
        let _: Result<(), BreakerCallError<&str>> = breaker.call(|| async { Err("boom") }).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
