//! Один логический запрос: breaker -> лимитер -> попытки с backoff.
//!
//! В breaker пишется только итог запроса (успех или терминальная ошибка),
//! промежуточные неудачные попытки, ушедшие в ретрай, туда не попадают.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use feed_core::config::RETRY_JITTER_MS;
use feed_core::{CircuitBreaker, Clock, ConfigError, FetchError, RetryPolicy, TokenBucket};

/// Наблюдатель ретраев: `(номер повтора с 1, ошибка, задержка)`
pub type RetryObserver = Box<dyn Fn(u32, &FetchError, Duration) + Send + Sync>;

/// Что делать с упавшей попыткой
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Retry(Duration),
    Fail,
}

pub struct RetryingExecutor {
    policy: RetryPolicy,
    limiter: Option<Arc<TokenBucket>>,
    breaker: Option<Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
    on_retry: Option<RetryObserver>,
}

impl fmt::Debug for RetryingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingExecutor")
            .field("policy", &self.policy)
            .field("limiter", &self.limiter.is_some())
            .field("breaker", &self.breaker.is_some())
            .finish()
    }
}

impl RetryingExecutor {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            limiter: None,
            breaker: None,
            clock,
            on_retry: None,
        })
    }

    pub fn with_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Выполнить запрос с ретраями.
    ///
    /// Открытый breaker -> сразу [`FetchError::CircuitOpen`], `attempt` не
    /// вызывается. Токен лимитера берётся один раз на логический запрос.
    pub fn execute<T>(
        &self,
        mut attempt: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        if let Some(breaker) = &self.breaker {
            if !breaker.can_request() {
                debug!("request rejected: circuit breaker is {}", breaker.state());
                return Err(FetchError::CircuitOpen);
            }
        }

        if let Some(limiter) = &self.limiter {
            limiter.acquire();
        }

        let mut n: u32 = 0;
        loop {
            match attempt() {
                Ok(v) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.record_success();
                    }
                    return Ok(v);
                }
                Err(e) => match self.classify(&e, n) {
                    Outcome::Retry(delay) => {
                        warn!(
                            "attempt {} failed ({}), retrying in {}ms",
                            n + 1,
                            e.kind(),
                            delay.as_millis()
                        );
                        if let Some(cb) = &self.on_retry {
                            cb(n + 1, &e, delay);
                        }
                        self.clock.sleep(delay);
                        n += 1;
                    }
                    Outcome::Fail => {
                        debug!("giving up after {} attempt(s): {e}", n + 1);
                        if let Some(breaker) = &self.breaker {
                            breaker.record_failure();
                        }
                        return Err(e);
                    }
                },
            }
        }
    }

    pub(crate) fn classify(&self, err: &FetchError, attempt: u32) -> Outcome {
        if self.policy.should_retry(err.kind(), attempt) {
            Outcome::Retry(self.delay_for(attempt))
        } else {
            Outcome::Fail
        }
    }

    /// backoff + равномерный джиттер в `[0, 100ms)`
    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_us = rand::rng().random_range(0..RETRY_JITTER_MS * 1000);
        self.policy.backoff(attempt) + Duration::from_micros(jitter_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::{CircuitBreakerConfig, CircuitState, FailureKind, ManualClock, RateLimitConfig};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(code: u16) -> FetchError {
        FetchError::HttpStatus {
            code,
            status_text: String::new(),
            url: "http://stub/".into(),
            provider: None,
        }
    }

    fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "http://stub/".into(),
            provider: None,
        }
    }

    fn network() -> FetchError {
        FetchError::Network {
            url: "http://stub/".into(),
            provider: None,
            message: "connection refused".into(),
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            ..RetryPolicy::default()
        }
    }

    fn breaker(clock: Arc<ManualClock>, threshold: u32) -> Arc<CircuitBreaker> {
        let cfg = CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout_ms: 10_000,
            half_open_requests: 1,
        };
        Arc::new(CircuitBreaker::new(cfg, clock).unwrap())
    }

    #[test]
    fn always_retryable_failure_makes_max_retries_plus_one_attempts() {
        let clock = Arc::new(ManualClock::new());
        let ex = RetryingExecutor::new(policy(3), clock.clone()).unwrap();

        let mut calls = 0;
        let r: Result<(), _> = ex.execute(|| {
            calls += 1;
            Err(http(503))
        });

        assert_eq!(r.unwrap_err().kind(), FailureKind::HttpStatus(503));
        assert_eq!(calls, 4);
    }

    #[test]
    fn delays_follow_exponential_backoff_with_jitter() {
        let clock = Arc::new(ManualClock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let p = RetryPolicy {
            max_retries: 6,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        };
        let ex = RetryingExecutor::new(p, clock.clone())
            .unwrap()
            .with_retry_observer(Box::new(move |n: u32, _e: &FetchError, d: Duration| {
                sink.lock().unwrap().push((n, d))
            }));

        // время между попытками меряем по ManualClock
        let mut stamps = Vec::new();
        let _ = ex.execute::<()>(|| {
            stamps.push(clock.now_ms());
            Err(timeout())
        });

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 6);
        let expected_base = [100u64, 200, 400, 800, 1000, 1000];
        for (k, (n, d)) in seen.iter().enumerate() {
            assert_eq!(*n, k as u32 + 1);
            let ms = d.as_millis() as u64;
            assert!(
                ms >= expected_base[k] && ms < expected_base[k] + RETRY_JITTER_MS,
                "retry {k}: {ms}ms not in [{}, {})",
                expected_base[k],
                expected_base[k] + RETRY_JITTER_MS
            );
            let gap = stamps[k + 1] - stamps[k];
            assert!(gap >= expected_base[k] && gap < expected_base[k] + RETRY_JITTER_MS);
        }
    }

    #[test]
    fn non_retryable_status_fails_immediately() {
        let clock = Arc::new(ManualClock::new());
        let ex = RetryingExecutor::new(policy(3), clock.clone()).unwrap();

        let mut calls = 0;
        let r: Result<(), _> = ex.execute(|| {
            calls += 1;
            Err(http(404))
        });
        assert!(matches!(r, Err(FetchError::HttpStatus { code: 404, .. })));
        assert_eq!(calls, 1);
        assert_eq!(clock.now_ms(), 0, "no backoff sleep expected");
    }

    #[test]
    fn policy_flags_disable_timeout_and_network_retries() {
        let clock = Arc::new(ManualClock::new());
        let p = RetryPolicy {
            retry_on_timeout: false,
            retry_on_network_error: false,
            ..policy(3)
        };
        let ex = RetryingExecutor::new(p, clock).unwrap();

        assert_eq!(ex.classify(&timeout(), 0), Outcome::Fail);
        assert_eq!(ex.classify(&network(), 0), Outcome::Fail);
        assert!(matches!(ex.classify(&http(429), 0), Outcome::Retry(_)));
        assert_eq!(ex.classify(&http(429), 3), Outcome::Fail);
    }

    #[test]
    fn success_after_retries_is_one_breaker_success() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone(), 2);
        let ex = RetryingExecutor::new(policy(3), clock.clone())
            .unwrap()
            .with_breaker(b.clone());

        let calls = AtomicU32::new(0);
        let r = ex.execute(|| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(network())
            } else {
                Ok("payload")
            }
        });

        assert_eq!(r.unwrap(), "payload");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // две упавшие попытки не должны были открыть breaker (threshold=2)
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats().consecutive_failures, 0);
    }

    #[test]
    fn exhausted_request_counts_as_single_breaker_failure() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone(), 2);
        let ex = RetryingExecutor::new(policy(3), clock.clone())
            .unwrap()
            .with_breaker(b.clone());

        let _ = ex.execute::<()>(|| Err(http(500)));
        assert_eq!(b.stats().consecutive_failures, 1);
        assert_eq!(b.state(), CircuitState::Closed);

        let _ = ex.execute::<()>(|| Err(http(500)));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn open_breaker_fails_fast_without_attempt_or_token() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone(), 1);
        let limiter = Arc::new(
            TokenBucket::new(&RateLimitConfig::per_second(1.0), clock.clone()).unwrap(),
        );
        let ex = RetryingExecutor::new(policy(3), clock.clone())
            .unwrap()
            .with_breaker(b.clone())
            .with_limiter(limiter.clone());

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        clock.advance_ms(5);

        let mut called = false;
        let r: Result<(), _> = ex.execute(|| {
            called = true;
            Ok(())
        });
        assert!(matches!(r, Err(FetchError::CircuitOpen)));
        assert!(!called);
        assert_eq!(limiter.available_tokens(), 1.0);
        // отказ без попытки не считается ошибкой breaker'а
        assert_eq!(b.stats().last_failure_ms, Some(0));
    }

    #[test]
    fn limiter_token_is_taken_once_per_logical_request() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(
            TokenBucket::new(
                &RateLimitConfig {
                    requests_per_second: 1.0,
                    max_burst: Some(2.0),
                },
                clock.clone(),
            )
            .unwrap(),
        );
        let p = RetryPolicy {
            base_delay_ms: 0,
            ..policy(2)
        };
        let ex = RetryingExecutor::new(p, clock.clone())
            .unwrap()
            .with_limiter(limiter.clone());

        let _ = ex.execute::<()>(|| Err(http(502)));
        // 3 попытки, но списан один токен (+ пополнение за время джиттера)
        assert!(limiter.available_tokens() >= 1.0);
    }

    #[test]
    fn limiter_blocks_until_token_available() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(
            TokenBucket::new(&RateLimitConfig::per_second(5.0), clock.clone()).unwrap(),
        );
        let ex = RetryingExecutor::new(policy(0), clock.clone())
            .unwrap()
            .with_limiter(limiter);

        for _ in 0..5 {
            ex.execute(|| Ok::<_, FetchError>(())).unwrap();
        }
        assert_eq!(clock.now_ms(), 0);

        ex.execute(|| Ok::<_, FetchError>(())).unwrap();
        assert_eq!(clock.now_ms(), 200);
    }
}
