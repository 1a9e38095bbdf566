//! Circuit breaker.
//!
//! ```text
//! Closed   --[failures >= threshold]-------> Open
//! Open     --[reset_timeout since failure]-> HalfOpen   (лениво, при запросе состояния)
//! HalfOpen --[successes >= quota]----------> Closed
//! HalfOpen --[любая ошибка]----------------> Open
//! ```
//!
//! Таймеров нет: переход Open -> HalfOpen проверяется при каждом
//! `state()` / `can_request()` / `record_*`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;
use crate::error::{ConfigError, FetchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Наблюдатель смены состояния `(from, to)`
pub type StateObserver = Box<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Снимок внутренних счётчиков
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_ms: Option<u64>,
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_ms: Option<u64>,
    half_open_successes: u32,
}

type Transition = (CircuitState, CircuitState);

impl Inner {
    fn transition_to(&mut self, to: CircuitState, out: &mut Vec<Transition>) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;

        // счётчики, относящиеся к новому состоянию, начинаются с нуля
        match to {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.half_open_successes = 0;
            }
            CircuitState::HalfOpen => self.half_open_successes = 0,
            CircuitState::Open => {}
        }

        out.push((from, to));
    }
}

pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    on_state_change: Option<StateObserver>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cfg", &self.cfg)
            .field("inner", &self.inner)
            .field("has_observer", &self.on_state_change.is_some())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_ms: None,
                half_open_successes: 0,
            }),
            clock,
            on_state_change: None,
        })
    }

    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.on_state_change = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_timeout(&self, inner: &mut Inner, out: &mut Vec<Transition>) {
        if inner.state != CircuitState::Open {
            return;
        }
        let since = inner.last_failure_ms.unwrap_or(0);
        let elapsed = self.clock.now_ms().saturating_sub(since);
        if elapsed >= self.cfg.reset_timeout_ms {
            inner.transition_to(CircuitState::HalfOpen, out);
        }
    }

    // наблюдатель вызывается уже без блокировки
    fn notify(&self, transitions: Vec<Transition>) {
        for (from, to) in transitions {
            match to {
                CircuitState::Open => warn!("circuit breaker {from} -> {to}"),
                _ => info!("circuit breaker {from} -> {to}"),
            }
            if let Some(cb) = &self.on_state_change {
                cb(from, to);
            }
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner, &mut Vec<Transition>) -> R) -> R {
        let mut transitions = Vec::new();
        let r = {
            let mut inner = self.lock();
            self.check_timeout(&mut inner, &mut transitions);
            f(&mut inner, &mut transitions)
        };
        self.notify(transitions);
        r
    }

    pub fn state(&self) -> CircuitState {
        self.with_inner(|inner, _| inner.state)
    }

    pub fn can_request(&self) -> bool {
        let quota = self.cfg.half_open_requests;
        self.with_inner(|inner, _| match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => inner.half_open_successes < quota,
        })
    }

    pub fn record_success(&self) {
        let quota = self.cfg.half_open_requests;
        self.with_inner(|inner, out| match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= quota {
                    inner.transition_to(CircuitState::Closed, out);
                }
            }
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::Open => {}
        });
    }

    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let threshold = self.cfg.failure_threshold;
        self.with_inner(|inner, out| {
            inner.last_failure_ms = Some(now);
            match inner.state {
                CircuitState::HalfOpen => inner.transition_to(CircuitState::Open, out),
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= threshold {
                        inner.transition_to(CircuitState::Open, out);
                    }
                }
                CircuitState::Open => {}
            }
        });
    }

    /// Принудительно закрыть breaker (ручной/админский путь)
    pub fn reset(&self) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            inner.transition_to(CircuitState::Closed, &mut transitions);
            inner.consecutive_failures = 0;
            inner.half_open_successes = 0;
            inner.last_failure_ms = None;
        }
        self.notify(transitions);
    }

    pub fn stats(&self) -> BreakerStats {
        self.with_inner(|inner, _| BreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_ms: inner.last_failure_ms,
            half_open_successes: inner.half_open_successes,
        })
    }

    /// Выполнить `f` под защитой breaker'а: отказ без вызова, если он открыт,
    /// и запись результата после.
    pub fn call<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<FetchError>,
    {
        if !self.can_request() {
            return Err(FetchError::CircuitOpen.into());
        }
        match f() {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}
