use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FailureKind};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Верхняя граница случайной добавки к задержке ретрая
pub const RETRY_JITTER_MS: u64 = 100;

/// Политика повторов. Неизменяема после создания клиента.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: BTreeSet<u16>,
    pub retry_on_network_error: bool,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            retry_on_network_error: true,
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::BadBackoffMultiplier(self.backoff_multiplier));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::BaseDelayAboveMax {
                base: self.base_delay_ms,
                max: self.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Можно ли повторить попытку номер `attempt` (с нуля), упавшую с `kind`.
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match kind {
            FailureKind::Timeout => self.retry_on_timeout,
            FailureKind::NetworkError => self.retry_on_network_error,
            FailureKind::HttpStatus(code) => self.retryable_status_codes.contains(&code),
            FailureKind::CircuitOpen => false,
        }
    }

    /// Экспоненциальная задержка без джиттера:
    /// `min(base * multiplier^attempt, max)`.
    ///
    /// Дробные миллисекунды округляются вверх до микросекунды, задержка
    /// не бывает короче расчётной.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_micros((capped * 1000.0).ceil() as u64)
    }
}

/// Настройки token bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    /// Ёмкость ведра; по умолчанию равна `requests_per_second`
    pub max_burst: Option<f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            max_burst: None,
        }
    }
}

impl RateLimitConfig {
    pub fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            max_burst: None,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.max_burst.unwrap_or(self.requests_per_second)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.requests_per_second > 0.0) {
            return Err(ConfigError::NonPositiveRate(self.requests_per_second));
        }
        if !(self.capacity() >= 1.0) {
            return Err(ConfigError::BurstTooSmall(self.capacity()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_requests: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.half_open_requests == 0 {
            return Err(ConfigError::ZeroHalfOpenQuota);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 0 = записи не истекают
    pub default_ttl_ms: u64,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 0,
            max_size: 1000,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        Ok(())
    }
}
