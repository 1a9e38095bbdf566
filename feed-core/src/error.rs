use std::fmt;

use thiserror::Error;

/// Закрытый набор причин отказа одного логического запроса.
///
/// Ретраи и breaker матчатся только по нему, а не по конкретному типу ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Ошибка уровня соединения (DNS, connection refused, обрыв)
    NetworkError,
    /// Истёк дедлайн запроса
    Timeout,
    /// Ответ с не-2xx статусом
    HttpStatus(u16),
    /// Breaker отклонил запрос без попытки
    CircuitOpen,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NetworkError => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::CircuitOpen => write!(f, "circuit open"),
        }
    }
}

/// Терминальная ошибка запроса, которую видит вызывающий код
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Сетевая ошибка
    #[error("network error: {message}, url: {url}{}", provider_suffix(.provider))]
    Network {
        url: String,
        provider: Option<String>,
        message: String,
    },

    /// Превышен таймаут
    #[error("request timed out, url: {url}{}", provider_suffix(.provider))]
    Timeout { url: String, provider: Option<String> },

    /// Не-2xx ответ
    #[error(
        "HTTP error! status: {code}{}, url: {url}{}",
        status_text_suffix(.status_text),
        provider_suffix(.provider)
    )]
    HttpStatus {
        code: u16,
        status_text: String,
        url: String,
        provider: Option<String>,
    },

    /// Запрос отклонён открытым breaker'ом
    #[error("circuit breaker is OPEN, request rejected")]
    CircuitOpen,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network { .. } => FailureKind::NetworkError,
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::HttpStatus { code, .. } => FailureKind::HttpStatus(*code),
            FetchError::CircuitOpen => FailureKind::CircuitOpen,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::HttpStatus { url, .. } => Some(url),
            FetchError::CircuitOpen => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            FetchError::Network { provider, .. }
            | FetchError::Timeout { provider, .. }
            | FetchError::HttpStatus { provider, .. } => provider.as_deref(),
            FetchError::CircuitOpen => None,
        }
    }
}

fn provider_suffix(provider: &Option<String>) -> String {
    match provider {
        Some(p) => format!(", provider: {p}"),
        None => String::new(),
    }
}

fn status_text_suffix(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" {text}")
    }
}

/// Ошибки валидации настроек
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("requests_per_second must be > 0 (got: {0})")]
    NonPositiveRate(f64),

    #[error("max_burst must be >= 1 (got: {0})")]
    BurstTooSmall(f64),

    #[error("failure_threshold must be >= 1")]
    ZeroFailureThreshold,

    #[error("half_open_requests must be >= 1")]
    ZeroHalfOpenQuota,

    #[error("backoff_multiplier must be >= 1 (got: {0})")]
    BadBackoffMultiplier(f64),

    #[error("base_delay_ms ({base}) must not exceed max_delay_ms ({max})")]
    BaseDelayAboveMax { base: u64, max: u64 },

    #[error("cache max_size must be >= 1")]
    ZeroCacheCapacity,

    #[error("batch_size must be >= 1")]
    ZeroBatchSize,

    #[error("invalid base_url: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}
