//! # feed-core
//!
//! Базовые блоки клиента котировок: всё, что не делает I/O.
//!
//! Этот крейт содержит:
//!
//! - [`wire`] - декодер текстового протокола (`v_key="f1~f2~..."`, GBK)
//! - [`limiter`] - token bucket
//! - [`breaker`] - circuit breaker с ленивыми переходами по времени
//! - [`cache`] - кэш с TTL и LRU-вытеснением
//! - [`clock`] - источник времени (реальный и ручной для тестов)
//! - [`codes`] - чтение и нормализация списков кодов бумаг
//! - [`config`] - политики и настройки с дефолтами
//! - [`types`] - доменные типы
//! - [`error`] - типы ошибок
//!
//! ## Быстрый пример: разбор ответа
//!
//! ```rust
//! use feed_core::wire::parse_response;
//!
//! let records = parse_response(r#"v_a="1~2~3";v_b="x~y""#);
//! assert_eq!(records[0].key, "a");
//! assert_eq!(records[0].fields, vec!["1", "2", "3"]);
//! assert_eq!(records[1].key, "b");
//! ```
//!
//! ## Пример: лимитер на ручных часах
//!
//! ```rust
//! use std::sync::Arc;
//! use feed_core::{ManualClock, RateLimitConfig, TokenBucket};
//!
//! let clock = Arc::new(ManualClock::new());
//! let bucket = TokenBucket::new(&RateLimitConfig::per_second(5.0), clock.clone()).unwrap();
//!
//! for _ in 0..5 {
//!     assert!(bucket.try_acquire());
//! }
//! assert!(!bucket.try_acquire());
//!
//! clock.advance_ms(200);
//! assert!(bucket.try_acquire());
//! ```
//!
//! ## Дизайн
//!
//! Всё состояние (лимитер, breaker, кэш) живёт под `Mutex` и меняется только
//! при обращении: фоновых потоков и таймеров нет. Время берётся из [`Clock`],
//! поэтому любые временные свойства проверяются сдвигом [`ManualClock`].

#![forbid(unsafe_code)]

/// Circuit breaker
pub mod breaker;

/// Кэш с TTL + LRU
pub mod cache;

/// Источник времени
pub mod clock;

/// Чтение/нормализация списка кодов из текста и файлов.
pub mod codes;

/// Настройки и политики
pub mod config;

/// Ошибки `feed-core`.
pub mod error;

/// Token bucket
pub mod limiter;

/// Доменные типы
pub mod types;

/// Декодер wire-протокола
pub mod wire;

// --- Re-exports (публичный фасад API) ---

pub use crate::breaker::{BreakerStats, CircuitBreaker, CircuitState, StateObserver};
pub use crate::cache::{ExpiringLruCache, cache_key};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{CacheConfig, CircuitBreakerConfig, RateLimitConfig, RetryPolicy};
pub use crate::error::{ConfigError, FailureKind, FetchError};
pub use crate::limiter::TokenBucket;
pub use crate::types::Record;
