//! # feed-client
//!
//! Устойчивый клиент котировок поверх блоков из `feed-core`.
//!
//! - [`executor`] - один логический запрос: breaker, лимитер, ретраи с backoff
//! - [`runner`] - пачки запросов с ограничением параллелизма и прогрессом
//! - [`transport`] - блокирующий HTTP GET с дедлайном и классификацией ошибок
//! - [`user_agent`] - ротация User-Agent
//! - [`client`] - [`QuoteClient`], собирающий всё вместе
//! - [`config`] - настройки клиента и загрузка из TOML
//!
//! ## Пример
//!
//! ```no_run
//! use feed_client::{ClientConfig, QuoteClient};
//!
//! let client = QuoteClient::new(ClientConfig::default())?;
//! let codes = vec!["sh600000".to_string(), "sz000001".to_string()];
//! for r in client.fetch_quotes(&codes)? {
//!     println!("{} {}", r.key, r.field(1));
//! }
//! # Ok::<(), feed_client::ClientError>(())
//! ```
//!
//! Модель синхронная: ожидание токена, сеть и паузы между ретраями блокируют
//! вызывающий поток. Параллелизм есть только в [`runner`].

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod runner;
pub mod transport;
pub mod user_agent;

#[cfg(test)]
mod stub;

pub use crate::client::{Hooks, QuoteClient};
pub use crate::config::{CODE_LIST_URL, ClientConfig, DEFAULT_BASE_URL};
pub use crate::error::ClientError;
pub use crate::executor::{RetryObserver, RetryingExecutor};
pub use crate::runner::{BoundedConcurrencyRunner, TaskResult};
pub use crate::user_agent::RotatingPool;
