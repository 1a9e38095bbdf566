use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::debug;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use feed_core::{CacheConfig, CircuitBreakerConfig, ConfigError, RateLimitConfig, RetryPolicy};

use crate::error::{ClientError, Result};

/// Апстрим котировок по умолчанию
pub const DEFAULT_BASE_URL: &str = "https://qt.gtimg.cn";

/// JSON-массив всех кодов A-акций
pub const CODE_LIST_URL: &str = "https://assets.linkdiary.cn/shares/ashare-code.json";

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_CONCURRENCY: usize = 7;

/// Настройки клиента. Все поля необязательны, в TOML можно задать любую часть.
///
/// Лимитер и breaker включаются только если заданы их секции.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Статические заголовки каждого запроса
    pub headers: BTreeMap<String, String>,
    /// Ставится, только если в `headers` нет своего User-Agent
    pub user_agent: Option<String>,
    pub rotate_user_agent: bool,
    pub retry: RetryPolicy,
    pub rate_limit: Option<RateLimitConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub cache: CacheConfig,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: BTreeMap::new(),
            user_agent: None,
            rotate_user_agent: false,
            retry: RetryPolicy::default(),
            rate_limit: None,
            circuit_breaker: None,
            cache: CacheConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ClientConfig {
    /// Прочитать TOML-файл; отсутствующие поля берутся из `Default`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ClientError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: ClientConfig = toml::from_str(&raw).map_err(|source| ClientError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config from {path:?}");
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.retry.validate()?;
        if let Some(rl) = &self.rate_limit {
            rl.validate()?;
        }
        if let Some(cb) = &self.circuit_breaker {
            cb.validate()?;
        }
        self.cache.validate()?;
        self.header_map()?;
        Ok(())
    }

    pub(crate) fn parsed_base_url(&self) -> std::result::Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidBaseUrl(format!(
                "{}: unsupported scheme {other:?}",
                self.base_url
            ))),
        }
    }

    /// Статические заголовки + `user_agent`, если свой User-Agent не задан
    pub(crate) fn header_map(&self) -> std::result::Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let n = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let v = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.insert(n, v);
        }

        // HeaderMap сравнивает имена без учёта регистра
        if let Some(ua) = &self.user_agent {
            if !map.contains_key(USER_AGENT) {
                let v = HeaderValue::from_str(ua).map_err(|e| ConfigError::InvalidHeader {
                    name: USER_AGENT.to_string(),
                    reason: e.to_string(),
                })?;
                map.insert(USER_AGENT, v);
            }
        }
        Ok(map)
    }
}
