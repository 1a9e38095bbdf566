//! Фасад клиента: лимитер, breaker, ретраи, транспорт и кэш в одном месте.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use feed_core::codes::chunk_codes;
use feed_core::{
    CircuitBreaker, CircuitState, Clock, ExpiringLruCache, Record, StateObserver, SystemClock,
    TokenBucket, cache_key, wire,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::executor::{RetryObserver, RetryingExecutor};
use crate::runner::{BoundedConcurrencyRunner, Progress, into_input_order};
use crate::transport::HttpTransport;
use crate::user_agent::RotatingPool;

/// Незакодированные символы как у `encodeURIComponent`
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Необязательные наблюдатели
#[derive(Default)]
pub struct Hooks {
    pub on_retry: Option<RetryObserver>,
    pub on_state_change: Option<StateObserver>,
}

pub struct QuoteClient {
    config: ClientConfig,
    /// Без завершающего `/`
    base_url: String,
    headers: HeaderMap,
    transport: HttpTransport,
    executor: RetryingExecutor,
    breaker: Option<Arc<CircuitBreaker>>,
    user_agents: Option<RotatingPool>,
    codes_cache: ExpiringLruCache<Vec<String>>,
}

impl fmt::Debug for QuoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteClient")
            .field("base_url", &self.base_url)
            .field("executor", &self.executor)
            .field("rotate_user_agent", &self.user_agents.is_some())
            .finish()
    }
}

impl QuoteClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, Arc::new(SystemClock::new()), Hooks::default())
    }

    /// Полная сборка: свой источник времени и наблюдатели
    pub fn build(config: ClientConfig, clock: Arc<dyn Clock>, hooks: Hooks) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let headers = config.header_map()?;
        let transport = HttpTransport::new(config.timeout())?;

        let mut executor = RetryingExecutor::new(config.retry.clone(), clock.clone())?;

        if let Some(rl) = &config.rate_limit {
            let bucket = TokenBucket::new(rl, clock.clone())?;
            executor = executor.with_limiter(Arc::new(bucket));
        }

        let breaker = match &config.circuit_breaker {
            Some(cb) => {
                let mut b = CircuitBreaker::new(cb.clone(), clock.clone())?;
                if let Some(obs) = hooks.on_state_change {
                    b = b.with_observer(obs);
                }
                let b = Arc::new(b);
                executor = executor.with_breaker(b.clone());
                Some(b)
            }
            None => None,
        };

        if let Some(obs) = hooks.on_retry {
            executor = executor.with_retry_observer(obs);
        }

        let user_agents = config.rotate_user_agent.then(RotatingPool::browsers);
        let codes_cache = ExpiringLruCache::new(&config.cache, clock)?;

        debug!("quote client ready: base_url={base_url}, timeout={:?}", config.timeout());

        Ok(Self {
            config,
            base_url,
            headers,
            transport,
            executor,
            breaker,
            user_agents,
            codes_cache,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Тело ответа по произвольному URL через весь конвейер
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let headers = self.request_headers();
        let body = self
            .executor
            .execute(|| self.transport.get(url, headers.clone()))?;
        Ok(body)
    }

    /// Тело как UTF-8 (битые последовательности заменяются)
    pub fn get_text(&self, url: &str) -> Result<String> {
        let body = self.get_bytes(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// `{base_url}/?q={params}` -> записи протокола
    pub fn fetch_raw(&self, params: &str) -> Result<Vec<Record>> {
        let url = self.quote_url(params);
        let body = self.get_bytes(&url)?;
        Ok(wire::decode(&body))
    }

    /// Котировки по списку кодов одним запросом.
    ///
    /// Пустой список -> пустой ответ без запроса. Пустые записи (апстрим так
    /// отвечает на неизвестный код) отбрасываются.
    pub fn fetch_quotes(&self, codes: &[String]) -> Result<Vec<Record>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.fetch_raw(&codes.join(","))?;
        Ok(records.into_iter().filter(|r| !r.is_empty()).collect())
    }

    /// Большой список: пачки по `batch_size`, не больше `concurrency`
    /// запросов одновременно. Записи возвращаются в порядке пачек.
    ///
    /// Если хоть одна пачка упала, возвращается ошибка первой из них.
    pub fn fetch_quotes_batched(
        &self,
        codes: &[String],
        batch_size: usize,
        concurrency: usize,
        on_progress: Option<Progress<'_>>,
    ) -> Result<Vec<Record>> {
        let chunks = chunk_codes(codes, batch_size);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let tasks: Vec<_> = chunks
            .into_iter()
            .map(|chunk| move || self.fetch_quotes(&chunk))
            .collect();

        let report = |done: usize, total: usize| {
            info!("batch {done}/{total} done");
            if let Some(cb) = on_progress {
                cb(done, total);
            }
        };

        let results = BoundedConcurrencyRunner::new(concurrency).run(tasks, Some(&report));

        let batches = into_input_order(results)
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(batches.into_iter().flatten().collect())
    }

    /// JSON-массив кодов по `url`, кэшируется
    pub fn fetch_code_list(&self, url: &str) -> Result<Vec<String>> {
        let key = cache_key([Some("codes"), Some(url)]);
        self.codes_cache.get_or_try_compute(
            &key,
            || {
                let text = self.get_text(url)?;
                serde_json::from_str::<Vec<String>>(&text).map_err(ClientError::CodeList)
            },
            None,
        )
    }

    /// Без breaker'а всегда `Closed`
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker
            .as_ref()
            .map_or(CircuitState::Closed, |b| b.state())
    }

    pub fn reset_circuit(&self) {
        if let Some(b) = &self.breaker {
            b.reset();
        }
    }

    fn quote_url(&self, params: &str) -> String {
        format!(
            "{}/?q={}",
            self.base_url,
            utf8_percent_encode(params, QUERY_COMPONENT)
        )
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(ua) = self.user_agents.as_ref().and_then(|p| p.next()) {
            if let Ok(v) = HeaderValue::from_str(ua) {
                headers.insert(USER_AGENT, v);
            }
        }
        headers
    }
}
