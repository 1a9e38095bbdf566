use std::time::Duration;

use log::debug;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;

use feed_core::FetchError;

/// Известные апстримы по хосту
const PROVIDERS: [(&str, &str); 3] = [
    ("eastmoney.com", "eastmoney"),
    ("gtimg.cn", "tencent"),
    ("linkdiary.cn", "linkdiary"),
];

/// Определить апстрим по хосту URL (для текста ошибок)
pub fn infer_provider(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    PROVIDERS
        .iter()
        .find(|(suffix, _)| host.contains(suffix))
        .map(|(_, name)| *name)
}

/// Один HTTP GET с жёстким дедлайном. Ретраев здесь нет.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Тело ответа целиком; не-2xx, таймаут и сетевые сбои
    /// классифицируются в [`FetchError`].
    pub fn get(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>, FetchError> {
        let provider = infer_provider(url).map(str::to_string);
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .map_err(|e| classify(e, url, provider.clone()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                url: url.to_string(),
                provider,
            });
        }

        let body = resp.bytes().map_err(|e| classify(e, url, provider))?;
        Ok(body.to_vec())
    }
}

fn classify(err: reqwest::Error, url: &str, provider: Option<String>) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            provider,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            provider,
            message: root_cause(&err),
        }
    }
}

// reqwest прячет реальную причину (connection refused, dns) в source()
fn root_cause(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    let mut cur: Option<&dyn std::error::Error> = std::error::Error::source(err);
    while let Some(e) = cur {
        msg = format!("{msg}: {e}");
        cur = std::error::Error::source(e);
    }
    msg
}
