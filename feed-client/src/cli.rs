use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};

use feed_client::ClientConfig;
use feed_core::RateLimitConfig;

/// Feed Client - котировки с qt.gtimg.cn-подобных апстримов.
///
/// Коды берутся из строки, файла или JSON-списка по URL, запрашиваются
/// пачками и печатаются по одной записи на строку.
#[derive(Parser, Debug, Clone)]
#[command(name = "feed-client", version, about)]
#[command(
    group(
        ArgGroup::new("codes_source")
            .required(true)
            .args(["codes_file", "codes", "code_list_url"])
    )
)]
pub(crate) struct Args {
    /// Коды строкой, например: "sh600000,sz000001"
    #[arg(long)]
    pub(crate) codes: Option<String>,

    /// Файл кодов (по одному на строку, `#` - комментарий)
    #[arg(long)]
    pub(crate) codes_file: Option<PathBuf>,

    /// URL JSON-массива кодов (например, полный список A-акций)
    #[arg(long)]
    pub(crate) code_list_url: Option<String>,

    /// TOML с настройками клиента; флаги ниже его перекрывают
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    #[arg(long)]
    pub(crate) base_url: Option<String>,

    /// Дедлайн одного запроса, мс
    #[arg(long)]
    pub(crate) timeout_ms: Option<u64>,

    /// Кодов в одном запросе
    #[arg(long)]
    pub(crate) batch_size: Option<usize>,

    /// Одновременных запросов при пакетной загрузке
    #[arg(long)]
    pub(crate) concurrency: Option<usize>,

    /// Включить лимитер: запросов в секунду
    #[arg(long)]
    pub(crate) rps: Option<f64>,

    /// Менять User-Agent на каждом запросе
    #[arg(long)]
    pub(crate) rotate_user_agent: bool,

    /// Печатать записи как JSON (по объекту на строку)
    #[arg(long)]
    pub(crate) json: bool,

    /// Повторять загрузку с этим интервалом до Ctrl+C
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) interval_ms: Option<u64>,
}

impl Args {
    /// Проверки, которые clap сам не делает
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(path) = &self.codes_file {
            let md = std::fs::metadata(path)
                .with_context(|| format!("codes file not found: {:?}", path))?;
            if !md.is_file() {
                bail!("--codes-file must point to a file: {:?}", path);
            }
        }
        if let Some(path) = &self.config {
            if !path.is_file() {
                bail!("--config must point to a file: {:?}", path);
            }
        }
        if let Some(url) = &self.code_list_url {
            if url.trim().is_empty() {
                bail!("--code-list-url is empty");
            }
        }
        if self.batch_size == Some(0) {
            bail!("--batch-size must be >= 1");
        }
        Ok(())
    }

    /// Конфиг из файла (или дефолтный) + флаги поверх
    pub(crate) fn client_config(&self) -> Result<ClientConfig> {
        let mut cfg = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        if let Some(ms) = self.timeout_ms {
            cfg.timeout_ms = ms;
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(rps) = self.rps {
            cfg.rate_limit = Some(RateLimitConfig::per_second(rps));
        }
        if self.rotate_user_agent {
            cfg.rotate_user_agent = true;
        }

        cfg.validate().context("invalid client configuration")?;
        Ok(cfg)
    }
}
