use std::path::PathBuf;

use thiserror::Error;

use feed_core::{ConfigError, FetchError};

/// Ошибки фасада клиента
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client config: {0}")]
    Config(#[from] ConfigError),

    /// Не удалось собрать HTTP-клиент
    #[error("failed to build http client")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Список кодов пришёл не JSON-массивом строк
    #[error("malformed code list")]
    CodeList(#[source] serde_json::Error),

    #[error("failed to read config file: {path:?}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path:?}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ClientError {
    /// Причина отказа запроса, если это ошибка запроса
    pub fn fetch(&self) -> Option<&FetchError> {
        match self {
            ClientError::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
