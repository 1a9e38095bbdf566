use std::path::{Path, PathBuf};
use thiserror::Error;

use feed_client::{ClientError, QuoteClient};
use feed_core::codes::{parse_codes_csv, read_codes_from_path};

use crate::cli::Args;

#[derive(Debug, Error)]
pub(crate) enum CodesError {
    /// ArgGroup в clap должен это исключать
    #[error("codes source is missing: provide --codes, --codes-file or --code-list-url")]
    MissingSource,

    #[error("codes list is empty (file: {path:?})")]
    EmptyFromFile { path: PathBuf },

    #[error("codes list is empty (--codes value: {raw:?})")]
    EmptyFromArg { raw: String },

    #[error("codes list is empty (url: {url})")]
    EmptyFromUrl { url: String },

    #[error("failed to read codes file: {path:?}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch code list: {url}")]
    FetchList {
        url: String,
        #[source]
        source: ClientError,
    },
}

pub(crate) type Result<T> = std::result::Result<T, CodesError>;

/// Загружает коды из источника, выбранного в CLI:
/// - `--codes-file`    -> feed_core::codes::read_codes_from_path
/// - `--codes`         -> feed_core::codes::parse_codes_csv
/// - `--code-list-url` -> QuoteClient::fetch_code_list
pub(crate) fn load_codes(args: &Args, client: &QuoteClient) -> Result<Vec<String>> {
    if let Some(path) = &args.codes_file {
        load_from_file(path)
    } else if let Some(raw) = &args.codes {
        load_from_arg(raw)
    } else if let Some(url) = &args.code_list_url {
        load_from_url(client, url)
    } else {
        Err(CodesError::MissingSource)
    }
}

fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref().to_path_buf();

    let codes = read_codes_from_path(&path).map_err(|e| CodesError::ReadFile {
        path: path.clone(),
        source: e,
    })?;

    if codes.is_empty() {
        return Err(CodesError::EmptyFromFile { path });
    }
    Ok(codes)
}

fn load_from_arg(raw: &str) -> Result<Vec<String>> {
    let codes = parse_codes_csv(raw);

    if codes.is_empty() {
        return Err(CodesError::EmptyFromArg {
            raw: raw.to_string(),
        });
    }
    Ok(codes)
}

fn load_from_url(client: &QuoteClient, url: &str) -> Result<Vec<String>> {
    let list = client
        .fetch_code_list(url)
        .map_err(|source| CodesError::FetchList {
            url: url.to_string(),
            source,
        })?;

    // в JSON бывают пустые строки и дубли, приводим к тому же виду, что и --codes
    let codes = parse_codes_csv(&list.join(","));
    if codes.is_empty() {
        return Err(CodesError::EmptyFromUrl {
            url: url.to_string(),
        });
    }
    Ok(codes)
}
