//! Точка входа `feed-client`.
//!
//! Жизненный цикл:
//! - парсинг CLI, сборка конфига (файл + флаги)
//! - загрузка списка кодов
//! - пакетная загрузка котировок и печать записей
//! - с `--interval-ms` повтор до `Ctrl+C` (остановка только между циклами)

mod cli;
mod codes;

use std::io::{self, Write};
use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, warn};

use feed_client::QuoteClient;
use feed_core::Record;

// шаг ожидания между циклами, чтобы Ctrl+C не ждал весь интервал
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/debug
    env_logger::init();

    let args = cli::Args::parse();
    args.validate()?;

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    let cfg = args.client_config()?;
    let (batch_size, concurrency) = (cfg.batch_size, cfg.concurrency);
    let client = QuoteClient::new(cfg)?;

    let codes = codes::load_codes(&args, &client)?;

    info!(
        "Starting feed-client: base_url={}, codes={}, batch_size={}, concurrency={}",
        client.config().base_url,
        codes.len(),
        batch_size,
        concurrency
    );

    loop {
        let started = Instant::now();
        match client.fetch_quotes_batched(&codes, batch_size, concurrency, None) {
            Ok(records) => {
                print_records(&records, args.json)?;
                info!("fetched {} record(s) in {:?}", records.len(), started.elapsed());
            }
            // одиночный запуск: ошибка = код выхода; в цикле просто ждём следующий
            Err(e) if args.interval_ms.is_some() => {
                warn!("fetch failed: {e} (circuit: {})", client.circuit_state());
            }
            Err(e) => return Err(e.into()),
        }

        let Some(interval) = args.interval_ms.map(Duration::from_millis) else {
            break;
        };
        if !wait_or_shutdown(interval, &shutdown) {
            break;
        }
    }

    Ok(())
}

/// `false`, если за время ожидания пришёл Ctrl+C
fn wait_or_shutdown(interval: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}

fn print_records(records: &[Record], json: bool) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    for r in records {
        if json {
            serde_json::to_writer(&mut out, r)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{r}")?;
        }
    }
    out.flush()?;
    Ok(())
}
