use std::{
    env,
    io::{self, BufWriter, Write},
    process,
    sync::Arc,
};

use config::ConfigError;
use core_types::config::{IngestConfig, SourceConfig};
use ingest_engine::{Engine, EngineError, HourGateEngine, WorkerReport};
use thiserror::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("hourgate failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = IngestConfig::load()?;
    let sources = sources_from_args(&config);
    if sources.is_empty() {
        return Err(AppError::Usage);
    }

    let engine = Arc::new(HourGateEngine::new(&config, sources));
    let consumer = engine.take_consumer().ok_or(AppError::ConsumerTaken)?;
    {
        let engine = Arc::clone(&engine);
        ctrlc::set_handler(move || {
            eprintln!("Shutdown signal received; stopping ingest workers...");
            engine.cancel();
        })?;
    }

    engine.start()?;
    log_engine_health(engine.as_ref());
    eprintln!(
        "Ingesting {} file(s) with {} byte windows; press Ctrl+C to stop.",
        engine.source_count(),
        engine.window_size()
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut written = 0u64;
    let mut write_result = Ok(());
    for message in consumer {
        write_result = writeln!(
            out,
            "{}\t{}\t{}",
            message.symbol,
            message.bucket,
            message.payload_lossy()
        );
        if write_result.is_err() {
            engine.cancel();
            break;
        }
        written += 1;
    }
    if write_result.is_ok() {
        write_result = out.flush();
    }

    let reports = engine.join()?;
    for report in &reports {
        print_report(report);
    }
    eprintln!("{written} line(s) written");
    log_engine_health(engine.as_ref());
    write_result.map_err(AppError::Output)
}

fn sources_from_args(config: &IngestConfig) -> Vec<SourceConfig> {
    let args: Vec<SourceConfig> = env::args().skip(1).map(SourceConfig::new).collect();
    if args.is_empty() {
        config.sources.clone()
    } else {
        args
    }
}

fn print_report(report: &WorkerReport) {
    eprintln!(
        "{} ({}): {} enqueued, {} empty, {} oversized, {} unparseable, {} transitions, exit {:?}",
        report.symbol,
        report.path.display(),
        report.enqueued,
        report.empty_lines,
        report.oversized_lines,
        report.unparseable_lines,
        report.transitions,
        report.exit
    );
    if let Some(err) = &report.error {
        eprintln!("  error: {err}");
    }
}

fn log_engine_health(engine: &dyn Engine) {
    let health = engine.health();
    eprintln!("hourgate status: {:?} ({:?})", health.status, health.detail);
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: hourgate <FILE>... (or list sources in hourgate.toml)")]
    Usage,
    #[error("engine consumer already taken")]
    ConsumerTaken,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}
