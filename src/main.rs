// src/main.rs

//! tagsync entry-point.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Open the SQLite store (WAL)
//! 3. Build the sync pipeline and start the scheduler
//! 4. Serve the door/machine caches over HTTP
//! 5. Wait for Ctrl-C, then stop the scheduler and drain the server

use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
};

use anyhow::Context;
use chrono::Local;
use fern::Dispatch;
use log::{Level, LevelFilter};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use tagsync::{
    cache::cache_channel,
    config::{self, Config},
    db::Store,
    server,
    sync::{Pipeline, ReconcileOptions, Scheduler},
    tagsync_log,
    upstream::WildApricotClient,
};

const DEFAULT_CONFIG_FILE: &str = "tagsync.toml";

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// First CLI argument, else `tagsync.toml` next to the executable.
fn config_path() -> PathBuf {
    if let Some(arg) = std::env::args_os().nth(1) {
        return PathBuf::from(arg);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join(DEFAULT_CONFIG_FILE)
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(cfg: &Config) -> Result<(), fern::InitError> {
    let level = match cfg.logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stdout());

    if cfg.logging.enable {
        let file = cfg.logging.file.as_deref().unwrap_or("tagsync.log");
        dispatch = dispatch.chain(fern::log_file(file)?);
    }

    dispatch.apply()?;
    Ok(())
}

async fn wait_for_ctrl_c(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tagsync_log!(Level::Error, "main", "Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tagsync_log!(Level::Warn, "main", "Shutdown requested");
    let _ = shutdown_tx.send(true);
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    // Metrics
    if let Some(addr) = cfg.server.metrics_listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        tagsync_log!(Level::Info, "main", "Prometheus metrics on http://{}/metrics", addr);
    }

    // Store
    let store = Store::open(&cfg.database)
        .with_context(|| format!("opening store at {}", cfg.database.path.display()))?;

    // Pipeline
    let source = Arc::new(WildApricotClient::new(cfg.upstream.clone()).context("building upstream client")?);
    let (publisher, reader) = cache_channel();
    let pipeline = Arc::new(Pipeline::new(
        source,
        store,
        publisher,
        cfg.fields.clone(),
        ReconcileOptions { prune_missing_contacts: cfg.sync.prune_missing_contacts },
        cfg.upstream.timeout,
    ));

    // Scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(Scheduler::new(pipeline, cfg.sync.interval).run(shutdown_rx.clone()));

    // HTTP
    let listener = tokio::net::TcpListener::bind(cfg.server.listen)
        .await
        .with_context(|| format!("binding {}", cfg.server.listen))?;
    tagsync_log!(Level::Info, "main", "Serving caches on http://{}", cfg.server.listen);

    let mut server_shutdown = shutdown_rx;
    let serve = axum::serve(listener, server::router(reader)).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });

    let signals = tokio::spawn(wait_for_ctrl_c(shutdown_tx));
    let served = serve.await.context("HTTP server");
    signals.abort();
    let _ = scheduler.await;
    served?;

    tagsync_log!(Level::Info, "main", "Stopped cleanly");
    Ok(())
}

fn main() {
    // 1 ─ Configuration & logging
    let path = config_path();
    let cfg = config::load(&path).unwrap_or_else(|e| fatal!("config", "{}: {}", path.display(), e));
    setup_logging(&cfg).unwrap_or_else(|e| fatal!("logging", "{}", e));
    tagsync_log!(Level::Info, "main", "Starting with config {}", path.display());

    // 2 ─ Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fatal!("runtime", "{}", e));

    if let Err(e) = rt.block_on(run(cfg)) {
        fatal!("main", "{:#}", e);
    }
}
