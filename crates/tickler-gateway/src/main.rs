use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tickler_core::config::TicklerConfig;
use tickler_scheduler::{
    DispatchSettings, JobRegistry, QueueWorker, ReminderService, SqliteQueue, SqliteReminderStore,
};
use tracing::{info, warn};

mod app;
mod http;

/// Reminder scheduling and delivery service.
#[derive(Parser)]
#[command(name = "tickler-gateway", version)]
struct Cli {
    /// Path to tickler.toml (default: ~/.tickler/tickler.toml).
    #[arg(long, env = "TICKLER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tickler_gateway=info,tickler_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = TicklerConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TicklerConfig::default()
    });

    // one SQLite file; reminders and the queue each get their own connection
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    tickler_scheduler::db::init_db(&db)?;
    info!("database migrations complete");

    let store = Arc::new(SqliteReminderStore::new(rusqlite::Connection::open(&db_path)?)?);
    let queue = Arc::new(SqliteQueue::new(rusqlite::Connection::open(&db_path)?)?);
    let transport = tickler_mailer::build_transport(&config.mail)?;
    info!(transport = transport.name(), "mail transport ready");

    let registry = Arc::new(JobRegistry::new());
    let settings = DispatchSettings::from_config(&config.dispatch, &config.queue);
    let service = ReminderService::new(
        store,
        queue.clone(),
        transport,
        Arc::clone(&registry),
        settings,
    );

    // re-arm everything still pending before accepting traffic
    let report = service.recover().await?;
    info!(?report, "startup recovery finished");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = QueueWorker::new(queue, service.consumer(), &config.queue);
    let worker_task = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, service));
    let router = app::build_router(state);

    info!("Tickler gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the worker, then every live timer and cron task
    let _ = shutdown_tx.send(true);
    let _ = worker_task.await;
    let cancelled = registry.cancel_all();
    info!(cancelled, "Tickler gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
