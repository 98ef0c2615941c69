//! Orchestrates the mailmock application startup and component lifecycle.
//!
//! This library crate initializes configuration and concurrently runs the
//! two externally-visible services (the SMTP receiver and the HTTP query
//! API) under one cooperative-shutdown signal, mirroring the teacher's
//! `run()` task-spawn/`select!` shape in spirit: if either service exits
//! unexpectedly the whole application shuts down and reports an error.

pub mod config;
pub mod http;
pub mod reply;
pub mod smtp;
pub mod store;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{error, info};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use reply::ReplyCatalog;
use store::{TransactionSink, TransactionStore};

/// Runs the mailmock application.
///
/// Loads configuration, then starts the SMTP server and the HTTP query API
/// as independent tasks sharing one [`TransactionStore`] and one
/// cooperative-shutdown [`CancellationToken`]. A `SIGINT` (Ctrl-C) triggers
/// a graceful shutdown of both. If either task ends on its own — cleanly or
/// with an error — the other is signalled to stop too, and its outcome is
/// folded into the result returned here.
///
/// # Returns
///
/// `Ok(())` after a clean, fully cooperative shutdown of both services.
/// `Err` if configuration loading fails, a listener fails to bind, or
/// either service task terminates unexpectedly (panic or unrequested exit).
pub async fn run() -> Result<()> {
    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return Err(e);
        }
    };

    let catalog = Arc::new(ReplyCatalog::new(config.hostname.clone()));
    let store: Arc<TransactionStore> = Arc::new(TransactionStore::new());
    let stop = CancellationToken::new();

    let smtp_server = smtp::Server::new(
        "smtp",
        config.bind_host(),
        &config.smtp_port.to_string(),
        Arc::clone(&catalog),
        Arc::clone(&store) as Arc<dyn TransactionSink>,
    );
    let smtp_stop = stop.clone();
    let mut smtp_handle = tokio::spawn(async move { smtp_server.listen_and_serve(smtp_stop).await });

    let http_bind = format!("{}:{}", config.bind_host(), config.http_port);
    let http_store = Arc::clone(&store);
    let http_stop = stop.clone();
    let mut http_handle = tokio::spawn(async move { http::run(&http_bind, http_store, http_stop).await });

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, starting graceful shutdown");
            signal_stop.cancel();
        }
    });

    let (smtp_outcome, http_outcome) = tokio::select! {
        res = &mut smtp_handle => {
            if !stop.is_cancelled() {
                error!("SMTP server task terminated unexpectedly");
            }
            stop.cancel();
            let http_res = http_handle.await;
            (task_outcome("SMTP server", res), task_outcome("HTTP query API", http_res))
        }
        res = &mut http_handle => {
            if !stop.is_cancelled() {
                error!("HTTP query API task terminated unexpectedly");
            }
            stop.cancel();
            let smtp_res = smtp_handle.await;
            (task_outcome("SMTP server", smtp_res), task_outcome("HTTP query API", res))
        }
    };

    smtp_outcome.and(http_outcome)
}

/// Collapses a `Result<Result<()>, JoinError>` — the shape `tokio::spawn`
/// hands back — into a single `Result<()>`, attributing panics/cancellations
/// to `name` for the log line.
fn task_outcome(name: &str, res: Result<Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("{name} returned an error: {e}");
            Err(e)
        }
        Err(join_error) => {
            error!("{name} task failed (panic or cancellation): {join_error}");
            Err(anyhow!("{name} task failed: {join_error}"))
        }
    }
}
