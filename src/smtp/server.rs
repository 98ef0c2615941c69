//! The SMTP accept loop: binds a listener, spawns one [`Session`] per
//! accepted connection, and participates in cooperative shutdown
//! (spec.md §4.4, §5).
//!
//! Grounded on the accept loop in the teacher's `smtp/mod.rs` (`Server::run`,
//! a `loop { listener.accept().await ... tokio::spawn(...) }` shape); the
//! shutdown and session-tracking machinery is new, per spec.md §5, built
//! with `tokio_util::sync::CancellationToken` and a `tokio::task::JoinSet`.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::reply::ReplyCatalog;
use crate::smtp::session::Session;
use crate::store::TransactionSink;

/// Accepts SMTP connections on one bound address and drives a [`Session`]
/// per connection.
pub struct Server {
    name: String,
    bind_addr: String,
    catalog: Arc<ReplyCatalog>,
    sink: Arc<dyn TransactionSink>,
}

impl Server {
    pub fn new(
        name: impl Into<String>,
        host: &str,
        port: &str,
        catalog: Arc<ReplyCatalog>,
        sink: Arc<dyn TransactionSink>,
    ) -> Self {
        Self {
            name: name.into(),
            bind_addr: format!("{host}:{port}"),
            catalog,
            sink,
        }
    }

    /// Binds the listener and serves until `stop` fires, at which point the
    /// listener is closed, every in-flight session is signalled, and this
    /// function waits for all of them to terminate before returning `Ok`.
    ///
    /// A bind failure is returned immediately. Transient accept failures are
    /// logged; the loop continues.
    pub async fn listen_and_serve(&self, stop: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("binding {} listener on {}", self.name, self.bind_addr))?;

        info!("{} server listening on {}", self.name, self.bind_addr);

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("{} server: stop signal received, closing listener", self.name);
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("{}: accepted connection from {peer}", self.name);
                            let catalog = Arc::clone(&self.catalog);
                            let sink = Arc::clone(&self.sink);
                            let session_stop = stop.clone();
                            sessions.spawn(async move {
                                let (read_half, write_half) = tokio::io::split(stream);
                                let mut session = Session::new(
                                    BufReader::new(read_half),
                                    write_half,
                                    catalog,
                                    sink,
                                );
                                session.serve(session_stop).await;
                                debug!("session with {peer} ended in state {:?}", session.state());
                            });
                        }
                        Err(e) => {
                            error!("{}: error accepting connection: {e}", self.name);
                        }
                    }
                }
            }
        }

        drop(listener);
        info!(
            "{} server: waiting for {} in-flight session(s)",
            self.name,
            sessions.len()
        );
        while sessions.join_next().await.is_some() {}

        info!("{} server: shutdown complete", self.name);
        Ok(())
    }
}
