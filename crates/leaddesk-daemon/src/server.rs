//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::notify::{LogMailer, Mailer, NotificationDispatcher};
use crate::rate_limit::RateLimiter;
use leaddesk_storage::{InMemoryStorage, LeadDeskStorage};
use leaddesk_types::LeadDeskEventEnvelope;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

const EVENT_CHANNEL_CAPACITY: usize = 1000;
const MAIL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// LeadDesk daemon server
pub struct Server {
    config: DaemonConfig,
    storage: Arc<dyn LeadDeskStorage>,
    mailer: Arc<dyn Mailer>,
    event_tx: broadcast::Sender<LeadDeskEventEnvelope>,
}

impl Server {
    /// Create a new server, connecting the configured storage backend
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage = build_storage(&config.storage).await?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            storage,
            mailer: Arc::new(LogMailer),
            event_tx,
        })
    }

    /// Replace the mailer used for confirmation emails
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Listen to committed changes, e.g. for an embedding process
    pub fn subscribe(&self) -> broadcast::Receiver<LeadDeskEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let rate_limiter = Arc::new(RateLimiter::from_config(&self.config.rate_limit));

        let (mail_tx, mail_rx) = mpsc::unbounded_channel();

        let state = AppState::new(
            self.storage.clone(),
            self.event_tx.clone(),
            rate_limiter.clone(),
            self.config.quotes.clone(),
        )
        .with_mail_queue(mail_tx)
        .with_trusted_proxies(self.config.server.trusted_proxies.clone());
        let app = create_router(state, &self.config.server);

        // Start notification dispatch in background
        let dispatcher = NotificationDispatcher::new(self.storage.clone(), self.mailer.clone());
        let dispatcher_task = tokio::spawn(dispatcher.run(mail_rx));

        // Forget idle rate limit windows
        let prune_every = rate_limiter.window().max(Duration::from_secs(1));
        let pruner_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(prune_every);
            loop {
                interval.tick().await;
                let removed = rate_limiter.prune_at(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, "Pruned rate limit windows");
                }
            }
        });

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("LeadDesk daemon listening on {}", addr);
        tracing::info!(storage = self.storage.backend_name(), "Storage backend ready");

        // Run server with graceful shutdown
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("LeadDesk daemon shutting down");

        pruner_task.abort();

        // The router owned every queue sender, so the dispatcher ends once the
        // pending confirmations are sent.
        if tokio::time::timeout(MAIL_DRAIN_TIMEOUT, dispatcher_task)
            .await
            .is_err()
        {
            tracing::warn!("Pending confirmation emails were not sent before shutdown");
        }

        result
    }
}

async fn build_storage(config: &StorageConfig) -> DaemonResult<Arc<dyn LeadDeskStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = leaddesk_storage::postgres::PostgresStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "PostgreSQL storage requires the `postgres` feature".to_string(),
        )),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
