use std::sync::Arc;

use proptree_core::PropService;
use tokio::net::TcpListener;

use crate::auth::SharedSecretGate;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// proptree HTTP server.
pub struct PropServer {
    config: ServerConfig,
}

impl PropServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the store and wire up the gate. Fails on an invalid config.
    pub async fn build_state(&self) -> ServerResult<AppState> {
        self.config.validate()?;
        let store = proptree_store::open(&self.config.dsn).await?;
        let gate = SharedSecretGate::new(&self.config.shared_secret, self.config.token_ttl_secs);
        Ok(AppState::new(
            PropService::with_system_clock(store),
            Arc::new(gate),
        ))
    }

    /// Start serving requests until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        tracing::info!(config = ?self.config, "starting proptree server");
        let app = build_router(self.build_state().await?);
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("proptree server listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
