use crate::adapters::ProtocolAdapter;
use crate::config::Config;
use crate::pipeline::TransmissionCoordinator;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod router;

pub use router::{build_router, AppState};

/// HTTP Protocol Adapter
///
/// Serves the upload page and the upload endpoint with axum.
pub struct HttpAdapter {
    pub bind_addr: SocketAddr,
    coordinator: Arc<TransmissionCoordinator>,
}

impl HttpAdapter {
    pub fn new(bind_addr: SocketAddr, coordinator: Arc<TransmissionCoordinator>) -> Self {
        Self {
            bind_addr,
            coordinator,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    async fn start(
        &self,
        config: Arc<Config>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>> {
        let bind_addr = self.bind_addr;
        let app = build_router(AppState {
            service_id: config.service.id.clone(),
            coordinator: self.coordinator.clone(),
            max_upload_bytes: config.http.max_upload_bytes,
        });

        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            anyhow::anyhow!("Failed to bind HTTP adapter to {}: {}", bind_addr, e)
        })?;

        tracing::info!("🚀 HTTP adapter started on {}", bind_addr);

        Ok(tokio::spawn(async move {
            let graceful_shutdown = async move {
                shutdown.cancelled().await;
            };

            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful_shutdown)
                .await
            {
                tracing::error!("HTTP adapter on {} encountered error: {}", bind_addr, e);
            }

            tracing::info!("HTTP adapter on {} shut down", bind_addr);
        }))
    }

    fn summary(&self) -> String {
        format!("HttpAdapter(bind={})", self.bind_addr)
    }
}
