//! Browser extension relay
//!
//! Local HTTP listener the browser extension posts the current tab's URL to.
//!
//! # Endpoints
//!
//! - `POST /download` - body `{"url": "..."}`, forwarded to the injected channel
//! - `OPTIONS /download` - CORS preflight

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::config::DEFAULT_RELAY_PORT;

const CORS_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

/// Extension payload. A non-string `url` is a 400, unlike the desktop app,
/// which accepted any truthy JSON value.
#[derive(Deserialize)]
struct RelayBody {
    #[serde(default)]
    url: Option<String>,
}

pub struct RelayServer {
    port: u16,
    bind_address: String,
}

impl RelayServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: "127.0.0.1".to_string(),
        }
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until Ctrl+C. Received URLs go to `urls`.
    pub async fn start(&self, urls: mpsc::Sender<String>) -> Result<()> {
        let router = build_router(urls);
        let addr = format!("{}:{}", self.bind_address, self.port);

        tracing::info!("Starting relay on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. Another crateplug relay is probably running.",
                    self.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_PORT)
    }
}

pub fn build_router(urls: mpsc::Sender<String>) -> Router {
    Router::new()
        .route("/download", post(download_handler).options(preflight_handler))
        .with_state(urls)
}

async fn preflight_handler() -> impl IntoResponse {
    (StatusCode::OK, CORS_HEADERS)
}

async fn download_handler(
    State(urls): State<mpsc::Sender<String>>,
    body: Bytes,
) -> impl IntoResponse {
    let parsed: RelayBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "rejected relay body");
            return (StatusCode::BAD_REQUEST, CORS_HEADERS);
        }
    };

    if let Some(url) = parsed.url.filter(|u| !u.trim().is_empty()) {
        // Nobody listening or a full queue both mean "not now", like a closed window
        if let Err(e) = urls.try_send(url) {
            tracing::debug!(error = %e, "relay URL not forwarded");
        }
    }

    (StatusCode::OK, CORS_HEADERS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Relay shutting down");
}
