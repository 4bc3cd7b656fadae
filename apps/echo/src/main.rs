//! Tunnel chat room demo
//!
//! Hosts the SDK's webhook endpoint on an axum server and implements a
//! small chat room on top of it: every connected tunnel is a room member,
//! `speak` messages are broadcast to the room, and membership changes are
//! announced to everyone.

use std::collections::HashSet;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::routing::any;
use clap::Parser;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tunnel_signal_sdk::{
    AuthClient, BrokerClient, Config, TunnelError, TunnelHandler, TunnelService,
};

/// CLI arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "tunnel-echo")]
#[command(about = "Tunnel chat room demo server", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Public host of this server, reachable by the broker
    #[arg(long, env = "TUNNEL_SERVER_HOST")]
    server_host: String,

    /// Base URL of the tunnel broker
    #[arg(long, env = "TUNNEL_BROKER_URL")]
    broker_url: String,

    /// Base URL of the login/session-check service; enables the login
    /// check on tunnel requests when set
    #[arg(long, env = "TUNNEL_AUTH_URL")]
    auth_url: Option<String>,

    /// Shared signature secret
    #[arg(long, env = "TUNNEL_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Disable inbound signature verification (trusted setups only)
    #[arg(long)]
    insecure_skip_signature: bool,

    /// Outbound request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Webhook path served for the broker and clients
    #[arg(long, default_value = "/tunnel")]
    path: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = Config::new(&args.server_host, &args.broker_url, &args.secret_key)?
        .with_check_signature(!args.insecure_skip_signature)
        .with_timeout_ms(args.timeout_ms);

    if let Some(auth_url) = &args.auth_url {
        config = config.with_auth_url(auth_url);
    }

    Ok(config)
}

/// Chat room state: the set of connected tunnel ids
struct EchoRoom {
    broker: Arc<BrokerClient>,
    members: Mutex<HashSet<String>>,
}

impl EchoRoom {
    fn new(broker: Arc<BrokerClient>) -> Self {
        Self {
            broker,
            members: Mutex::new(HashSet::new()),
        }
    }

    /// Snapshot of the member list; the lock is never held across an await
    fn members(&self) -> Vec<String> {
        self.members.lock().unwrap().iter().cloned().collect()
    }

    fn remove(&self, tunnel_id: &str) -> bool {
        self.members.lock().unwrap().remove(tunnel_id)
    }

    /// Broadcast the current member count to the room
    async fn announce(&self) {
        let members = self.members();
        if members.is_empty() {
            return;
        }

        let content = json!({ "count": members.len() }).to_string();
        if let Err(e) = self.broker.broadcast(&members, "people", &content).await {
            warn!("Failed to announce member count: {}", e);
        }
    }

    /// Send to a single member; on a broker-side rejection the tunnel is
    /// treated as dead, closed, and dropped from the room
    async fn send_or_drop(&self, tunnel_id: &str, message_type: &str, content: &str) {
        match self.broker.emit(tunnel_id, message_type, content).await {
            Ok(()) => {}
            Err(TunnelError::Broker { code, message }) => {
                warn!(
                    "Dropping dead tunnel {}: {} - {}",
                    tunnel_id, code, message
                );
                if let Err(e) = self.broker.close_tunnel(tunnel_id).await {
                    warn!("Failed to close tunnel {}: {}", tunnel_id, e);
                }
                self.remove(tunnel_id);
            }
            Err(e) => warn!("Failed to send to {}: {}", tunnel_id, e),
        }
    }
}

#[async_trait]
impl TunnelHandler for EchoRoom {
    async fn on_request(&self, tunnel_id: &str, user_info: Option<Value>) -> Result<()> {
        info!(
            "Issued tunnel {} (user: {})",
            tunnel_id,
            user_info
                .as_ref()
                .and_then(|u| u["nickname"].as_str())
                .unwrap_or("anonymous")
        );
        Ok(())
    }

    async fn on_connect(&self, tunnel_id: &str) -> Result<()> {
        info!("Tunnel connected: {}", tunnel_id);

        self.members.lock().unwrap().insert(tunnel_id.to_string());
        self.announce().await;

        Ok(())
    }

    async fn on_message(
        &self,
        tunnel_id: &str,
        message_type: &str,
        content: Option<String>,
    ) -> Result<()> {
        let content = content.unwrap_or_default();

        match message_type {
            "speak" => {
                let members = self.members();
                if let Err(e) = self.broker.broadcast(&members, "speak", &content).await {
                    warn!("Failed to broadcast message: {}", e);
                }
            }
            other => {
                // Unknown message types are answered to the sender only
                let reply = json!({ "reason": format!("unknown message type: {}", other) });
                self.send_or_drop(tunnel_id, "error", &reply.to_string()).await;
            }
        }

        Ok(())
    }

    async fn on_close(&self, tunnel_id: &str) -> Result<()> {
        info!("Tunnel closed: {}", tunnel_id);

        if self.remove(tunnel_id) {
            self.announce().await;
        }

        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<TunnelService>,
}

/// Adapt the axum request to the SDK's framework-agnostic surface
async fn webhook(State(state): State<AppState>, request: axum::extract::Request) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, 1024 * 1024)
        .await
        .unwrap_or_default();
    let body = String::from_utf8_lossy(&bytes).into_owned();

    let response = state.service.handle(http::Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    axum::response::Response::from_parts(parts, Body::from(body))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Tunnel echo v{}", env!("CARGO_PKG_VERSION"));
    info!("Broker: {}", args.broker_url);
    info!("Webhook: {}{}", args.server_host, args.path);

    let config = Arc::new(build_config(&args)?);
    let broker = Arc::new(BrokerClient::new(config.clone())?);
    let room = Arc::new(EchoRoom::new(broker.clone()));

    let mut service = TunnelService::new(config.clone(), broker, room);
    if args.auth_url.is_some() {
        service = service.with_login_checker(Arc::new(AuthClient::new(config.clone())?));
        info!("Login check enabled");
    }

    let app = Router::new()
        .route(&args.path, any(webhook))
        .with_state(AppState {
            service: Arc::new(service),
        });

    let listener = TcpListener::bind(args.listen).await?;
    info!("Listening on {}", args.listen);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down gracefully...");
        }
    }

    Ok(())
}
