//! Outbound client for the tunnel broker
//!
//! Two operations exist on the wire: URL issuance (`/get/wsurl`) and packet
//! push (`/ws/push`). Both POST a signed envelope and validate the reply
//! through the same ladder: HTTP status, JSON shape, broker result code.
//! Only the URL-issuance reply is itself signed; push replies are plain
//! acknowledgments. Every call is a single attempt with the configured
//! timeout; there is no retry.

use std::sync::Arc;
use std::time::Instant;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::identity::ClientIdentity;
use crate::protocol::{
    BrokerReply, ConnectRequest, MessageEnvelope, Packet, PacketKind, SignedEnvelope, TunnelInfo,
};
use crate::signature::SignatureService;

/// Broker path issuing fresh tunnel connect URLs
const WSURL_PATH: &str = "/get/wsurl";

/// Broker path accepting outbound lifecycle packets
const PUSH_PATH: &str = "/ws/push";

/// Client for the broker's signaling endpoints
#[derive(Debug, Clone)]
pub struct BrokerClient {
    config: Arc<Config>,
    identity: Arc<ClientIdentity>,
    signature: SignatureService,
    http: reqwest::Client,
}

impl BrokerClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TunnelError::Network(e.to_string()))?;

        Ok(Self {
            identity: Arc::new(ClientIdentity::new(config.clone())),
            signature: SignatureService::new(config.clone()),
            config,
            http,
        })
    }

    /// Request a fresh tunnel connect URL for clients to dial.
    ///
    /// `receive_url` is the publicly reachable webhook endpoint the broker
    /// will relay lifecycle packets back to. The reply's `data` string is
    /// verified against its signature before being decoded.
    pub async fn request_connect(&self, receive_url: &str) -> Result<TunnelInfo> {
        let request = ConnectRequest::new(receive_url);
        let envelope = self.pack(serde_json::to_string(&request)?, true);

        let reply = self.send(WSURL_PATH, &envelope).await?;

        let data = match reply.data {
            Some(serde_json::Value::String(data)) => data,
            _ => {
                return Err(TunnelError::Protocol(
                    "connect reply carries no data string".to_string(),
                ));
            }
        };

        if !self
            .signature
            .check(&data, reply.signature.as_deref().unwrap_or_default())
        {
            return Err(TunnelError::Signature);
        }

        serde_json::from_str(&data)
            .map_err(|e| TunnelError::Protocol(format!("connect reply data is malformed: {}", e)))
    }

    /// Push one lifecycle packet to a set of tunnels.
    ///
    /// The reply is an acknowledgment only; its signature is not verified.
    pub async fn emit_packet(
        &self,
        tunnel_ids: Vec<String>,
        kind: PacketKind,
        content: Option<String>,
    ) -> Result<()> {
        let packet = Packet {
            tunnel_ids,
            kind,
            content,
        };

        let envelope = self.pack(serde_json::to_string(&[&packet])?, false);
        self.send(PUSH_PATH, &envelope).await?;

        Ok(())
    }

    /// Push a typed message to a set of tunnels
    pub async fn emit_message(
        &self,
        tunnel_ids: Vec<String>,
        message_type: &str,
        message_content: &str,
    ) -> Result<()> {
        let content = serde_json::to_string(&MessageEnvelope {
            kind: Some(message_type.to_string()),
            content: Some(message_content.to_string()),
        })?;

        self.emit_packet(tunnel_ids, PacketKind::Message, Some(content))
            .await
    }

    /// Push a typed message to a single tunnel
    pub async fn emit(
        &self,
        tunnel_id: &str,
        message_type: &str,
        message_content: &str,
    ) -> Result<()> {
        debug!("Emit [{}] to {}", message_type, tunnel_id);
        self.emit_message(vec![tunnel_id.to_string()], message_type, message_content)
            .await
    }

    /// Push a typed message to many tunnels
    pub async fn broadcast(
        &self,
        tunnel_ids: &[String],
        message_type: &str,
        message_content: &str,
    ) -> Result<()> {
        debug!("Broadcast [{}] to {} tunnels", message_type, tunnel_ids.len());
        self.emit_message(tunnel_ids.to_vec(), message_type, message_content)
            .await
    }

    /// Ask the broker to close a single tunnel
    pub async fn close_tunnel(&self, tunnel_id: &str) -> Result<()> {
        debug!("Close tunnel {}", tunnel_id);
        self.emit_packet(vec![tunnel_id.to_string()], PacketKind::Close, None)
            .await
    }

    /// Sign a serialized payload into the wire envelope. Client identity is
    /// attached only on the URL-issuance call.
    fn pack(&self, data: String, with_identity: bool) -> SignedEnvelope {
        let (tc_id, tc_key) = if with_identity {
            (
                Some(self.identity.id().to_string()),
                Some(self.identity.key().to_string()),
            )
        } else {
            (None, None)
        };

        SignedEnvelope {
            signature: self.signature.compute(&data),
            data,
            tc_id,
            tc_key,
        }
    }

    /// POST an envelope and run the common reply validation ladder
    async fn send(&self, api_path: &str, envelope: &SignedEnvelope) -> Result<BrokerReply> {
        let url = format!(
            "{}{}",
            self.config.broker_url().trim_end_matches('/'),
            api_path
        );

        let begin = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| TunnelError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TunnelError::Network(e.to_string()))?;

        debug!(
            "POST {} => [{}] ({}ms)",
            url,
            status,
            begin.elapsed().as_millis()
        );
        debug!("  request: {}", envelope.data);
        debug!("  reply: {}", body);

        if status != StatusCode::OK {
            return Err(TunnelError::Network(format!(
                "broker returned status {}",
                status
            )));
        }

        let reply: BrokerReply = serde_json::from_str(&body).map_err(|_| {
            TunnelError::Protocol("broker reply is not a JSON object with a code".to_string())
        })?;

        if reply.code != 0 {
            return Err(TunnelError::Broker {
                code: reply.code,
                message: reply.message,
            });
        }

        Ok(reply)
    }
}
