//! Inbound webhook endpoint
//!
//! [`TunnelService`] is the server side of the signaling protocol. It is
//! framework-agnostic over `http::Request<String>` so any `http`-based host
//! can embed it, and stateless per request: the only cross-request state is
//! the shared configuration and broker client.
//!
//! GET issues a tunnel connect URL (optionally behind a login check); POST
//! validates a signed packet relayed by the broker and dispatches it to the
//! caller's [`TunnelHandler`]. Callbacks run on detached tasks spawned once
//! the response has been built, so handler latency never delays the reply
//! and a callback failure cannot alter it; whether the hosting server has
//! flushed the reply to the socket by then is up to the host.

use std::sync::Arc;

use http::header::{CONTENT_TYPE, HeaderValue};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode};
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::auth::LoginChecker;
use crate::broker::BrokerClient;
use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::handler::TunnelHandler;
use crate::protocol::{InboundPacket, TunnelInfo, decode_message_content};
use crate::signature::SignatureService;

/// Numeric result codes on the POST webhook surface
const CODE_OK: i64 = 0;
const CODE_BODY_NOT_JSON: i64 = 9001;
const CODE_MISSING_FIELDS: i64 = 9002;
const CODE_BAD_SIGNATURE: i64 = 9003;
const CODE_BAD_PACKET: i64 = 9004;

/// The inbound tunnel webhook handler
#[derive(Clone)]
pub struct TunnelService {
    config: Arc<Config>,
    broker: Arc<BrokerClient>,
    signature: SignatureService,
    handler: Arc<dyn TunnelHandler>,
    login_checker: Option<Arc<dyn LoginChecker>>,
}

impl TunnelService {
    pub fn new(
        config: Arc<Config>,
        broker: Arc<BrokerClient>,
        handler: Arc<dyn TunnelHandler>,
    ) -> Self {
        Self {
            signature: SignatureService::new(config.clone()),
            config,
            broker,
            handler,
            login_checker: None,
        }
    }

    /// Gate GET requests behind a login check. Without a checker, URL
    /// issuance is open and `on_request` sees no user info.
    pub fn with_login_checker(mut self, checker: Arc<dyn LoginChecker>) -> Self {
        self.login_checker = Some(checker);
        self
    }

    /// Handle one inbound webhook request
    pub async fn handle(&self, request: Request<String>) -> Response<String> {
        let (parts, body) = request.into_parts();

        match parts.method {
            Method::GET => self.handle_get(&parts).await,
            Method::POST => self.handle_post(body).await,
            _ => json_response(
                StatusCode::NOT_IMPLEMENTED,
                &json!({ "code": 501, "message": "Not Implemented" }),
            ),
        }
    }

    /// GET: issue a tunnel connect URL.
    ///
    /// Fails closed: any failure (login denial, network, protocol,
    /// signature) suppresses the `on_request` callback entirely. Broker
    /// failures report as `200 {"error": message}`.
    async fn handle_get(&self, parts: &Parts) -> Response<String> {
        let mut user_info = None;

        if let Some(checker) = &self.login_checker {
            match checker.check_login(parts).await {
                Ok(info) => user_info = Some(info),
                // The checker authored its own denial response; return it
                // verbatim and stop
                Err(denial) => return denial,
            }
        }

        let receive_url = ReceiveUrl::new(&self.config, parts.uri.path());

        let info = match receive_url.get() {
            Ok(url) => match self.broker.request_connect(url).await {
                Ok(info) => info,
                Err(e) => return json_response(StatusCode::OK, &json!({ "error": e.to_string() })),
            },
            Err(e) => return json_response(StatusCode::OK, &json!({ "error": e.to_string() })),
        };

        let TunnelInfo {
            tunnel_id,
            connect_url,
        } = info;

        let response = json_response(StatusCode::OK, &json!({ "url": connect_url }));

        let handler = self.handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.on_request(&tunnel_id, user_info).await {
                warn!("on_request callback failed: {:#}", e);
            }
        });

        response
    }

    /// POST: validate a signed packet and dispatch it.
    ///
    /// The acknowledgment is built before the callback is spawned, so the
    /// broker always gets a fast ack regardless of downstream cost.
    async fn handle_post(&self, body: String) -> Response<String> {
        debug!("Webhook packet payload: {}", body);

        let Some(envelope) = serde_json::from_str::<Value>(&body)
            .ok()
            .filter(Value::is_object)
        else {
            return code_response(
                StatusCode::BAD_REQUEST,
                CODE_BODY_NOT_JSON,
                "Bad request - request data is not json",
            );
        };

        let data = envelope.get("data").and_then(Value::as_str).unwrap_or("");
        let signature = envelope
            .get("signature")
            .and_then(Value::as_str)
            .unwrap_or("");

        if data.is_empty() || signature.is_empty() {
            return code_response(
                StatusCode::OK,
                CODE_MISSING_FIELDS,
                "Bad request - invalid request data",
            );
        }

        // Verify over the exact received string, subject to the global
        // checking toggle
        if !self.signature.check(data, signature) {
            return code_response(
                StatusCode::OK,
                CODE_BAD_SIGNATURE,
                "Bad request - check signature failed",
            );
        }

        let Ok(packet) = serde_json::from_str::<InboundPacket>(data) else {
            return code_response(
                StatusCode::OK,
                CODE_BAD_PACKET,
                "Bad request - packet data is not json",
            );
        };

        let response = code_response(StatusCode::OK, CODE_OK, "ok");

        let handler = self.handler.clone();
        tokio::spawn(async move {
            dispatch_packet(handler, packet).await;
        });

        response
    }
}

/// Dispatch one inbound packet to at most one callback. Unrecognized packet
/// types are dropped; the ack has already been sent.
async fn dispatch_packet(handler: Arc<dyn TunnelHandler>, packet: InboundPacket) {
    let result = match packet.kind.as_str() {
        "connect" => handler.on_connect(&packet.tunnel_id).await,
        "message" => {
            let (message_type, content) = decode_message_content(packet.content);
            handler
                .on_message(&packet.tunnel_id, &message_type, content)
                .await
        }
        "close" => handler.on_close(&packet.tunnel_id).await,
        other => {
            debug!("Dropping packet with unrecognized type: {}", other);
            return;
        }
    };

    if let Err(e) = result {
        warn!("Tunnel callback failed: {:#}", e);
    }
}

/// Webhook URL the broker relays packets back to: the broker URL's scheme,
/// this server's public host, and the current request path. Memoized for
/// the lifetime of one request, unlike the process-lifetime client id.
struct ReceiveUrl<'a> {
    config: &'a Config,
    path: &'a str,
    url: OnceCell<String>,
}

impl<'a> ReceiveUrl<'a> {
    fn new(config: &'a Config, path: &'a str) -> Self {
        Self {
            config,
            path,
            url: OnceCell::new(),
        }
    }

    fn get(&self) -> Result<&str> {
        self.url
            .get_or_try_init(|| {
                let broker = Url::parse(self.config.broker_url())
                    .map_err(|_| TunnelError::Config("broker_url"))?;

                Ok(format!(
                    "{}://{}{}",
                    broker.scheme(),
                    self.config.server_host(),
                    self.path
                ))
            })
            .map(String::as_str)
    }
}

pub(crate) fn json_response(status: StatusCode, body: &Value) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn code_response(status: StatusCode, code: i64, message: &str) -> Response<String> {
    json_response(status, &json!({ "code": code, "message": message }))
}
