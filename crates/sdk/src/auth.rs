//! Login/session checking collaborator
//!
//! The tunnel GET flow can optionally gate URL issuance behind a login
//! check. The seam is the [`LoginChecker`] trait: on success it yields the
//! caller's user info, on denial it yields the HTTP response it has already
//! authored, which the tunnel flow returns verbatim and then stops.
//!
//! [`AuthClient`] is the HTTP implementation talking to the configured auth
//! service, whose replies follow the same `{code, message, data}` idiom as
//! the broker.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use http::request::Parts;
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, TunnelError};
use crate::service::json_response;

/// Session headers presented by clients on gated requests
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const SESSION_KEY_HEADER: &str = "x-session-key";

/// Auth service result codes that invalidate the presented session
const CODE_SESSION_EXPIRED: i64 = 1001;
const CODE_SESSION_INVALID: i64 = 1002;

/// Denial kinds written into the `error` field of a denial body
const ERR_INVALID_SESSION: &str = "invalid_session";
const ERR_CHECK_LOGIN_FAILED: &str = "check_login_failed";

/// Pluggable login check consulted by the tunnel GET flow
#[async_trait]
pub trait LoginChecker: Send + Sync {
    /// Check the request's login state.
    ///
    /// `Ok` carries the caller's user info. `Err` carries the denial
    /// response this checker authored; the tunnel flow returns it verbatim,
    /// writes nothing else, and fires no callback.
    async fn check_login(&self, parts: &Parts) -> std::result::Result<Value, Response<String>>;
}

/// A session issued by the auth service in exchange for a login credential
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    pub id: String,
    pub key: String,

    #[serde(default)]
    pub user_info: Value,
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    id: &'a str,
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthReply {
    code: i64,

    #[serde(default)]
    message: String,

    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionUser {
    #[serde(default)]
    user_info: Value,
}

/// HTTP client for the login/session-check service
#[derive(Debug, Clone)]
pub struct AuthClient {
    auth_url: String,
    http: reqwest::Client,
}

impl AuthClient {
    /// Fails fast with a `Config` error when no auth URL is configured
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let auth_url = config.auth_url()?.trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TunnelError::Network(e.to_string()))?;

        Ok(Self { auth_url, http })
    }

    /// Exchange a login credential for a session
    pub async fn login(&self, credential: &Value) -> Result<LoginSession> {
        let data = self.send("/login", &json!({ "credential": credential })).await?;

        serde_json::from_value(data)
            .map_err(|e| TunnelError::Protocol(format!("auth login reply is malformed: {}", e)))
    }

    /// Validate a session, returning the user info attached to it
    pub async fn check_session(&self, id: &str, key: &str) -> Result<Value> {
        let data = self.send("/check", &CheckRequest { id, key }).await?;

        let user: SessionUser = serde_json::from_value(data)
            .map_err(|e| TunnelError::Protocol(format!("auth check reply is malformed: {}", e)))?;

        Ok(user.user_info)
    }

    /// POST a request and run the status/shape/code validation ladder
    async fn send<T: Serialize>(&self, api_path: &str, request: &T) -> Result<Value> {
        let url = format!("{}{}", self.auth_url, api_path);

        let begin = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(request)
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

        if status != StatusCode::OK {
            return Err(TunnelError::Network(format!(
                "auth service returned status {}",
                status
            )));
        }

        let reply: AuthReply = serde_json::from_str(&body).map_err(|_| {
            TunnelError::Protocol("auth reply is not a JSON object with a code".to_string())
        })?;

        if reply.code != 0 {
            return Err(TunnelError::Auth {
                code: reply.code,
                message: reply.message,
            });
        }

        Ok(reply.data.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl LoginChecker for AuthClient {
    async fn check_login(&self, parts: &Parts) -> std::result::Result<Value, Response<String>> {
        let id = header(parts, SESSION_ID_HEADER);
        let key = header(parts, SESSION_KEY_HEADER);

        let (Some(id), Some(key)) = (id, key) else {
            return Err(denial(ERR_INVALID_SESSION, "missing session headers"));
        };

        match self.check_session(id, key).await {
            Ok(user_info) => Ok(user_info),
            Err(TunnelError::Auth { code, message })
                if code == CODE_SESSION_EXPIRED || code == CODE_SESSION_INVALID =>
            {
                warn!("Session rejected: {} - {}", code, message);
                Err(denial(ERR_INVALID_SESSION, &message))
            }
            Err(e) => {
                warn!("Login check failed: {}", e);
                Err(denial(ERR_CHECK_LOGIN_FAILED, &e.to_string()))
            }
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Denial responses are HTTP 200 with an error body, matching the tunnel
/// GET flow's failure contract
fn denial(kind: &str, message: &str) -> Response<String> {
    json_response(
        StatusCode::OK,
        &json!({ "error": kind, "message": message }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_client() -> AuthClient {
        let config = Config::new("app.example.com", "https://broker.example.com", "top-secret")
            .expect("valid config")
            .with_auth_url("https://auth.example.com");
        AuthClient::new(Arc::new(config)).expect("client builds")
    }

    #[test]
    fn test_requires_auth_url() {
        let config = Config::new("app.example.com", "https://broker.example.com", "top-secret")
            .expect("valid config");

        let err = AuthClient::new(Arc::new(config)).unwrap_err();
        assert!(matches!(err, TunnelError::Config("auth_url")));
    }

    #[test]
    fn test_denial_body_shape() {
        let response = denial(ERR_INVALID_SESSION, "session expired");

        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error"], "invalid_session");
        assert_eq!(body["message"], "session expired");
    }

    #[tokio::test]
    async fn test_missing_session_headers_denied_without_network() {
        let client = auth_client();

        let (parts, _) = http::Request::builder()
            .method("GET")
            .uri("/tunnel")
            .body(())
            .expect("valid request")
            .into_parts();

        // No session headers: denied before any call to the auth service
        let denial = client.check_login(&parts).await.unwrap_err();
        let body: Value = serde_json::from_str(denial.body()).unwrap();
        assert_eq!(body["error"], "invalid_session");
    }

    #[test]
    fn test_login_session_decoding() {
        let session: LoginSession = serde_json::from_str(
            r#"{"id":"s1","key":"k1","userInfo":{"nickname":"alice"}}"#,
        )
        .unwrap();

        assert_eq!(session.id, "s1");
        assert_eq!(session.key, "k1");
        assert_eq!(session.user_info["nickname"], "alice");
    }
}
