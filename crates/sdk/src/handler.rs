//! Caller-supplied tunnel lifecycle callbacks

use async_trait::async_trait;
use serde_json::Value;

/// Tunnel lifecycle callbacks.
///
/// Every method defaults to a no-op, so implementors override only the
/// events they care about. Callbacks run on detached tasks spawned once the
/// service has built the response for the triggering request, so they never
/// delay or alter that response; the hosting server may still be flushing
/// the response to the socket while a callback runs. A returned error is
/// logged by the service and nothing else.
#[async_trait]
pub trait TunnelHandler: Send + Sync {
    /// A client asked this server for a tunnel connect URL and got one.
    /// `user_info` is present when the request passed a login check.
    async fn on_request(&self, _tunnel_id: &str, _user_info: Option<Value>) -> anyhow::Result<()> {
        Ok(())
    }

    /// A client connected to its tunnel at the broker
    async fn on_connect(&self, _tunnel_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// A client sent a message through its tunnel. `message_type` is
    /// `"UnknownRaw"` when the payload could not be decoded, with `content`
    /// carrying the raw payload.
    async fn on_message(
        &self,
        _tunnel_id: &str,
        _message_type: &str,
        _content: Option<String>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// A tunnel closed at the broker
    async fn on_close(&self, _tunnel_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The all-defaults handler, for callers that only want URL issuance
pub struct NoopHandler;

#[async_trait]
impl TunnelHandler for NoopHandler {}
