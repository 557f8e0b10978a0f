//! Wire access to the provisioning endpoint

use crate::error::Result;
use crate::guard::CallFailure;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::error::Error as _;
use std::io::ErrorKind;
use std::sync::Arc;

/// Port the provisioning endpoint listens on
pub const SERVER_PORT: u16 = 17444;

/// One round trip to the provisioning endpoint.
///
/// Implementations report failures already classified; retry and timeout
/// handling lives in the guard, not here.
#[async_trait]
pub trait ProvisioningTransport: Send + Sync {
    /// `host:port` of the endpoint, used in diagnostics and errors
    fn endpoint(&self) -> String;

    /// Invoke `method` with positional `params` and return the decoded answer
    async fn invoke(&self, method: &str, params: &[Value]) -> std::result::Result<Value, CallFailure>;
}

#[async_trait]
impl<T: ProvisioningTransport + ?Sized> ProvisioningTransport for Arc<T> {
    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    async fn invoke(&self, method: &str, params: &[Value]) -> std::result::Result<Value, CallFailure> {
        (**self).invoke(method, params).await
    }
}

/// JSON-over-HTTPS transport.
///
/// The endpoint uses a self-signed certificate, so chain validation is off.
pub struct HttpsTransport {
    client: reqwest::Client,
    url: String,
    endpoint: String,
}

impl HttpsTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            url: format!("https://{}:{}/", host, port),
            endpoint: format!("{}:{}", host, port),
        })
    }
}

#[async_trait]
impl ProvisioningTransport for HttpsTransport {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn invoke(&self, method: &str, params: &[Value]) -> std::result::Result<Value, CallFailure> {
        let body = json!({ "method": method, "params": params });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let text = response.text().await.map_err(classify)?;

        if matches!(status.as_u16(), 502..=504) {
            return Err(CallFailure::Transport(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(CallFailure::Rejected(format!("HTTP {}: {}", status, text.trim())));
        }
        if text.trim().is_empty() {
            return Err(CallFailure::EmptyResponse);
        }

        serde_json::from_str(&text)
            .map_err(|e| CallFailure::Rejected(format!("malformed response: {}", e)))
    }
}

/// Map a reqwest failure onto the classified failure set
fn classify(error: reqwest::Error) -> CallFailure {
    let detail = error.to_string();

    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                ErrorKind::ConnectionRefused => CallFailure::ConnectionRefused(detail),
                ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
                    CallFailure::HostUnreachable(detail)
                }
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    CallFailure::ConnectionReset(detail)
                }
                ErrorKind::BrokenPipe => CallFailure::BrokenPipe(detail),
                ErrorKind::UnexpectedEof => CallFailure::EmptyResponse,
                _ => CallFailure::Transport(detail),
            };
        }

        let message = inner.to_string().to_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("handshake")
        {
            return CallFailure::Tls(detail);
        }

        source = inner.source();
    }

    if error.is_decode() || error.is_builder() {
        CallFailure::Rejected(detail)
    } else {
        CallFailure::Transport(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_label() {
        let transport = HttpsTransport::new("10.0.0.9", SERVER_PORT).unwrap();
        assert_eq!(transport.endpoint(), "10.0.0.9:17444");
        assert_eq!(transport.url, "https://10.0.0.9:17444/");
    }

    #[tokio::test]
    async fn test_closed_port_is_retryable() {
        // Grab a free port, then close it again so nothing listens there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = HttpsTransport::new("127.0.0.1", port).unwrap();
        let failure = transport.invoke("get_queues_in_use", &[]).await.unwrap_err();

        assert!(failure.is_retryable(), "unexpected failure: {}", failure);
    }
}
