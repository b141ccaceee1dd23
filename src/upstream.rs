//! Upstream connector
//!
//! Opens the streaming chat-completion request against the OpenAI-compatible
//! API. The upstream host is resolved to an IPv4 address and the socket is
//! pinned to it, while TLS SNI, certificate validation, and the Host header
//! keep using the logical host name. This decouples DNS from TLS identity:
//! a misbehaving resolver cannot redirect the request to a host that does
//! not hold the real certificate.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::types::UpstreamChatRequest;

/// Client for the upstream chat-completions endpoint.
pub struct UpstreamClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.openai_api_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            timeout: Duration::from_secs(config.upstream_timeout_secs),
        }
    }

    /// POST the request upstream and hand back the live streaming response.
    ///
    /// Non-2xx responses have their body drained and come back as
    /// [`AppError::Upstream`]; transport failures are classified into the
    /// DNS / connection-refused / timeout / network taxonomy.
    pub async fn chat_completions_stream(
        &self,
        request: &UpstreamChatRequest,
    ) -> AppResult<reqwest::Response> {
        let url = Url::parse(&format!("{}/chat/completions", self.base_url))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid upstream URL: {}", e)))?;

        let client = self.pinned_client(&url).await?;

        info!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "Forwarding chat completion upstream"
        );

        let response = client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            // Drain the error body; only the status is surfaced to the client
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Upstream API returned an error");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Build a client with the upstream host pinned to its resolved IPv4
    /// address. Resolution failure falls back to the literal host name and
    /// lets the connection attempt fail downstream if it must.
    async fn pinned_client(&self, url: &Url) -> AppResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);

        if url.scheme() == "https" {
            if let Some(host) = url.host_str() {
                if host.parse::<IpAddr>().is_err() {
                    let port = url.port().unwrap_or(443);
                    match resolve_ipv4(host, port).await {
                        Some(addr) => {
                            debug!(host = %host, addr = %addr, "Pinned upstream host to resolved address");
                            builder = builder.resolve(host, addr);
                        }
                        None => {
                            warn!(host = %host, "DNS resolution failed, connecting by literal host name");
                        }
                    }
                }
            }
        }

        builder
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
    }
}

/// First IPv4 address the system resolver returns for the host, if any.
async fn resolve_ipv4(host: &str, port: u16) -> Option<SocketAddr> {
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => addrs.find(|a| a.is_ipv4()),
        Err(e) => {
            warn!(host = %host, error = %e, "Upstream host resolution failed");
            None
        }
    }
}

/// Map a reqwest transport failure onto the client-visible error taxonomy.
fn classify_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        return AppError::Timeout;
    }

    if e.is_connect() {
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        return AppError::ConnectionRefused(e.to_string());
                    }
                    std::io::ErrorKind::TimedOut => return AppError::Timeout,
                    _ => {}
                }
            }
            source = inner.source();
        }

        let message = e.to_string();
        if message.contains("dns") {
            return AppError::Dns(message);
        }
        return AppError::Network(message);
    }

    AppError::Network(e.to_string())
}
