/// HTTP transport seam for the optimization client.
///
/// [`Transport`] is the only place the client touches the network. The
/// production implementation, [`UreqTransport`], uses the synchronous `ureq`
/// client; tests substitute canned or blocking transports.
///
/// Transports report network-level failures as [`OptimizeError::Transport`]
/// or [`OptimizeError::Timeout`]. Non-success HTTP statuses are *not* errors
/// at this layer: they come back as an [`HttpReply`] so the client can pull
/// the server's message out of the body.
use std::io;
use std::time::Duration;

use serde_json::Value;

use super::error::{OptimizeError, OptimizeResult};

// ---------------------------------------------------------------------------
// Reply type
// ---------------------------------------------------------------------------

/// A completed HTTP exchange, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpReply {
    /// Build a `200 OK` reply with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    /// Build a reply with an arbitrary status.
    pub fn with_status(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Blocking HTTP transport used by [`OptimizationClient`](super::OptimizationClient).
///
/// Implementations must be shareable across threads: the client runs each
/// call on a worker thread so it can enforce its own deadline even when a
/// transport never returns.
pub trait Transport: Send + Sync {
    /// `POST` a JSON body and return the reply.
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> OptimizeResult<HttpReply>;

    /// `GET` a URL and return the reply.
    fn get(&self, url: &str, timeout: Duration) -> OptimizeResult<HttpReply>;
}

// ---------------------------------------------------------------------------
// ureq implementation
// ---------------------------------------------------------------------------

/// Production transport backed by a shared `ureq` agent.
#[derive(Debug)]
pub struct UreqTransport {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
}

impl UreqTransport {
    pub fn new(skip_browser_warning: bool) -> Self {
        let mut headers = Vec::new();
        if skip_browser_warning {
            // Tunnelled optimizer deployments interpose an HTML warning page
            // unless this header is present.
            headers.push((
                "ngrok-skip-browser-warning".to_string(),
                "true".to_string(),
            ));
        }
        Self {
            agent: ureq::AgentBuilder::new().build(),
            headers,
        }
    }

    fn apply_headers(&self, mut request: ureq::Request) -> ureq::Request {
        for (name, value) in &self.headers {
            request = request.set(name, value);
        }
        request
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> OptimizeResult<HttpReply> {
        // On Windows, "localhost" may try IPv6 (::1) first, causing delays
        // when the optimizer only binds to IPv4.
        let url = url.replace("://localhost", "://127.0.0.1");
        let request = self.apply_headers(self.agent.post(&url).timeout(timeout));
        into_reply(request.send_json(body), timeout)
    }

    fn get(&self, url: &str, timeout: Duration) -> OptimizeResult<HttpReply> {
        let url = url.replace("://localhost", "://127.0.0.1");
        let request = self.apply_headers(self.agent.get(&url).timeout(timeout));
        into_reply(request.call(), timeout)
    }
}

/// Fold a `ureq` outcome into an [`HttpReply`] or a typed transport error.
fn into_reply(
    result: Result<ureq::Response, ureq::Error>,
    timeout: Duration,
) -> OptimizeResult<HttpReply> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(if is_timeout(&transport) {
                OptimizeError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                }
            } else {
                OptimizeError::Transport(transport.to_string())
            });
        }
    };

    let status = response.status();
    let status_text = response.status_text().to_string();
    let body = response.into_string().map_err(|err| {
        if err.kind() == io::ErrorKind::TimedOut {
            OptimizeError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }
        } else {
            OptimizeError::Transport(format!("failed to read response body: {err}"))
        }
    })?;

    Ok(HttpReply {
        status,
        status_text,
        body,
    })
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        {
            return true;
        }
        source = err.source();
    }
    false
}
