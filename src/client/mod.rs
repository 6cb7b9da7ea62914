/// Optimization client — the one place prompts are sent to the remote optimizer.
///
/// The client owns the whole request/response cycle:
///
/// 1. Trim the input and reject it if nothing is left.
/// 2. Pick a [`Mode`] from the trimmed length via [`ModePolicy`].
/// 3. Build the mode's payload and post it through a [`Transport`].
/// 4. Validate the reply and derive the percentage metrics.
///
/// The call is bounded by a deadline enforced here rather than by the
/// transport, so a transport that never returns still yields
/// [`OptimizeError::Timeout`]. The client never touches persisted stats.
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod error;
pub mod transport;

pub use error::{OptimizeError, OptimizeResult, PartialSavings};
pub use transport::{HttpReply, Transport, UreqTransport};

use crate::config::schema::{ApiConfig, PolicyConfig};
use crate::utils::word_count::count_words;

/// Deadline for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Request model
// ---------------------------------------------------------------------------

/// Which remote operation handles a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Balanced optimize: `{text, model_name}` → `balanced`.
    ShortForm,
    /// Summarize: `{text, max_length, min_length, top_keywords}` → `summarized`.
    LongForm,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortForm => write!(f, "short-form"),
            Self::LongForm => write!(f, "long-form"),
        }
    }
}

/// Threshold rule choosing between the two remote operation shapes.
///
/// Short prompts go to the balanced optimizer, which rewrites in place.
/// Long prompts go to the summarizer with fixed length and keyword bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ModePolicy {
    pub long_form_threshold_chars: usize,
    pub summary_max_length: u32,
    pub summary_min_length: u32,
    pub top_keywords: u32,
}

impl Default for ModePolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

impl ModePolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            long_form_threshold_chars: config.long_form_threshold_chars,
            summary_max_length: config.summary_max_length,
            summary_min_length: config.summary_min_length,
            top_keywords: config.top_keywords,
        }
    }

    /// Select a mode for already-trimmed text, counting Unicode scalar values.
    pub fn select(&self, trimmed: &str) -> Mode {
        if trimmed.chars().count() < self.long_form_threshold_chars {
            Mode::ShortForm
        } else {
            Mode::LongForm
        }
    }
}

/// A validated, transient optimize request.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    /// The trimmed prompt. Never empty.
    pub raw_text: String,
    pub model_name: Option<String>,
    pub mode: Mode,
}

impl OptimizationRequest {
    /// Trim `raw`, reject empty input, and select the mode.
    pub fn new(raw: &str, model_name: Option<String>, policy: &ModePolicy) -> OptimizeResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OptimizeError::EmptyInput);
        }
        Ok(Self {
            raw_text: trimmed.to_string(),
            model_name,
            mode: policy.select(trimmed),
        })
    }

    /// JSON body for the selected mode.
    fn payload(&self, policy: &ModePolicy, default_model: &str) -> Value {
        match self.mode {
            Mode::ShortForm => serde_json::json!({
                "text": self.raw_text,
                "model_name": self.model_name.as_deref().unwrap_or(default_model),
            }),
            Mode::LongForm => serde_json::json!({
                "text": self.raw_text,
                "max_length": policy.summary_max_length,
                "min_length": policy.summary_min_length,
                "top_keywords": policy.top_keywords,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Result model
// ---------------------------------------------------------------------------

/// Normalized outcome of a successful optimize call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub mode: Mode,
    pub optimized_text: String,
    /// Percentage decrease in estimated emissions, clamped to `[0, 100]`.
    pub co2_saved_percent: f64,
    /// Percentage decrease in word count. Negative when the optimizer grew
    /// the prompt.
    pub token_reduction_percent: f64,
    pub raw_original_emission: f64,
    pub raw_optimized_emission: f64,
    pub original_word_count: usize,
    pub optimized_word_count: usize,
    pub latency_ms: u64,
}

impl OptimizationResult {
    /// Words removed, floored at zero. Added to the running "tokens saved".
    pub fn tokens_saved(&self) -> u64 {
        self.original_word_count
            .saturating_sub(self.optimized_word_count) as u64
    }

    /// Grams of CO₂ avoided, floored at zero.
    pub fn co2_reduced_grams(&self) -> f64 {
        (self.raw_original_emission - self.raw_optimized_emission).max(0.0)
    }
}

/// Wire shape of both optimizer replies. Only the fields we read are listed;
/// everything else in the body is ignored.
#[derive(Debug, Deserialize)]
struct RemoteReply {
    balanced: Option<String>,
    summarized: Option<String>,
    co2emission_original: Option<f64>,
    co2emission_balanced: Option<f64>,
}

/// Error body shapes: `{"message": ...}` or FastAPI's `{"detail": ...}`.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    message: Option<String>,
    detail: Option<Value>,
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// `(original - optimized) / original * 100`, clamped to `[0, 100]`.
///
/// Fails with [`OptimizeError::DivisionHazard`] when `original` is zero and
/// with [`OptimizeError::MalformedResponse`] for negative or non-finite
/// emissions, so `NaN` and infinities never reach a surface.
pub fn co2_saved_percent(original: f64, optimized: f64) -> OptimizeResult<f64> {
    if !original.is_finite() || !optimized.is_finite() {
        return Err(OptimizeError::MalformedResponse(
            "emission values must be finite".to_string(),
        ));
    }
    if original < 0.0 || optimized < 0.0 {
        return Err(OptimizeError::MalformedResponse(
            "emission values must not be negative".to_string(),
        ));
    }
    if original == 0.0 {
        return Err(OptimizeError::DivisionHazard(None));
    }
    Ok(((original - optimized) / original * 100.0).clamp(0.0, 100.0))
}

/// `(original - optimized) / original * 100` over word counts.
///
/// An empty original has nothing to reduce and reports `0.0`.
pub fn token_reduction_percent(original_words: usize, optimized_words: usize) -> f64 {
    if original_words == 0 {
        return 0.0;
    }
    (original_words as f64 - optimized_words as f64) / original_words as f64 * 100.0
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Blocking client for the remote optimizer.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct OptimizationClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    short_form_path: String,
    long_form_path: String,
    health_path: String,
    model_name: String,
    timeout: Duration,
    policy: ModePolicy,
}

impl std::fmt::Debug for OptimizationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationClient")
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OptimizationClient {
    /// Build a client that talks HTTP through `ureq`.
    pub fn from_config(api: &ApiConfig, policy: &PolicyConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(api.skip_browser_warning));
        Self::with_transport(api, policy, transport)
    }

    /// Build a client over an arbitrary transport.
    pub fn with_transport(
        api: &ApiConfig,
        policy: &PolicyConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            transport,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            short_form_path: normalize_path(&api.short_form_path),
            long_form_path: normalize_path(&api.long_form_path),
            health_path: normalize_path(&api.health_path),
            model_name: api.model_name.clone(),
            timeout: Duration::from_millis(api.timeout_ms),
            policy: ModePolicy::from_config(policy),
        }
    }

    /// Override the call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Optimize a prompt.
    ///
    /// Fails with [`OptimizeError::EmptyInput`] before any network traffic
    /// when the trimmed input is empty.
    pub fn optimize(&self, raw_text: &str, model_name: Option<&str>) -> OptimizeResult<OptimizationResult> {
        let request = OptimizationRequest::new(
            raw_text,
            model_name.map(str::to_string),
            &self.policy,
        )?;
        self.send(&request)
    }

    /// Send an already-validated request.
    pub fn send(&self, request: &OptimizationRequest) -> OptimizeResult<OptimizationResult> {
        let url = self.endpoint(request.mode);
        let body = request.payload(&self.policy, &self.model_name);

        tracing::debug!(mode = %request.mode, %url, chars = request.raw_text.len(), "sending optimize request");

        let start = Instant::now();
        let reply = self.call_with_deadline(url, body)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = normalize_reply(request, &reply, latency_ms);
        match &result {
            Ok(res) => tracing::info!(
                mode = %request.mode,
                latency_ms,
                co2_saved_percent = res.co2_saved_percent,
                token_reduction_percent = res.token_reduction_percent,
                "optimization succeeded"
            ),
            Err(err) => tracing::warn!(mode = %request.mode, latency_ms, code = err.code(), error = %err, "optimization failed"),
        }
        result
    }

    /// Probe the optimizer's health endpoint. Any failure reads as offline.
    pub fn check_health(&self) -> bool {
        let url = format!("{}{}", self.base_url, self.health_path);
        match self.transport.get(&url, HEALTH_TIMEOUT) {
            Ok(reply) => reply.is_success(),
            Err(err) => {
                tracing::debug!(%url, error = %err, "health check failed");
                false
            }
        }
    }

    fn endpoint(&self, mode: Mode) -> String {
        let path = match mode {
            Mode::ShortForm => &self.short_form_path,
            Mode::LongForm => &self.long_form_path,
        };
        format!("{}{}", self.base_url, path)
    }

    /// Run the transport on a worker thread and wait at most `self.timeout`.
    ///
    /// A transport that overruns the deadline is abandoned; its eventual
    /// reply is dropped with the channel.
    fn call_with_deadline(&self, url: String, body: Value) -> OptimizeResult<HttpReply> {
        let (tx, rx) = mpsc::sync_channel(1);
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;

        thread::Builder::new()
            .name("promptgreen-optimize".to_string())
            .spawn(move || {
                let _ = tx.send(transport.post_json(&url, &body, timeout));
            })
            .map_err(|err| OptimizeError::Transport(format!("failed to spawn request worker: {err}")))?;

        match rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(OptimizeError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(OptimizeError::Transport(
                "request worker exited without a reply".to_string(),
            )),
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Turn a raw reply into a result or a typed error.
fn normalize_reply(
    request: &OptimizationRequest,
    reply: &HttpReply,
    latency_ms: u64,
) -> OptimizeResult<OptimizationResult> {
    if !reply.is_success() {
        return Err(OptimizeError::Remote {
            status: reply.status,
            message: remote_message(reply),
        });
    }

    let parsed: RemoteReply = serde_json::from_str(&reply.body)
        .map_err(|err| OptimizeError::MalformedResponse(format!("invalid JSON: {err}")))?;

    let (text_field, optimized_text) = match request.mode {
        Mode::ShortForm => ("balanced", parsed.balanced),
        Mode::LongForm => ("summarized", parsed.summarized),
    };
    let optimized_text = optimized_text
        .ok_or_else(|| OptimizeError::MalformedResponse(format!("missing field `{text_field}`")))?;
    if optimized_text.trim().is_empty() {
        return Err(OptimizeError::MalformedResponse(format!(
            "field `{text_field}` is empty"
        )));
    }

    let original = parsed.co2emission_original.ok_or_else(|| {
        OptimizeError::MalformedResponse("missing field `co2emission_original`".to_string())
    })?;
    let optimized = parsed.co2emission_balanced.ok_or_else(|| {
        OptimizeError::MalformedResponse("missing field `co2emission_balanced`".to_string())
    })?;

    let optimized_text = optimized_text.trim().to_string();
    let original_word_count = count_words(&request.raw_text);
    let optimized_word_count = count_words(&optimized_text);
    let token_reduction_percent = token_reduction_percent(original_word_count, optimized_word_count);

    let co2_saved_percent = co2_saved_percent(original, optimized).map_err(|err| match err {
        OptimizeError::DivisionHazard(_) => OptimizeError::DivisionHazard(Some(PartialSavings {
            optimized_text: optimized_text.clone(),
            token_reduction_percent,
        })),
        other => other,
    })?;

    Ok(OptimizationResult {
        mode: request.mode,
        optimized_text,
        co2_saved_percent,
        token_reduction_percent,
        raw_original_emission: original,
        raw_optimized_emission: optimized,
        original_word_count,
        optimized_word_count,
        latency_ms,
    })
}

/// Best message for a non-success reply: the server's own words if any.
fn remote_message(reply: &HttpReply) -> String {
    if let Ok(body) = serde_json::from_str::<RemoteErrorBody>(&reply.body) {
        if let Some(message) = body.message.filter(|m| !m.trim().is_empty()) {
            return message;
        }
        match body.detail {
            Some(Value::String(detail)) if !detail.trim().is_empty() => return detail,
            Some(detail @ (Value::Array(_) | Value::Object(_))) => return detail.to_string(),
            _ => {}
        }
    }
    if reply.status_text.trim().is_empty() {
        format!("API Error: {}", reply.status)
    } else {
        format!("API Error: {} {}", reply.status, reply.status_text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn short_request(text: &str) -> OptimizationRequest {
        OptimizationRequest::new(text, None, &ModePolicy::default()).unwrap()
    }

    #[test]
    fn mode_boundary_is_inclusive_at_threshold() {
        let policy = ModePolicy::default();
        assert_eq!(policy.select(&"a".repeat(349)), Mode::ShortForm);
        assert_eq!(policy.select(&"a".repeat(350)), Mode::LongForm);
    }

    #[test]
    fn mode_counts_characters_not_bytes() {
        let policy = ModePolicy::default();
        // 349 two-byte characters are still a short prompt.
        assert_eq!(policy.select(&"é".repeat(349)), Mode::ShortForm);
    }

    #[test]
    fn request_trims_before_selecting_mode() {
        let padded = format!("   {}   ", "a".repeat(349));
        let request = OptimizationRequest::new(&padded, None, &ModePolicy::default()).unwrap();
        assert_eq!(request.mode, Mode::ShortForm);
        assert_eq!(request.raw_text.len(), 349);
    }

    #[test]
    fn blank_request_is_rejected() {
        let err = OptimizationRequest::new(" \n\t", None, &ModePolicy::default()).unwrap_err();
        assert_eq!(err, OptimizeError::EmptyInput);
    }

    #[test]
    fn short_form_payload_carries_model() {
        let request = OptimizationRequest::new("hi there", Some("gpt-3.5".into()), &ModePolicy::default())
            .unwrap();
        let body = request.payload(&ModePolicy::default(), "gpt-4");
        assert_eq!(body["text"], "hi there");
        assert_eq!(body["model_name"], "gpt-3.5");
        assert!(body.get("max_length").is_none());
    }

    #[test]
    fn short_form_payload_falls_back_to_default_model() {
        let body = short_request("hi there").payload(&ModePolicy::default(), "gpt-4");
        assert_eq!(body["model_name"], "gpt-4");
    }

    #[test]
    fn long_form_payload_carries_summary_bounds() {
        let policy = ModePolicy::default();
        let request = OptimizationRequest::new(&"word ".repeat(100), None, &policy).unwrap();
        assert_eq!(request.mode, Mode::LongForm);
        let body = request.payload(&policy, "gpt-4");
        assert_eq!(body["max_length"], 50);
        assert_eq!(body["min_length"], 20);
        assert_eq!(body["top_keywords"], 5);
        assert!(body.get("model_name").is_none());
    }

    #[test]
    fn co2_percent_from_emission_delta() {
        let pct = co2_saved_percent(4.0, 1.0).unwrap();
        assert!((pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn co2_percent_zero_original_is_division_hazard() {
        assert_eq!(co2_saved_percent(0.0, 0.0), Err(OptimizeError::DivisionHazard(None)));
        assert_eq!(co2_saved_percent(0.0, 1.0), Err(OptimizeError::DivisionHazard(None)));
    }

    #[test]
    fn co2_percent_clamps_growth_to_zero() {
        assert_eq!(co2_saved_percent(1.0, 2.0).unwrap(), 0.0);
    }

    #[test]
    fn co2_percent_rejects_non_finite() {
        assert!(matches!(
            co2_saved_percent(f64::NAN, 1.0),
            Err(OptimizeError::MalformedResponse(_))
        ));
        assert!(matches!(
            co2_saved_percent(1.0, f64::INFINITY),
            Err(OptimizeError::MalformedResponse(_))
        ));
    }

    #[test]
    fn token_reduction_from_word_counts() {
        assert!((token_reduction_percent(10, 6) - 40.0).abs() < 1e-9);
        assert!((token_reduction_percent(4, 5) + 25.0).abs() < 1e-9);
        assert_eq!(token_reduction_percent(0, 3), 0.0);
    }

    #[test]
    fn normalize_short_form_reply() {
        let request = short_request("please could you kindly write a poem about rust");
        let reply = HttpReply::ok(
            r#"{"original":"x","balanced":"write poem about rust","co2emission_original":2.0,"co2emission_balanced":0.5}"#,
        );
        let result = normalize_reply(&request, &reply, 12).unwrap();
        assert_eq!(result.optimized_text, "write poem about rust");
        assert_eq!(result.original_word_count, 9);
        assert_eq!(result.optimized_word_count, 4);
        assert_eq!(result.tokens_saved(), 5);
        assert!((result.co2_saved_percent - 75.0).abs() < 1e-9);
        assert!((result.co2_reduced_grams() - 1.5).abs() < 1e-9);
        assert_eq!(result.latency_ms, 12);
    }

    #[test]
    fn short_form_reply_without_balanced_is_malformed() {
        let request = short_request("hello world");
        let reply = HttpReply::ok(
            r#"{"summarized":"hi","co2emission_original":1.0,"co2emission_balanced":0.5}"#,
        );
        let err = normalize_reply(&request, &reply, 0).unwrap_err();
        assert!(matches!(err, OptimizeError::MalformedResponse(msg) if msg.contains("balanced")));
    }

    #[test]
    fn reply_without_emissions_is_malformed() {
        let request = short_request("hello world");
        let reply = HttpReply::ok(r#"{"balanced":"hello"}"#);
        assert!(matches!(
            normalize_reply(&request, &reply, 0),
            Err(OptimizeError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_json_reply_is_malformed() {
        let request = short_request("hello world");
        let reply = HttpReply::ok("<html>tunnel warning</html>");
        assert!(matches!(
            normalize_reply(&request, &reply, 0),
            Err(OptimizeError::MalformedResponse(_))
        ));
    }

    #[test]
    fn remote_error_prefers_server_message() {
        let reply = HttpReply::with_status(400, "Bad Request", r#"{"message":"text too long"}"#);
        assert_eq!(remote_message(&reply), "text too long");

        let reply = HttpReply::with_status(503, "Service Unavailable", r#"{"detail":"Models not loaded"}"#);
        assert_eq!(remote_message(&reply), "Models not loaded");

        let reply = HttpReply::with_status(502, "Bad Gateway", "upstream down");
        assert_eq!(remote_message(&reply), "API Error: 502 Bad Gateway");
    }

    #[test]
    fn non_success_status_becomes_remote_error() {
        let request = short_request("hello world");
        let reply = HttpReply::with_status(503, "Service Unavailable", r#"{"detail":"Models not loaded"}"#);
        assert_eq!(
            normalize_reply(&request, &reply, 0),
            Err(OptimizeError::Remote {
                status: 503,
                message: "Models not loaded".to_string()
            })
        );
    }

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize_path("optimize"), "/optimize");
        assert_eq!(normalize_path("/optimize"), "/optimize");
    }
}
