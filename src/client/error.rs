//! Typed failure taxonomy for the optimization client.
//!
//! Every failure of an optimize call is converted into one of these variants
//! before it leaves [`OptimizationClient::optimize`](super::OptimizationClient::optimize).
//! Surfaces match on the variant to choose the inline message and whether a
//! retry hint is shown.

use thiserror::Error;

pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// The parts of a reply that stay valid when only the CO₂ figure is
/// undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSavings {
    pub optimized_text: String,
    pub token_reduction_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    /// Input was empty or whitespace-only. No request was issued.
    #[error("prompt cannot be empty")]
    EmptyInput,

    /// No response arrived within the configured bound.
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Network-level failure (DNS, refused connection, reset, TLS).
    #[error("network error: {0}")]
    Transport(String),

    /// The optimizer answered with a non-success status.
    #[error("optimizer returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// The body could not be parsed or lacked a required field.
    #[error("malformed optimizer response: {0}")]
    MalformedResponse(String),

    /// The reported original emission was zero, so no CO₂ percentage
    /// exists. Carries whatever else the reply yielded.
    #[error("CO2 savings percentage is undefined for a zero original emission")]
    DivisionHazard(Option<PartialSavings>),

    /// Optimization is switched off in `[settings]`.
    #[error("optimization is disabled in settings")]
    Disabled,
}

impl OptimizeError {
    /// Short machine-readable code used in JSON payloads and logs.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::DivisionHazard(_) => "DIVISION_HAZARD",
            Self::Disabled => "DISABLED",
        }
    }

    /// Whether re-issuing the same request may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Message shown inline on a surface.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Please enter a prompt to optimize.".to_string(),
            Self::Timeout { .. } => "Request timed out. Please try again.".to_string(),
            Self::Transport(_) => "Network error. Check your internet connection.".to_string(),
            Self::Remote { message, .. } => message.clone(),
            Self::MalformedResponse(_) => {
                "The optimizer sent an unexpected response. Your original prompt is unchanged."
                    .to_string()
            }
            Self::DivisionHazard(_) => "CO\u{2082} saved: N/A".to_string(),
            Self::Disabled => "PromptGreen is disabled in settings.".to_string(),
        }
    }
}
