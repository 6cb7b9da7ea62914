//! Presentation adapter: one controller per UI surface.
//!
//! The landing-page demo, the inline content-script button, and the popup
//! panel all drive the same [`SurfaceController`]. Only rendering differs
//! per [`Surface`] (see [`render`]).
//!
//! State machine:
//!
//! ```text
//! idle ──optimize (guard acquired)──▶ loading ──ok──▶ success
//!                                         └──err──▶ error
//! success | error ──clear / edit──▶ idle
//! ```
//!
//! An optimize request that finds the guard busy is dropped and leaves the
//! state untouched.

pub mod render;

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::client::{OptimizationClient, OptimizationResult, OptimizeError};
use crate::config::schema::SettingsConfig;
use crate::safety::SingleFlight;
use crate::stats::{Stats, StatsStore};

pub use render::render;

/// Which UI surface a controller backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Surface {
    LandingDemo,
    ContentScript,
    Popup,
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LandingDemo => write!(f, "landing-demo"),
            Self::ContentScript => write!(f, "content-script"),
            Self::Popup => write!(f, "popup"),
        }
    }
}

impl std::str::FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "landing" | "landing-demo" | "demo" => Ok(Self::LandingDemo),
            "content" | "content-script" | "inline" => Ok(Self::ContentScript),
            "popup" => Ok(Self::Popup),
            other => Err(format!(
                "unknown surface '{other}' (expected landing, content, or popup)"
            )),
        }
    }
}

/// What a surface is showing. Exactly one at a time.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum UiState {
    #[default]
    Idle,
    Loading,
    Success(OptimizationResult),
    Error(#[serde(serialize_with = "serialize_error")] OptimizeError),
}

impl UiState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

fn serialize_error<S: serde::Serializer>(err: &OptimizeError, s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;
    let mut st = s.serialize_struct("OptimizeError", 3)?;
    st.serialize_field("code", err.code())?;
    st.serialize_field("message", &err.user_message())?;
    st.serialize_field("retryable", &err.is_retryable())?;
    st.end()
}

/// Outcome of asking a surface to optimize.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The call ran; this is the state it settled in.
    Settled(UiState),
    /// Another call was already in flight. Nothing changed.
    Busy,
}

/// Drives one surface instance through the optimize state machine.
#[derive(Debug)]
pub struct SurfaceController {
    surface: Surface,
    client: OptimizationClient,
    stats: StatsStore,
    settings: SettingsConfig,
    model_name: Option<String>,
    guard: SingleFlight,
    state: Mutex<UiState>,
}

impl SurfaceController {
    pub fn new(
        surface: Surface,
        client: OptimizationClient,
        stats: StatsStore,
        settings: SettingsConfig,
    ) -> Self {
        Self {
            surface,
            client,
            stats,
            settings,
            model_name: None,
            guard: SingleFlight::new(),
            state: Mutex::new(UiState::Idle),
        }
    }

    /// Model name to send instead of the configured default.
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }

    pub fn state(&self) -> UiState {
        self.lock_state().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Run one optimize call for this surface.
    ///
    /// Blocks until the call settles. Stats are updated only on success; a
    /// persistence failure is logged and does not turn a successful
    /// optimization into an error.
    pub fn optimize(&self, raw_text: &str) -> Submission {
        let Some(_permit) = self.guard.enter() else {
            tracing::debug!(surface = %self.surface, "optimize dropped: call already in flight");
            return Submission::Busy;
        };

        if !self.settings.enabled {
            return Submission::Settled(self.settle(UiState::Error(OptimizeError::Disabled)));
        }

        self.set_state(UiState::Loading);

        let next = match self.client.optimize(raw_text, self.model_name.as_deref()) {
            Ok(result) => {
                if let Err(err) = self.stats.record_optimization(&result) {
                    tracing::warn!(surface = %self.surface, error = %err, "failed to persist stats");
                }
                UiState::Success(result)
            }
            Err(err) => UiState::Error(err),
        };

        Submission::Settled(self.settle(next))
    }

    /// Return to idle after the user clears the input.
    pub fn clear(&self) {
        self.reset_if_settled();
    }

    /// Return to idle after the user edits the input.
    pub fn edit_input(&self) {
        self.reset_if_settled();
    }

    /// Persisted running totals, if they can be read.
    pub fn totals(&self) -> Option<Stats> {
        match self.stats.load() {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::warn!(surface = %self.surface, error = %err, "failed to load stats");
                None
            }
        }
    }

    /// Render the current state for this surface.
    pub fn render(&self) -> String {
        render(self.surface, &self.state(), self.totals().as_ref(), &self.settings)
    }

    fn reset_if_settled(&self) {
        let mut state = self.lock_state();
        if state.is_settled() {
            *state = UiState::Idle;
        }
    }

    fn settle(&self, next: UiState) -> UiState {
        self.set_state(next.clone());
        next
    }

    fn set_state(&self, next: UiState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, UiState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
