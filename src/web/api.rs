//! JSON handlers for the landing-page demo.
//!
//! Handlers return an [`ApiReply`] (status + JSON body); the server turns it
//! into a `tiny_http` response.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::surface::Submission;

use super::DemoState;

/// Status code and JSON body for one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub(super) fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// `POST /api/optimize` request body.
#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    text: String,
}

/// `POST /api/optimize` — run the demo surface once.
///
/// Optimization failures are part of the surface state and come back as
/// `200` with `state: "error"`. A concurrent call gets `409`.
pub fn post_optimize(state: &DemoState, body: &str) -> ApiReply {
    let request: OptimizeRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(err) => return ApiReply::error(400, &format!("invalid JSON in optimize request: {err}")),
    };

    match state.controller.optimize(&request.text) {
        Submission::Busy => ApiReply::error(409, "an optimization is already running"),
        Submission::Settled(ui_state) => ApiReply::ok(json!({
            "ui": ui_state,
            "rendered": state.controller.render(),
            "totals": state.controller.totals(),
        })),
    }
}

/// `POST /api/clear` — return the demo to idle.
pub fn post_clear(state: &DemoState) -> ApiReply {
    state.controller.clear();
    ApiReply::ok(json!({ "ui": state.controller.state() }))
}

/// `GET /api/stats` — persisted running totals.
pub fn get_stats(state: &DemoState) -> ApiReply {
    match state.controller.totals() {
        Some(stats) => ApiReply::ok(json!(stats)),
        None => ApiReply::error(500, "stats are unavailable"),
    }
}

/// `GET /api/health` — whether the remote optimizer answers.
pub fn get_health(state: &DemoState) -> ApiReply {
    ApiReply::ok(json!({
        "api_online": state.client.check_health(),
        "api_url": state.client.base_url(),
        "busy": state.controller.is_busy(),
    }))
}
