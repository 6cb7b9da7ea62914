//! Landing-page demo surface.
//!
//! Provides a lightweight HTTP server (sync, via `tiny_http`) that serves:
//! - The single-page demo with a prompt box and live results
//! - JSON endpoints for optimizing, clearing, running totals, and health
//!
//! Launched via `promptgreen serve` (default: `http://127.0.0.1:9747`).
//! Requests are handled one at a time, and the demo's own single-flight
//! guard still rejects a second optimize while one is running.

mod api;
mod frontend;

use std::io::{Cursor, Read};

use anyhow::Result;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::client::OptimizationClient;
use crate::surface::SurfaceController;

pub use api::ApiReply;

/// Everything the demo handlers need.
#[derive(Debug)]
pub struct DemoState {
    pub controller: SurfaceController,
    pub client: OptimizationClient,
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Start the demo server on the given address. Blocks the current thread.
pub fn serve(addr: &str, state: DemoState) -> Result<()> {
    let server = Server::http(addr)
        .map_err(|e| anyhow::anyhow!("failed to start HTTP server on {addr}: {e}"))?;

    println!("promptgreen demo running at http://{addr}");
    println!("Press Ctrl+C to stop.\n");

    for mut request in server.incoming_requests() {
        let method = request.method().clone();
        let url = request.url().to_string();

        let body = if matches!(method, Method::Put | Method::Post | Method::Patch) {
            let mut buf = String::new();
            if let Err(err) = request.as_reader().read_to_string(&mut buf) {
                tracing::warn!(%url, error = %err, "failed to read request body");
            }
            Some(buf)
        } else {
            None
        };

        let response = match route(&state, &method, &url, body.as_deref()) {
            Route::Page => html_response(frontend::INDEX_HTML),
            Route::Api(reply) => json_response(&reply),
        };

        if let Err(err) = request.respond(response) {
            tracing::warn!(%url, error = %err, "failed to send response");
        }

        tracing::info!(%method, %url, "handled request");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// What a request resolves to.
#[derive(Debug)]
enum Route {
    Page,
    Api(ApiReply),
}

fn route(state: &DemoState, method: &Method, url: &str, body: Option<&str>) -> Route {
    let path = url.split('?').next().unwrap_or(url);

    match (method, path) {
        (&Method::Get, "/") | (&Method::Get, "/index.html") => Route::Page,
        (&Method::Post, "/api/optimize") => Route::Api(api::post_optimize(state, body.unwrap_or(""))),
        (&Method::Post, "/api/clear") => Route::Api(api::post_clear(state)),
        (&Method::Get, "/api/stats") => Route::Api(api::get_stats(state)),
        (&Method::Get, "/api/health") => Route::Api(api::get_health(state)),
        _ => Route::Api(ApiReply::error(404, "not found")),
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn json_response(reply: &ApiReply) -> Response<Cursor<Vec<u8>>> {
    let mut response = Response::from_data(reply.body.to_string().into_bytes())
        .with_status_code(StatusCode(reply.status));
    if let Some(header) = header("Content-Type", "application/json; charset=utf-8") {
        response = response.with_header(header);
    }
    response
}

fn html_response(html: &str) -> Response<Cursor<Vec<u8>>> {
    let mut response =
        Response::from_data(html.as_bytes().to_vec()).with_status_code(StatusCode(200));
    if let Some(header) = header("Content-Type", "text/html; charset=utf-8") {
        response = response.with_header(header);
    }
    response
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}
