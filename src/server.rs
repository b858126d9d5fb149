// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API for the harvester.
//!
//! `GET /api/generate/:client_id` runs the full pipeline and streams
//! progress as SSE; the terminal event is `Done` or `Failed`. Artifacts are
//! served from an allow-list only, so nothing else under the download
//! directory is reachable.

use crate::config::{load_clients, Settings};
use crate::progress::{self, ProgressEventKind, ProgressScope};
use crate::reports;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for all handlers.
pub struct AppState {
    pub settings: Settings,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/clients", get(list_clients))
        .route("/api/generate/:client_id", get(generate))
        .route("/api/files/:client_id/:filename", get(serve_file))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given port.
pub async fn start(port: u16, settings: Settings) -> anyhow::Result<()> {
    let state = Arc::new(AppState { settings });
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("harvester API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn list_clients(State(state): State<Arc<AppState>>) -> Json<Value> {
    let clients = load_clients(&state.settings.clients_file).unwrap_or_default();
    let list: Vec<Value> = clients
        .iter()
        .map(|(id, client)| {
            json!({
                "id": id,
                "name": client.name_or(id),
                "team_id": client.team_id,
            })
        })
        .collect();
    Json(json!(list))
}

/// Run the pipeline for one client, streaming progress as SSE until the
/// terminal `Done`/`Failed` event.
async fn generate(
    UrlPath(client_id): UrlPath<String>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = progress::channel();
    let request_id = uuid::Uuid::new_v4().to_string();
    let settings = state.settings.clone();

    let mut scope = ProgressScope::new(Some(tx), request_id);
    tokio::spawn(async move {
        let attempts = crate::acquisition::DEFAULT_MAX_ATTEMPTS;
        match reports::fetch_all(&settings, &client_id, attempts, &mut scope).await {
            Ok(fetched) => scope.emit(ProgressEventKind::Done {
                message: format!(
                    "reports ready: {} and {}",
                    fetched.people.display(),
                    fetched.email_activity.display()
                ),
            }),
            Err(e) => scope.emit(ProgressEventKind::Failed {
                message: format!("{e:#}"),
            }),
        }
    });

    let stream = async_stream::stream! {
        let mut events = BroadcastStream::new(rx);
        while let Some(item) = events.next().await {
            // A lagged receiver skips the overwritten events and catches up.
            let Ok(event) = item else { continue };
            let terminal = matches!(
                event.event,
                ProgressEventKind::Done { .. } | ProgressEventKind::Failed { .. }
            );
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<_, Infallible>(Event::default().event("message").data(data));
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keepalive"),
    )
}

async fn serve_file(
    UrlPath((client_id, filename)): UrlPath<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !is_allowed_artifact(&filename) || !is_safe_client_id(&client_id) {
        return not_found();
    }

    let path = state.settings.download_dir.join(&client_id).join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mut response = bytes.into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
            if let Ok(disposition) =
                HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            {
                response
                    .headers_mut()
                    .insert(header::CONTENT_DISPOSITION, disposition);
            }
            response
        }
        Err(_) => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "File not found" }))).into_response()
}

/// Only the two fixed artifact names are ever served.
fn is_allowed_artifact(filename: &str) -> bool {
    matches!(filename, "people.csv" | "email_activity.csv")
}

/// Client ids are flat registry keys; anything that could traverse the
/// filesystem is rejected.
fn is_safe_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && !client_id.contains('/')
        && !client_id.contains('\\')
        && !client_id.contains("..")
}
