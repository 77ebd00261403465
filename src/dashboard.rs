use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Local};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;

use crate::model::{DerivedStatus, CAPACITY};

/// Everything a presentation client needs to draw the lot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardView {
    /// Last successfully derived status; kept through failed cycles.
    pub status: Option<DerivedStatus>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_update: Option<DateTime<Local>>,
}

pub fn channel() -> (watch::Sender<DashboardView>, watch::Receiver<DashboardView>) {
    watch::channel(DashboardView::default())
}

/// One-line text rendering, used for logs and the plain-text endpoint.
pub fn summary_line(view: &DashboardView) -> String {
    let mut line = match &view.status {
        Some(s) => format!(
            "[ lot ] {}  free={}/{}  used={} ({}%)  in={}  out={}  device_free={}",
            s.label(),
            s.slots_available,
            CAPACITY,
            s.slots_occupied,
            s.occupancy_percent.round() as i64,
            s.vehicles_in_today,
            s.vehicles_out_today,
            s.slots_remaining_reported,
        ),
        None => "[ lot ] waiting for first reading".to_string(),
    };
    if let Some(err) = &view.error {
        line.push_str(&format!("  ERROR: {}", err));
    }
    if view.loading {
        line.push_str("  (updating)");
    } else if let Some(ts) = view.last_update {
        line.push_str(&format!("  at {}", ts.format("%H:%M:%S")));
    }
    line
}

// ---------- HTTP surface ----------

#[derive(Clone)]
struct AppState {
    view: watch::Receiver<DashboardView>,
}

pub fn router(view: watch::Receiver<DashboardView>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/status", get(api_status))
        .route("/api/summary", get(api_summary))
        .route("/api/live", get(api_live))
        .with_state(AppState { view })
}

async fn api_status(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.view.borrow().clone())
}

async fn api_summary(State(state): State<AppState>) -> String {
    summary_line(&state.view.borrow())
}

async fn api_live(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.view.clone();
    ws.on_upgrade(move |socket| live_socket(socket, rx))
}

async fn live_socket(socket: WebSocket, mut rx: watch::Receiver<DashboardView>) {
    let (mut sender, mut receiver) = socket.split();
    let mut dirty = true;

    loop {
        if dirty {
            let payload = match serde_json::to_string(&*rx.borrow_and_update()) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("failed to encode view: {}", e);
                    break;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }

        dirty = tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                true
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // server->client only; anything else is ignored
                _ => false,
            },
        };
    }
    tracing::debug!("live client disconnected");
}

pub async fn serve<F>(
    bind_addr: &str,
    view: watch::Receiver<DashboardView>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind dashboard listener at {}", bind_addr))?;
    tracing::info!("dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(view))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
