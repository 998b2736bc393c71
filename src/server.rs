//! HTTP trigger for pipeline runs.

use crate::application::pipeline::{RunTrigger, Trigger};
use crate::config::ServerConfig;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
struct StatusBody {
    status: u16,
    message: &'static str,
}

pub fn router(trigger: Arc<dyn RunTrigger>) -> Router {
    Router::new()
        .route("/split-videos", get(split_videos).post(split_videos))
        .fallback(not_found)
        .with_state(trigger)
}

/// Starts a run in the background and answers straight away.
async fn split_videos(State(trigger): State<Arc<dyn RunTrigger>>) -> Json<StatusBody> {
    let message = match trigger.trigger() {
        Trigger::Started => {
            info!("Pipeline run triggered");
            "Processing started"
        }
        Trigger::AlreadyRunning => {
            info!("Trigger ignored, a run is already in progress");
            "Processing already running"
        }
    };
    Json(StatusBody {
        status: 200,
        message,
    })
}

async fn not_found() -> (StatusCode, Json<StatusBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(StatusBody {
            status: 404,
            message: "Invalid route",
        }),
    )
}

pub async fn serve(config: &ServerConfig, trigger: Arc<dyn RunTrigger>) -> io::Result<()> {
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port)).await?;
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, router(trigger)).await
}
