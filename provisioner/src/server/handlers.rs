//! HTTP request handlers of the on-device status service

use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Root response
#[derive(Debug, Serialize, Deserialize)]
pub struct HelloResponse {
    pub status: String,
    pub message: String,
}

/// Root handler
pub async fn hello_handler() -> impl IntoResponse {
    Json(HelloResponse {
        status: "success".to_string(),
        message: "reMarkable webserver is running!".to_string(),
    })
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub device: String,
    pub service: String,
}

/// Status handler
pub async fn status_handler() -> impl IntoResponse {
    Json(StatusResponse {
        status: "online".to_string(),
        device: "reMarkable".to_string(),
        service: "webserver".to_string(),
    })
}
