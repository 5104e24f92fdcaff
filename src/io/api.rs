//! REST client for the worker application server
//!
//! Endpoints (JSON bodies, session cookie replayed by the client):
//! - POST /attendance/checkin             {latitude, longitude, accuracy}
//! - POST /orders/update-progress/{id}    {progress}
//! - POST /orders/complete/{id}
//! - GET  /notifications/mark-read/{id}
//! - GET  /notifications?unread_only=true
//!
//! Every write answers `{success, message}`. A `success: false` answer is
//! surfaced as `ApiError::Rejected` carrying the server's message.

use crate::domain::attendance::{AttendanceSession, Notification, Progress};
use crate::domain::types::{NotificationId, OrderId, PositionSample};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Log a failed request (cold path)
#[cold]
fn log_request_failed(endpoint: &str, e: &ApiError) {
    warn!(endpoint = %endpoint, error = %e, "api_request_failed");
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("rejected by server: {message}")]
    Rejected { message: String },
}

impl ApiError {
    /// Server-provided rejection text, if the server answered `success: false`
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message } => Some(message),
            _ => None,
        }
    }
}

/// Successful check-in answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckIn {
    pub message: Option<String>,
    pub session: Option<AttendanceSession>,
}

/// Calls the worker page makes against the server
#[async_trait]
pub trait WorkerApi: Send + Sync {
    async fn check_in(&self, sample: &PositionSample) -> Result<CheckIn, ApiError>;

    /// Returns the server's confirmation message
    async fn update_progress(
        &self,
        order: OrderId,
        progress: Progress,
    ) -> Result<Option<String>, ApiError>;

    async fn complete_order(&self, order: OrderId) -> Result<Option<String>, ApiError>;

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ApiError>;

    async fn unread_notifications(&self) -> Result<Vec<Notification>, ApiError>;
}

#[derive(Debug, Serialize)]
struct CheckInRequest {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
}

#[derive(Debug, Serialize)]
struct ProgressRequest {
    progress: u8,
}

/// Common `{success, message, ...}` envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    session: Option<AttendanceSession>,
}

impl Envelope {
    fn into_result(self) -> Result<Self, ApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(ApiError::Rejected { message: self.message.unwrap_or_default() })
        }
    }
}

/// reqwest-backed implementation
pub struct HttpWorkerApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWorkerApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // Client is built once for connection pooling; the cookie store
        // carries the server-issued session
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the JSON body.
    ///
    /// The body is decoded regardless of HTTP status; a non-JSON body on an
    /// error status is reported as `Status`.
    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let start = Instant::now();
        let result = async {
            let response =
                request.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|e| ApiError::Transport(e.to_string()))?;

            match serde_json::from_slice::<T>(&body) {
                Ok(value) => Ok(value),
                Err(_) if !status.is_success() => Err(ApiError::Status(status.as_u16())),
                Err(e) => Err(ApiError::Decode(e.to_string())),
            }
        }
        .await;

        let latency_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(_) => debug!(endpoint = %endpoint, latency_us = %latency_us, "api_request_ok"),
            Err(e) => log_request_failed(endpoint, e),
        }
        result
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerApi {
    async fn check_in(&self, sample: &PositionSample) -> Result<CheckIn, ApiError> {
        let body = CheckInRequest {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
        };
        let request = self.client.post(self.url("/attendance/checkin")).json(&body);
        let envelope = self.send::<Envelope>("checkin", request).await?.into_result()?;
        Ok(CheckIn { message: envelope.message, session: envelope.session })
    }

    async fn update_progress(
        &self,
        order: OrderId,
        progress: Progress,
    ) -> Result<Option<String>, ApiError> {
        let body = ProgressRequest { progress: progress.value() };
        let request =
            self.client.post(self.url(&format!("/orders/update-progress/{order}"))).json(&body);
        let envelope = self.send::<Envelope>("update_progress", request).await?.into_result()?;
        Ok(envelope.message)
    }

    async fn complete_order(&self, order: OrderId) -> Result<Option<String>, ApiError> {
        let request = self.client.post(self.url(&format!("/orders/complete/{order}")));
        let envelope = self.send::<Envelope>("complete_order", request).await?.into_result()?;
        Ok(envelope.message)
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ApiError> {
        let request = self.client.get(self.url(&format!("/notifications/mark-read/{id}")));
        self.send::<Envelope>("mark_read", request).await?.into_result()?;
        Ok(())
    }

    async fn unread_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let request =
            self.client.get(self.url("/notifications")).query(&[("unread_only", "true")]);
        self.send::<Vec<Notification>>("notifications", request).await
    }
}
