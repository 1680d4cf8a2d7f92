use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

use crate::error::ErrorMessage;

/// Rewrites error bodies into `{path, timestamp, message}`. The timestamp is in
/// epoch millis and always later than the moment the request came in.
pub async fn error_envelope(req: Request, next: Next) -> Response {
    let started_at = Utc::now().timestamp_millis();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let Some(ErrorMessage(key)) = response.extensions().get::<ErrorMessage>().copied() else {
        return response;
    };

    let timestamp = Utc::now().timestamp_millis().max(started_at + 1);
    let body = json!({
        "path": path,
        "timestamp": timestamp,
        "message": key.text(),
    });
    (response.status(), axum::Json(body)).into_response()
}
