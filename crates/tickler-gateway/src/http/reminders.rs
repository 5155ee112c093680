//! Reminder endpoints.
//!
//! | Method   | Path                 | Success | Errors        |
//! |----------|----------------------|---------|---------------|
//! | `POST`   | `/reminders`         | 201     | 400           |
//! | `GET`    | `/reminders/pending` | 200     |               |
//! | `DELETE` | `/reminders/{id}`    | 204     | 404           |

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tickler_core::{NewReminder, Reminder, ReminderId};
use tickler_scheduler::SchedulerError;
use tracing::{error, warn};

use crate::app::AppState;

type ApiError = (StatusCode, Json<Value>);

/// POST /reminders
pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    let input: NewReminder = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid reminder body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid JSON body: {e}")})),
        )
    })?;

    let reminder = state
        .service
        .create_and_schedule(input)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// GET /reminders/pending
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let reminders = state.service.list_upcoming().await.map_err(api_error)?;
    Ok(Json(reminders))
}

/// DELETE /reminders/{id}
pub async fn cancel_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .cancel(ReminderId(id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn api_error(e: SchedulerError) -> ApiError {
    match e {
        SchedulerError::Validation(v) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": v.to_string()})),
        ),
        SchedulerError::ReminderNotFound { id } => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("reminder {id} not found")})),
        ),
        other => {
            error!("reminder request failed: {other}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        }
    }
}
