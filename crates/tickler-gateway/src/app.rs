use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tickler_core::config::TicklerConfig;
use tickler_scheduler::ReminderService;

use crate::http::{health, reminders};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: TicklerConfig,
    pub service: ReminderService,
}

impl AppState {
    pub fn new(config: TicklerConfig, service: ReminderService) -> Self {
        Self { config, service }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/reminders", post(reminders::create_reminder))
        .route("/reminders/pending", get(reminders::list_pending))
        .route("/reminders/{id}", delete(reminders::cancel_reminder))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tickler_mailer::LogTransport;
    use tickler_scheduler::{DispatchSettings, JobRegistry, SqliteQueue, SqliteReminderStore};
    use tower::ServiceExt;

    fn router() -> (Router, Arc<AppState>) {
        let store =
            SqliteReminderStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let queue = SqliteQueue::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let service = ReminderService::new(
            Arc::new(store),
            Arc::new(queue),
            Arc::new(LogTransport::new("test@localhost")),
            Arc::new(JobRegistry::new()),
            DispatchSettings::default(),
        );
        let state = Arc::new(AppState::new(TicklerConfig::default(), service));
        (build_router(state.clone()), state)
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::post("/reminders")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_armed_jobs() {
        let (router, _) = router();
        let (status, body) = send(&router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["armed_jobs"], 0);
        assert_eq!(body["one_off_dispatch"], "queue");
    }

    #[tokio::test]
    async fn create_list_and_cancel() {
        let (router, state) = router();
        let (status, created) = send(
            &router,
            post_json(json!({
                "email": "team@example.com",
                "pattern": "weekly",
                "time": "09:00",
                "daysOfWeek": [5, 1, 3],
                "subject": "standup"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["pattern"], "weekly");
        assert_eq!(created["daysOfWeek"], json!([1, 3, 5]));
        assert_eq!(created["status"], "pending");
        assert!(created.get("message").is_none());
        assert_eq!(state.service.registry().len(), 1);

        let (status, pending) = send(
            &router,
            Request::get("/reminders/pending").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let id = created["id"].as_i64().unwrap();
        let delete = |id: i64| {
            Request::delete(format!("/reminders/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(&router, delete(id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.service.registry().is_empty());

        let (status, body) = send(&router, delete(id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn one_off_defaults_its_pattern_from_send_at() {
        let (router, _) = router();
        let send_at = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let (status, created) = send(
            &router,
            post_json(json!({"email": "me@example.com", "sendAt": send_at})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["pattern"], "once");
    }

    #[tokio::test]
    async fn validation_failures_are_bad_requests() {
        let (router, _) = router();

        let (status, body) = send(
            &router,
            post_json(json!({"email": "me@example.com", "pattern": "daily"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "time is not defined");

        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let (status, _) = send(
            &router,
            post_json(json!({"email": "me@example.com", "pattern": "once", "sendAt": past})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let garbage = Request::post("/reminders")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&router, garbage).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
    }
}
