//! Applying for an exam from the catalog.

use tracing::{info, warn};

use crate::api::{api_error, ApiError};
use crate::auth::SessionState;
use crate::events::{AppEvent, EventBus};
use crate::models::Exam;

const ALREADY_APPLIED: &str = "You have already applied for this exam.";
const INSUFFICIENT_CREDIT: &str = "You do not have enough credits to apply for this exam.";
const APPLICATION_FAILED: &str = "Failed to submit application. Please try again.";
const CONNECTION_ERROR: &str = "Please check your internet connection and try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Not logged in; nothing was sent. Show the login prompt.
    LoginRequired,
    Submitted { remaining_credit: Option<i64> },
    AlreadyApplied(String),
    InsufficientCredit(String),
    ConnectionError(String),
    Failed(String),
}

/// Submit an application for `exam`. On success every credit display is
/// told to re-fetch.
pub async fn apply(session: &SessionState, bus: &EventBus, exam: &Exam) -> ApplyOutcome {
    let logged_in_with_email = session.user().is_some_and(|u| !u.email.is_empty());
    let client = match session.api() {
        Some(client) if logged_in_with_email => client,
        _ => return ApplyOutcome::LoginRequired,
    };

    match client.submit_application(exam).await {
        Ok(receipt) => {
            info!(exam_id = exam.id, remaining = ?receipt.remaining_credit, "Application submitted");
            bus.publish(AppEvent::CreditUpdated);
            ApplyOutcome::Submitted {
                remaining_credit: receipt.remaining_credit,
            }
        }
        Err(e) => {
            warn!(exam_id = exam.id, error = %e, "Application failed");
            match api_error(&e) {
                Some(ApiError::Conflict(m)) => ApplyOutcome::AlreadyApplied(or_default(m, ALREADY_APPLIED)),
                Some(ApiError::InsufficientCredit(m)) => {
                    ApplyOutcome::InsufficientCredit(or_default(m, INSUFFICIENT_CREDIT))
                }
                Some(ApiError::NetworkError(_)) => ApplyOutcome::ConnectionError(CONNECTION_ERROR.to_string()),
                Some(ApiError::Unauthorized) => {
                    // Server no longer accepts the token
                    session.logout();
                    ApplyOutcome::LoginRequired
                }
                Some(ApiError::BadRequest(m) | ApiError::ServerError(m) | ApiError::AccessDenied(m)) => {
                    ApplyOutcome::Failed(or_default(m, APPLICATION_FAILED))
                }
                _ => ApplyOutcome::Failed(APPLICATION_FAILED.to_string()),
            }
        }
    }
}

fn or_default(message: &str, default: &str) -> String {
    if message.trim().is_empty() {
        default.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::auth::token::encode_token;
    use crate::auth::{KeyValueStore, MemoryStore, SessionOptions};
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;

    fn exam() -> Exam {
        serde_json::from_value(json!({"id": 7, "name": "Combined Defence Services", "shortName": "CDS"}))
            .unwrap()
    }

    fn session(base_url: &str, logged_in: bool) -> (SessionState, String) {
        let backend = MemoryStore::new();
        let token = encode_token(&json!({"exp": Utc::now().timestamp() + 3600, "sub": "u1"}));
        if logged_in {
            backend.set("token", &token).unwrap();
            backend.set("user", r#"{"email":"a@b.com"}"#).unwrap();
        }
        let session = SessionState::new(
            ApiClient::new(base_url).unwrap(),
            Box::new(backend),
            SessionOptions::default(),
        );
        session.load();
        (session, token)
    }

    #[tokio::test]
    async fn test_logged_out_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/submitApplication")
            .expect(0)
            .create_async()
            .await;

        let (session, _) = session(&server.url(), false);
        let bus = EventBus::new();
        assert_eq!(apply(&session, &bus, &exam()).await, ApplyOutcome::LoginRequired);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submitted_publishes_credit_update() {
        let mut server = mockito::Server::new_async().await;
        let (session, token) = session(&server.url(), true);
        let mock = server
            .mock("POST", "/api/submitApplication")
            .match_header("authorization", token.as_str())
            .match_body(Matcher::Json(json!({"exam_id": 7, "exam_name": "Combined Defence Services"})))
            .with_status(200)
            .with_body(r#"{"remaining_credit":1500}"#)
            .create_async()
            .await;

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        assert_eq!(
            apply(&session, &bus, &exam()).await,
            ApplyOutcome::Submitted {
                remaining_credit: Some(1500)
            }
        );
        mock.assert_async().await;
        assert_eq!(events.try_recv().unwrap(), AppEvent::CreditUpdated);
    }

    #[tokio::test]
    async fn test_already_applied() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/submitApplication")
            .with_status(409)
            .with_body("{}")
            .create_async()
            .await;

        let (session, _) = session(&server.url(), true);
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        assert_eq!(
            apply(&session, &bus, &exam()).await,
            ApplyOutcome::AlreadyApplied(ALREADY_APPLIED.to_string())
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_insufficient_credit_uses_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/submitApplication")
            .with_status(402)
            .with_body(r#"{"error":"Need 200 more credits"}"#)
            .create_async()
            .await;

        let (session, _) = session(&server.url(), true);
        assert_eq!(
            apply(&session, &EventBus::new(), &exam()).await,
            ApplyOutcome::InsufficientCredit("Need 200 more credits".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejected_token_logs_out() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/submitApplication")
            .with_status(401)
            .create_async()
            .await;

        let (session, _) = session(&server.url(), true);
        assert_eq!(
            apply(&session, &EventBus::new(), &exam()).await,
            ApplyOutcome::LoginRequired
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (session, _) = session("http://127.0.0.1:9", true);
        assert_eq!(
            apply(&session, &EventBus::new(), &exam()).await,
            ApplyOutcome::ConnectionError(CONNECTION_ERROR.to_string())
        );
    }
}
