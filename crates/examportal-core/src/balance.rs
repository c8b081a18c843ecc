//! The credit balance shown next to the user's name.
//!
//! Fetched from `GET /api/user` while logged in, cleared on logout, and
//! re-fetched whenever something publishes `AppEvent::CreditUpdated`.
//! The balance only watches the session; it never keeps it alive.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::auth::{SessionState, WeakSessionState};
use crate::events::AppEvent;
use crate::utils::format_credit;

#[derive(Clone)]
pub struct CreditBalance {
    session: WeakSessionState,
    credit: Arc<watch::Sender<Option<i64>>>,
}

impl CreditBalance {
    pub fn new(session: &SessionState) -> Self {
        let (credit, _) = watch::channel(None);
        Self {
            session: session.downgrade(),
            credit: Arc::new(credit),
        }
    }

    pub fn current(&self) -> Option<i64> {
        *self.credit.borrow()
    }

    /// `₹1,23,456`, or `₹0` when unknown.
    pub fn display(&self) -> String {
        format_credit(self.current())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.credit.subscribe()
    }

    /// Re-fetch the balance. Logged out means `None`; a failed fetch keeps
    /// the previous value.
    pub async fn refresh(&self) -> Option<i64> {
        let Some((client, user_id)) = self.session.upgrade().and_then(|session| {
            let client = session.api()?;
            Some((client, session.user().map(|u| u.id)))
        }) else {
            self.set(None);
            return None;
        };

        match client.fetch_user().await {
            Ok(details) => {
                // The session may have changed hands while the request was in flight
                let current_id = self
                    .session
                    .upgrade()
                    .and_then(|session| session.user())
                    .map(|u| u.id);
                if current_id.is_some() && current_id == user_id {
                    self.set(Some(details.credit.unwrap_or(0)));
                } else {
                    debug!("Session changed during credit fetch, discarding result");
                    self.set(None);
                }
            }
            Err(e) => warn!(error = %e, "Failed to fetch credit balance"),
        }
        self.current()
    }

    /// Keep the balance current. Stops once the session is dropped or the
    /// event bus behind `events` is gone.
    pub async fn run(&self, mut events: broadcast::Receiver<AppEvent>) {
        let Some(mut auth) = self.session.upgrade().map(|session| session.subscribe()) else {
            self.set(None);
            return;
        };
        self.refresh().await;

        loop {
            tokio::select! {
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    auth.borrow_and_update();
                    self.refresh().await;
                }
                event = events.recv() => match event {
                    Ok(AppEvent::CreditUpdated) => {
                        self.refresh().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Credit listener lagged, refreshing");
                        self.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Credit listener stopped");
    }

    fn set(&self, value: Option<i64>) {
        self.credit.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::ApiClient;
    use crate::auth::token::encode_token;
    use crate::auth::{KeyValueStore, MemoryStore, SessionOptions};
    use crate::events::EventBus;
    use chrono::Utc;
    use serde_json::json;
    use tokio::task::JoinHandle;

    fn token_for(sub: &str) -> String {
        encode_token(&json!({"exp": Utc::now().timestamp() + 3600, "sub": sub}))
    }

    fn logged_in(base_url: &str) -> (SessionState, MemoryStore) {
        let backend = MemoryStore::new();
        backend.set("token", &token_for("u1")).unwrap();
        backend.set("user", r#"{"email":"a@b.com"}"#).unwrap();
        let session = SessionState::new(
            ApiClient::new(base_url).unwrap(),
            Box::new(backend.clone()),
            SessionOptions::default(),
        );
        session.load();
        (session, backend)
    }

    fn logged_in_session(base_url: &str) -> SessionState {
        logged_in(base_url).0
    }

    fn spawn_listener(balance: &CreditBalance, bus: &EventBus) -> JoinHandle<()> {
        let balance = balance.clone();
        let events = bus.subscribe();
        tokio::spawn(async move { balance.run(events).await })
    }

    async fn wait_for_credit(rx: &mut watch::Receiver<Option<i64>>, expected: Option<i64>) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c == expected))
            .await
            .expect("timed out waiting for credit")
            .unwrap();
    }

    async fn wait_for_exit(task: JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("credit listener kept running")
            .unwrap();
    }

    async fn user_endpoint(server: &mut mockito::ServerGuard, credit: i64) -> mockito::Mock {
        server
            .mock("GET", "/api/user")
            .with_status(200)
            .with_body(json!({"user": {"credit": credit}}).to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_refresh_reads_credit() {
        let mut server = mockito::Server::new_async().await;
        user_endpoint(&mut server, 123456).await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        assert_eq!(balance.display(), "₹0");
        assert_eq!(balance.refresh().await, Some(123456));
        assert_eq!(balance.display(), "₹1,23,456");
    }

    #[tokio::test]
    async fn test_missing_credit_is_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/user")
            .with_status(200)
            .with_body(r#"{"user":{"email":"a@b.com"}}"#)
            .create_async()
            .await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        assert_eq!(balance.refresh().await, Some(0));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_value() {
        let mut server = mockito::Server::new_async().await;
        let ok = user_endpoint(&mut server, 500).await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        assert_eq!(balance.refresh().await, Some(500));

        ok.remove_async().await;
        server
            .mock("GET", "/api/user")
            .with_status(500)
            .create_async()
            .await;
        assert_eq!(balance.refresh().await, Some(500));
    }

    #[tokio::test]
    async fn test_logged_out_is_none() {
        let session = logged_in_session("http://127.0.0.1:9");
        session.logout();
        let balance = CreditBalance::new(&session);
        assert_eq!(balance.refresh().await, None);
    }

    #[tokio::test]
    async fn test_dropped_session_is_none() {
        let session = logged_in_session("http://127.0.0.1:9");
        let balance = CreditBalance::new(&session);
        drop(session);
        assert_eq!(balance.refresh().await, None);
    }

    #[tokio::test]
    async fn test_result_for_previous_user_is_discarded() {
        let mut server = mockito::Server::new_async().await;
        let (session, backend) = logged_in(&server.url());

        // Another account takes over while the first user's request is served
        let swapper = session.clone();
        server
            .mock("GET", "/api/user")
            .with_status(200)
            .with_body_from_request(move |_| {
                backend.set("token", &token_for("u2")).unwrap();
                backend.set("user", r#"{"email":"other@b.com"}"#).unwrap();
                swapper.refresh_auth_state();
                br#"{"user":{"credit":900}}"#.to_vec()
            })
            .create_async()
            .await;

        let balance = CreditBalance::new(&session);
        assert_eq!(balance.refresh().await, None);
        assert_eq!(session.user().map(|u| u.id).as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_run_follows_events_and_logout() {
        let mut server = mockito::Server::new_async().await;
        let first = user_endpoint(&mut server, 1000).await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        let bus = EventBus::new();
        let mut rx = balance.subscribe();

        let task = spawn_listener(&balance, &bus);
        wait_for_credit(&mut rx, Some(1000)).await;

        // An application spent some credit
        first.remove_async().await;
        user_endpoint(&mut server, 750).await;
        bus.publish(AppEvent::CreditUpdated);
        wait_for_credit(&mut rx, Some(750)).await;

        session.logout();
        wait_for_credit(&mut rx, None).await;

        drop(session);
        wait_for_exit(task).await;
    }

    #[tokio::test]
    async fn test_run_stops_when_session_dropped() {
        let mut server = mockito::Server::new_async().await;
        user_endpoint(&mut server, 1000).await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        let bus = EventBus::new();
        let mut rx = balance.subscribe();

        let task = spawn_listener(&balance, &bus);
        wait_for_credit(&mut rx, Some(1000)).await;

        drop(session);
        wait_for_exit(task).await;
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_dropped() {
        let mut server = mockito::Server::new_async().await;
        user_endpoint(&mut server, 1000).await;

        let session = logged_in_session(&server.url());
        let balance = CreditBalance::new(&session);
        let bus = EventBus::new();
        let mut rx = balance.subscribe();

        let task = spawn_listener(&balance, &bus);
        wait_for_credit(&mut rx, Some(1000)).await;

        drop(bus);
        wait_for_exit(task).await;
        assert!(session.is_authenticated());
    }
}
