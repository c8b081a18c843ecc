//! examportal core - session state and API plumbing for the examination portal.
//!
//! `auth::SessionState` is the one place that knows whether the user is
//! logged in. Everything else (the route guard, the credit balance, the
//! application flow, the assistant) reads it or subscribes to it.

pub mod api;
pub mod applications;
pub mod assistant;
pub mod auth;
pub mod balance;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod guard;
pub mod models;
pub mod notifications;
pub mod registration;
pub mod settings;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthSnapshot, AuthState, SessionOptions, SessionState};
pub use config::Config;
pub use events::{AppEvent, EventBus};
