//! REST API client module for the examination portal.
//!
//! This module provides the `ApiClient` for communicating with the portal
//! API: login and registration, profile and credit, the exam catalog,
//! applications and certificates, and the support assistant.

pub mod client;
pub mod error;

pub use client::{
    api_error, AgentReply, ApiClient, AskResponse, ContactUpdate, ContactUpdateResponse,
    LoginRequest, RegisterResponse, DEFAULT_BASE_URL,
};
pub use error::ApiError;
