//! API client for the examination portal REST API.
//!
//! This module provides the `ApiClient` struct for making requests to the
//! login, profile, exam catalog, application and assistant endpoints.
//! Authenticated endpoints take the raw token in `Authorization`, without a
//! `Bearer ` prefix.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    AdmitCardRequest, ApplicationReceipt, ApplicationRequest, ApplicationsResponse, Application,
    Certificate, CertificateRequest, Exam, ExamListResponse, GeneratedCertificate, UserDetails,
    UserResponse,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://igdt.adityaexp.dev";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Request / response bodies
// ============================================================================

/// Credentials sent to `POST /api/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Body for `PUT /api/updateContact`. Unchanged fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_phone: Option<String>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_email.is_none() && self.new_phone.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdateResponse {
    /// Issued when the email changed; the old token no longer matches.
    #[serde(default)]
    pub new_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    message: &'a str,
}

/// Reply from the public chatbot (`POST /ask`).
#[derive(Debug, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    message: &'a str,
    session_id: &'a str,
}

/// Reply from the authenticated assistant (`POST /agent`).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    pub reply: String,
    pub session_id: String,
    #[serde(default)]
    pub user: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// API client for the portal.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client against `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(header::AUTHORIZATION, header::HeaderValue::from_str(token)?);
        }
        Ok(headers)
    }

    fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            return Err(ApiError::NotAuthenticated.into());
        }
        Ok(())
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request built by `build`, retrying on 429 with exponential
    /// backoff, and parse the JSON body.
    async fn send_json<T, F>(&self, url: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()
                .headers(self.auth_headers()?)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send_json(&url, || self.client.get(&url)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        self.send_json(&url, || self.client.post(&url).json(body)).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        self.send_json(&url, || self.client.put(&url).json(body)).await
    }

    // ===== Authentication =====

    /// Exchange credentials for a bearer token
    pub async fn login(&self, credentials: &LoginRequest) -> Result<String> {
        let url = self.url("/api/login");
        let response = self
            .client
            .post(&url)
            .json(credentials)
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to send login request")?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        if login.token.is_empty() {
            return Err(ApiError::InvalidResponse("empty token".to_string()).into());
        }
        Ok(login.token)
    }

    /// Create an account. Does not log in.
    pub async fn register<B: Serialize>(&self, form: &B) -> Result<RegisterResponse> {
        let url = self.url("/api/register");
        let response = self
            .client
            .post(&url)
            .json(form)
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to send registration request")?;

        let response = Self::check_response(response).await?;
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(RegisterResponse { message: None }))
    }

    /// Change email and/or phone. May return a replacement token.
    pub async fn update_contact(&self, update: &ContactUpdate) -> Result<ContactUpdateResponse> {
        self.require_token()?;
        self.put("/api/updateContact", update).await
    }

    // ===== Profile =====

    /// Fetch the server-side profile, including the credit balance
    pub async fn fetch_user(&self) -> Result<UserDetails> {
        self.require_token()?;
        let response: UserResponse = self.get("/api/user").await?;
        Ok(response.user)
    }

    pub async fn fetch_applications(&self) -> Result<Vec<Application>> {
        self.require_token()?;
        let response: ApplicationsResponse = self.get("/api/getApplications").await?;
        debug!(count = response.applications.len(), "Applications fetched");
        Ok(response.applications)
    }

    pub async fn verify_certificate(&self, certificate_id: &str) -> Result<Certificate> {
        self.require_token()?;
        self.get(&format!("/api/verifyCertificate/{}", certificate_id))
            .await
    }

    pub async fn generate_certificate(
        &self,
        request: &CertificateRequest<'_>,
    ) -> Result<GeneratedCertificate> {
        self.require_token()?;
        self.post("/api/generateCertificate", request).await
    }

    /// Render an admit card; returns the image bytes
    pub async fn generate_admit_card(&self, request: &AdmitCardRequest) -> Result<Vec<u8>> {
        self.require_token()?;
        let url = self.url("/api/generateAdmitCard");
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(request)
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to request admit card")?;

        let response = Self::check_response(response).await?;
        let bytes = response
            .bytes()
            .await
            .context("Failed to read admit card image")?;
        Ok(bytes.to_vec())
    }

    // ===== Exams =====

    /// Fetch the exam catalog. Public endpoint.
    pub async fn fetch_exams(&self) -> Result<Vec<Exam>> {
        let response: ExamListResponse = self.get("/getExam").await?;
        let exams = response.into_exams();
        debug!(count = exams.len(), "Exams fetched");
        Ok(exams)
    }

    /// Apply for an exam. A 409 surfaces as `ApiError::Conflict`.
    pub async fn submit_application(&self, exam: &Exam) -> Result<ApplicationReceipt> {
        self.require_token()?;
        let body = ApplicationRequest {
            exam_id: exam.id,
            exam_name: &exam.name,
        };
        self.post("/api/submitApplication", &body).await
    }

    // ===== Assistant =====

    /// Ask the public chatbot
    pub async fn ask(&self, message: &str) -> Result<AskResponse> {
        let url = self.url("/ask");
        let response = self
            .client
            .post(&url)
            .json(&AskRequest { message })
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to reach the assistant")?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .context("Failed to parse assistant response")
    }

    /// Send a message to the authenticated assistant
    pub async fn agent(&self, message: &str, session_id: &str) -> Result<AgentReply> {
        self.require_token()?;
        self.post("/agent", &AgentRequest { message, session_id })
            .await
    }
}

/// Find the `ApiError` inside an `anyhow` chain, if there is one.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|e| e.downcast_ref::<ApiError>())
}
