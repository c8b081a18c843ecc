use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::token::TokenPayload;

/// Fallback id when the token carries no subject
const DEFAULT_USER_ID: &str = "1";

/// Fallback display name when the stored record has none
const DEFAULT_USER_NAME: &str = "User";

/// The lightweight user record persisted next to the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "upscId", default, skip_serializing_if = "Option::is_none")]
    pub upsc_id: Option<String>,
    /// Fields written by other flows (profile details) that we carry through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserInfo {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// The in-memory view of the logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsc_id: Option<String>,
    pub is_verified: bool,
}

impl SessionUser {
    /// Merge token claims with the stored record. Stored fields win, claims
    /// fill the gaps.
    pub fn from_parts(payload: Option<&TokenPayload>, info: &UserInfo) -> Self {
        let id = payload
            .and_then(|p| p.sub())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        let email = if !info.email.is_empty() {
            info.email.clone()
        } else {
            payload
                .and_then(|p| p.email())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id,
            name: non_empty(&info.name).unwrap_or(DEFAULT_USER_NAME).to_string(),
            email,
            phone: non_empty(&info.phone).unwrap_or_default().to_string(),
            upsc_id: info.upsc_id.clone(),
            is_verified: true,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Profile returned by `GET /api/user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDetails {
    #[serde(default)]
    pub credit: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub complete_address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserDetails {
    /// Phone number, preferring `phone` over `mobile_number`
    pub fn contact_phone(&self) -> Option<&str> {
        non_empty(&self.phone).or_else(|| non_empty(&self.mobile_number))
    }

    pub fn display_name(&self) -> &str {
        non_empty(&self.full_name).unwrap_or(DEFAULT_USER_NAME)
    }
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub user: UserDetails,
}
