use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A submitted exam application (`GET /api/getApplications`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub exam_name: String,
    #[serde(default)]
    pub application_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub percentile: Option<f64>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub qualified: Option<bool>,
    #[serde(default)]
    pub can_view_certificate: Option<bool>,
    #[serde(default)]
    pub exam_date: Option<String>,
    #[serde(default)]
    pub result_date: Option<String>,
    #[serde(default)]
    pub admit_card_available: Option<bool>,
    #[serde(rename = "certificate_id", default)]
    pub certificate_id: Option<String>,
    /// Filled in locally once the certificate has been verified.
    #[serde(default)]
    pub certificate: Option<Certificate>,
}

impl Application {
    /// Qualified with a certificate id, so worth verifying.
    pub fn has_certificate(&self) -> bool {
        self.qualified == Some(true)
            && self.certificate_id.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn status_display(&self) -> &str {
        self.status.as_deref().unwrap_or("Pending")
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid application id: {}", other))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplicationsResponse {
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// Result of `GET /api/verifyCertificate/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exam: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub ipfs_url: Option<String>,
    #[serde(default)]
    pub issued_on: Option<String>,
}

/// Body for `POST /api/submitApplication`.
#[derive(Debug, Serialize)]
pub struct ApplicationRequest<'a> {
    pub exam_id: i64,
    pub exam_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationReceipt {
    #[serde(default)]
    pub remaining_credit: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body for `POST /api/generateCertificate`.
#[derive(Debug, Serialize)]
pub struct CertificateRequest<'a> {
    pub exam: &'a str,
    pub rank: Option<i64>,
    pub name: Option<&'a str>,
    pub certificate_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedCertificate {
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub ipfs_cid: Option<String>,
    #[serde(default)]
    pub ipfs_url: Option<String>,
}

/// Body for `POST /api/generateAdmitCard`. Missing profile fields are sent
/// as empty strings.
#[derive(Debug, Default, Serialize)]
pub struct AdmitCardRequest {
    pub full_name: String,
    pub father_name: String,
    pub mother_name: String,
    pub mobile_number: String,
    pub complete_address: String,
    pub city: String,
    pub district: String,
    pub state: String,
    pub pincode: String,
}

impl AdmitCardRequest {
    pub fn from_details(details: &super::UserDetails) -> Self {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            full_name: field(&details.full_name),
            father_name: field(&details.father_name),
            mother_name: field(&details.mother_name),
            mobile_number: details.contact_phone().unwrap_or_default().to_string(),
            complete_address: field(&details.complete_address),
            city: field(&details.city),
            district: field(&details.district),
            state: field(&details.state),
            pincode: field(&details.pincode),
        }
    }
}
