//! Profile page data: details, applications, certificates, admit cards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::{AdmitCardRequest, Application, CertificateRequest, GeneratedCertificate, UserDetails};

/// Certificate checks in flight at once.
const MAX_CONCURRENT_REQUESTS: usize = 5;

#[derive(Debug, Clone)]
pub struct ProfileDashboard {
    pub details: UserDetails,
    pub applications: Vec<Application>,
}

impl ProfileDashboard {
    pub fn application(&self, id: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.id == id)
    }
}

/// Fetch profile and applications together, then verify the certificate of
/// every qualified application. A failed verification just leaves
/// `certificate` empty.
pub async fn load(client: &ApiClient) -> Result<ProfileDashboard> {
    let (details, applications) = tokio::join!(client.fetch_user(), client.fetch_applications());
    let details = details.context("Failed to fetch user details")?;
    let mut applications = applications.context("Failed to fetch applications")?;

    verify_certificates(client, &mut applications).await;

    Ok(ProfileDashboard {
        details,
        applications,
    })
}

async fn verify_certificates(client: &ApiClient, applications: &mut [Application]) {
    let pending: Vec<(usize, String)> = applications
        .iter()
        .enumerate()
        .filter(|(_, app)| app.has_certificate())
        .filter_map(|(i, app)| app.certificate_id.clone().map(|id| (i, id)))
        .collect();

    for chunk in pending.chunks(MAX_CONCURRENT_REQUESTS) {
        let futures: Vec<_> = chunk
            .iter()
            .map(|(index, certificate_id)| async move {
                (*index, client.verify_certificate(certificate_id).await)
            })
            .collect();

        for (index, result) in futures::future::join_all(futures).await {
            match result {
                Ok(certificate) if certificate.valid => {
                    applications[index].certificate = Some(certificate);
                }
                Ok(_) => debug!(application = %applications[index].id, "Certificate not valid"),
                Err(e) => warn!(application = %applications[index].id, error = %e, "Certificate check failed"),
            }
        }
    }
}

/// Issue a certificate for a qualified application.
pub async fn generate_certificate(
    client: &ApiClient,
    details: &UserDetails,
    application: &Application,
) -> Result<GeneratedCertificate> {
    let request = CertificateRequest {
        exam: &application.exam_name,
        rank: application.rank,
        name: details.full_name.as_deref(),
        certificate_id: application.certificate_id.as_deref(),
    };
    let generated = client
        .generate_certificate(&request)
        .await
        .context("Failed to generate certificate")?;
    info!(application = %application.id, url = ?generated.ipfs_url, "Certificate generated");
    Ok(generated)
}

/// File name the admit card is saved under: `<full name>_<application id>.png`.
pub fn admit_card_file_name(details: &UserDetails, application: &Application) -> String {
    let name = details
        .full_name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("admit_card");
    let stem: String = format!("{}_{}", name, application.id)
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("{}.png", stem)
}

/// Render the admit card and save it under `dir`. Returns the written path.
pub async fn download_admit_card(
    client: &ApiClient,
    details: &UserDetails,
    application: &Application,
    dir: &Path,
) -> Result<PathBuf> {
    let image = client
        .generate_admit_card(&AdmitCardRequest::from_details(details))
        .await
        .context("Failed to generate admit card")?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(admit_card_file_name(details, application));
    std::fs::write(&path, &image)
        .with_context(|| format!("Failed to save admit card to {}", path.display()))?;

    info!(path = %path.display(), bytes = image.len(), "Admit card saved");
    Ok(path)
}
