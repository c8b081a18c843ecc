//! Data models for portal entities.
//!
//! - `UserInfo`, `SessionUser`, `UserDetails`: the stored record, the
//!   in-memory session user and the server-side profile
//! - `Exam`, `ExamFilter`: catalog listings and their search
//! - `Paper`: previous-year question papers
//! - `Application`, `Certificate`: submitted applications and their results

pub mod application;
pub mod exam;
pub mod paper;
pub mod user;

pub use application::{
    AdmitCardRequest, Application, ApplicationReceipt, ApplicationRequest, ApplicationsResponse,
    Certificate, CertificateRequest, GeneratedCertificate,
};
pub use exam::{Exam, ExamFilter, ExamListResponse};
pub use paper::{Paper, PaperFilter};
pub use user::{SessionUser, UserDetails, UserInfo, UserResponse};
