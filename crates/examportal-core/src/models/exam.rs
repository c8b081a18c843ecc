use serde::{Deserialize, Serialize};

/// One listing in the exam catalog (`GET /getExam`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub application_start: Option<String>,
    #[serde(default)]
    pub application_end: Option<String>,
    #[serde(default)]
    pub result_date: Option<String>,
    #[serde(default)]
    pub eligibility: Option<String>,
    #[serde(default)]
    pub age_limit: Option<String>,
    #[serde(default)]
    pub attempts: Option<String>,
    #[serde(default)]
    pub fee: Option<serde_json::Value>,
    #[serde(default)]
    pub applicants: Option<serde_json::Value>,
}

impl Exam {
    /// Short label for lists; falls back to the full name.
    pub fn label(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn is_open(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("open") || s.eq_ignore_ascii_case("active"))
            .unwrap_or(false)
    }

    pub fn fee_display(&self) -> String {
        match &self.fee {
            Some(serde_json::Value::Number(n)) => format!("₹{}", n),
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            _ => "N/A".to_string(),
        }
    }
}

/// Narrows the exam list. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExamFilter {
    /// Matched against name, short name and category, ignoring case
    pub search: Option<String>,
    /// Substring of the status, e.g. `open` or `upcoming`; `all` disables it
    pub status: Option<String>,
}

impl ExamFilter {
    pub fn matches(&self, exam: &Exam) -> bool {
        let matches_search = non_blank(&self.search).map_or(true, |term| {
            [Some(&exam.name), exam.short_name.as_ref(), exam.category.as_ref()]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term))
        });

        let matches_status = non_blank(&self.status)
            .filter(|status| status != "all")
            .map_or(true, |status| {
                exam.status
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&status))
            });

        matches_search && matches_status
    }

    pub fn apply<'a>(&self, exams: &'a [Exam]) -> Vec<&'a Exam> {
        exams.iter().filter(|e| self.matches(e)).collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// The exam endpoint has shipped three envelope shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExamListResponse {
    Bare(Vec<Exam>),
    Exams { exams: Vec<Exam> },
    Data { data: Vec<Exam> },
}

impl ExamListResponse {
    pub fn into_exams(self) -> Vec<Exam> {
        match self {
            ExamListResponse::Bare(exams)
            | ExamListResponse::Exams { exams }
            | ExamListResponse::Data { data: exams } => exams,
        }
    }
}
