use serde::{Deserialize, Serialize};

/// A previous-year question paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: u32,
    /// Exam family, e.g. `Civil Services`
    pub exam: String,
    pub title: String,
    pub year: u16,
    /// Prelims, Mains, Written...
    #[serde(rename = "type")]
    pub kind: String,
    pub language: String,
    pub pages: u32,
    pub download_url: String,
}

impl Paper {
    pub fn display_title(&self) -> String {
        format!("{} - {}", self.title, self.year)
    }
}

/// Narrows the paper list. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperFilter {
    /// Matched against exam, title and type, ignoring case
    pub search: Option<String>,
    pub exam: Option<String>,
    pub year: Option<u16>,
}

impl PaperFilter {
    pub fn matches(&self, paper: &Paper) -> bool {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let matches_search = search.map_or(true, |term| {
            [&paper.exam, &paper.title, &paper.kind]
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
        });

        let matches_exam = self
            .exam
            .as_deref()
            .map_or(true, |exam| paper.exam.eq_ignore_ascii_case(exam.trim()));
        let matches_year = self.year.map_or(true, |year| paper.year == year);

        matches_search && matches_exam && matches_year
    }

    pub fn apply<'a>(&self, papers: &'a [Paper]) -> Vec<&'a Paper> {
        papers.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Exam families in catalog order, without repeats.
pub fn exam_names(papers: &[Paper]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for paper in papers {
        if !names.contains(&paper.exam.as_str()) {
            names.push(&paper.exam);
        }
    }
    names
}

/// Distinct years, newest first.
pub fn years(papers: &[Paper]) -> Vec<u16> {
    let mut years: Vec<u16> = papers.iter().map(|p| p.year).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

/// The papers published on the portal.
pub fn catalog() -> Vec<Paper> {
    let paper = |id: u32, exam: &str, title: &str, year: u16, kind: &str, pages: u32, file: &str| Paper {
        id,
        exam: exam.to_string(),
        title: title.to_string(),
        year,
        kind: kind.to_string(),
        language: "English".to_string(),
        pages,
        download_url: format!("/{}", file),
    };

    vec![
        paper(1, "Civil Services", "General Studies Paper I", 2023, "Prelims", 20, "QP-CSM-23-GENERAL-STUDIES-PAPER-I-180923.pdf"),
        paper(2, "Civil Services", "General Studies Paper II (CSAT)", 2023, "Prelims", 18, "QP-CSM-23-GENERAL-STUDIES-PAPER-II-180923.pdf"),
        paper(3, "Civil Services", "Essay Paper", 2023, "Mains", 4, "essay paper.pdf"),
        paper(4, "Civil Services", "General Studies Paper I", 2022, "Prelims", 20, "gs 2022.pdf"),
        paper(5, "NDA", "Mathematics", 2023, "Written", 16, "nda maths.pdf"),
        paper(6, "CDS", "Elementary Mathematics", 2023, "Written", 14, "cds maths.pdf"),
        paper(7, "Engineering Services", "General Studies & Engineering Aptitude", 2023, "Preliminary", 22, "enggineering apptitude.pdf"),
        paper(8, "CAPF", "General Ability & Intelligence", 2023, "Written", 18, "cisf.pdf"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(papers: &[&Paper]) -> Vec<u32> {
        papers.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let papers = catalog();
        assert_eq!(PaperFilter::default().apply(&papers).len(), papers.len());

        let blank = PaperFilter {
            search: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(blank.apply(&papers).len(), papers.len());
    }

    #[test]
    fn test_search_covers_exam_title_and_type() {
        let papers = catalog();
        let search = |term: &str| {
            ids(&PaperFilter {
                search: Some(term.into()),
                ..Default::default()
            }
            .apply(&papers))
        };

        assert_eq!(search("MATHEMATICS"), vec![5, 6]);
        assert_eq!(search("mains"), vec![3]);
        assert_eq!(search("capf"), vec![8]);
        assert!(search("geography").is_empty());
    }

    #[test]
    fn test_exam_and_year_combine() {
        let papers = catalog();
        let filter = PaperFilter {
            search: Some("general studies".into()),
            exam: Some("civil services".into()),
            year: Some(2022),
        };
        assert_eq!(ids(&filter.apply(&papers)), vec![4]);

        let filter = PaperFilter {
            exam: Some("Civil Services".into()),
            year: Some(2023),
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&papers)), vec![1, 2, 3]);
    }

    #[test]
    fn test_filter_choices() {
        let papers = catalog();
        assert_eq!(
            exam_names(&papers),
            vec!["Civil Services", "NDA", "CDS", "Engineering Services", "CAPF"]
        );
        assert_eq!(years(&papers), vec![2023, 2022]);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(&catalog()[2]).unwrap();
        assert_eq!(json["type"], "Mains");
        assert_eq!(json["downloadUrl"], "/essay paper.pdf");
        assert_eq!(catalog()[2].display_title(), "Essay Paper - 2023");
    }
}
