//! Exam announcements shown in the notification center.

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// `YYYY-MM-DD`
    pub date: String,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// What callers supply; id, date and read state are filled in on `add`.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub download_url: Option<String>,
}

/// Newest first.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    notifications: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            notifications: Vec::new(),
        }
    }

    /// The announcements the portal ships with.
    pub fn seeded() -> Self {
        Self {
            notifications: seed(),
        }
    }

    /// Restore a previously saved list, kept in the given order.
    pub fn from_notifications(notifications: Vec<Notification>) -> Self {
        Self { notifications }
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn all(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Prepend a notification dated today. Returns its id.
    pub fn add(&mut self, new: NewNotification) -> String {
        let mut id = Utc::now().timestamp_millis().to_string();
        // Two adds within the same millisecond
        while self.notifications.iter().any(|n| n.id == id) {
            id = format!("{}-{}", id, self.notifications.len());
        }

        self.notifications.insert(
            0,
            Notification {
                id: id.clone(),
                title: new.title,
                message: new.message,
                kind: new.kind,
                date: Local::now().format("%Y-%m-%d").to_string(),
                read: false,
                download_url: new.download_url,
            },
        );
        id
    }

    /// Returns false if no notification has that id.
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for n in &mut self.notifications {
            n.read = true;
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

fn seed() -> Vec<Notification> {
    let entry = |id: &str,
                 title: &str,
                 message: &str,
                 kind: NotificationKind,
                 date: &str,
                 read: bool,
                 download_url: Option<&str>| Notification {
        id: id.to_string(),
        title: title.to_string(),
        message: message.to_string(),
        kind,
        date: date.to_string(),
        read,
        download_url: download_url.map(str::to_string),
    };

    use NotificationKind::*;
    vec![
        entry(
            "1",
            "CSE Prelims 2025 - Registration Closed",
            "Civil Services Preliminary Examination 2025 registration closed on February 21, 2025. Exam scheduled for May 25, 2025.",
            Info,
            "2025-02-21",
            false,
            Some("/downloads/cse-prelims-2025-notification.pdf"),
        ),
        entry(
            "2",
            "CDS (I) 2025 - Registration Closed",
            "Combined Defence Services Examination (I) 2025 registration closed on January 1, 2025. Exam scheduled for April 14, 2025.",
            Info,
            "2025-01-01",
            false,
            Some("/downloads/cds-i-2025-notification.pdf"),
        ),
        entry(
            "3",
            "NDA (I) 2025 - Registration Closed",
            "National Defence Academy Examination (I) 2025 registration closed on January 1, 2025. Exam scheduled for April 13, 2025.",
            Info,
            "2025-01-01",
            false,
            None,
        ),
        entry(
            "4",
            "Engineering Services 2025 - Registration Closed",
            "Engineering Services Examination 2025 registration closed on November 22, 2024. Prelims on June 8, 2025.",
            Info,
            "2024-11-22",
            false,
            None,
        ),
        entry(
            "5",
            "CAPF 2025 - Registration Opening Soon",
            "Central Armed Police Forces (ACs) Examination 2025 registration opens on March 5, 2025. Last date: March 25, 2025.",
            Warning,
            "2025-02-28",
            false,
            Some("/downloads/capf-2025-notification.pdf"),
        ),
        entry(
            "6",
            "CMS 2025 - Registration Opening Soon",
            "Combined Medical Services Examination 2025 registration opens on February 19, 2025. Last date: March 11, 2025.",
            Warning,
            "2025-02-15",
            false,
            None,
        ),
        entry(
            "7",
            "NDA (II) 2025 - Registration Opening Soon",
            "NDA & NA Examination (II) 2025 registration opens on May 28, 2025. Last date: June 20, 2025.",
            Warning,
            "2025-05-20",
            false,
            None,
        ),
        entry(
            "8",
            "CDS (II) 2025 - Registration Opening Soon",
            "Combined Defence Services Examination (II) 2025 registration opens on May 28, 2025. Last date: June 20, 2025.",
            Warning,
            "2025-05-20",
            false,
            None,
        ),
        entry(
            "9",
            "IFS Prelims 2025 - Registration Closed",
            "Indian Forest Service Preliminary Examination 2025 registration closed on February 21, 2025. Exam on May 25, 2025.",
            Info,
            "2025-02-21",
            false,
            None,
        ),
        entry(
            "10",
            "Updated Study Material Available",
            "Latest syllabus and study guides for 2025 examinations now available in Resources section.",
            Success,
            "2025-01-15",
            true,
            Some("/downloads/study-material-2025.zip"),
        ),
    ]
}
