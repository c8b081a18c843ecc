use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{Application, Exam};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

/// Cache file holding the public exam catalog
const EXAMS_CACHE: &str = "exams";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Includes clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// JSON file cache for data that is slow to change: the exam catalog and,
/// per account, the list of submitted applications.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(name), contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        debug!(cache = name, "Cache written");
        Ok(())
    }

    // ===== Exams =====

    pub fn load_exams(&self) -> Result<Option<CachedData<Vec<Exam>>>> {
        self.load(EXAMS_CACHE)
    }

    pub fn save_exams(&self, exams: &[Exam]) -> Result<()> {
        self.save(EXAMS_CACHE, &exams)
    }

    // ===== Applications =====

    /// Applications are per account; the key is the session user's id.
    pub fn load_applications(&self, user_id: &str) -> Result<Option<CachedData<Vec<Application>>>> {
        self.load(&applications_key(user_id))
    }

    pub fn save_applications(&self, user_id: &str, applications: &[Application]) -> Result<()> {
        self.save(&applications_key(user_id), &applications)
    }

    /// Drop everything cached for one account. Called on logout.
    pub fn clear_account(&self, user_id: &str) -> Result<()> {
        let path = self.cache_path(&applications_key(user_id));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove applications cache"),
        }
    }

    // ===== Cache Age Information =====

    /// Human-readable age of the exam catalog, `"never"` if absent or unreadable.
    pub fn exams_age(&self) -> String {
        match self.load_exams() {
            Ok(Some(cached)) => cached.age_display(),
            Ok(None) => "never".to_string(),
            Err(e) => {
                debug!(error = %e, "Failed to load exam cache for age display");
                "never".to_string()
            }
        }
    }

    /// The cached catalog if it is still fresh. Unreadable cache counts as stale.
    pub fn fresh_exams(&self) -> Option<Vec<Exam>> {
        match self.load_exams() {
            Ok(Some(cached)) if !cached.is_stale() => Some(cached.data),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Failed to load exam cache");
                None
            }
        }
    }
}

/// Ids come from token claims; keep them filename-safe.
fn applications_key(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("applications_{}", safe)
}
