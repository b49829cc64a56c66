use chrono::Utc;
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

pub fn generate_submission_id() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Keeps the original name readable while making it safe as a path segment.
pub fn sanitize_filename(filename: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned = unsafe_chars.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Flat directory of uploaded payloads, addressed by storage key.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    pub fn key_for(submission_id: &str, filename: &str) -> String {
        format!("{}_{}", submission_id, sanitize_filename(filename))
    }

    fn path_of(&self, key: &str) -> std::io::Result<PathBuf> {
        if key.is_empty() || key.contains("..") || key.contains(['/', '\\']) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid storage key '{}'", key),
            ));
        }
        Ok(self.root.join(key))
    }

    pub async fn save(&self, key: &str, payload: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(self.path_of(key)?, payload).await
    }

    pub async fn read(&self, key: &str) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path_of(key)?).await
    }

    /// Missing payloads count as removed.
    pub async fn remove(&self, key: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path_of(key)?).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
