use std::collections::HashSet;
use std::io::Cursor;
use std::path::Component;

use crate::domain::FileEntry;
use crate::error::AppError;
use crate::files::Language;

pub const MAX_ARCHIVE_ENTRIES: usize = 2000;

/// Lists the regular files inside a zip payload.
///
/// Directories and macOS resource forks are skipped. Entries whose path would
/// escape the archive root reject the whole upload.
pub fn list_entries(payload: &[u8]) -> Result<Vec<FileEntry>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(payload))
        .map_err(|e| AppError::Validation(format!("unreadable zip archive: {}", e)))?;

    if archive.len() > MAX_ARCHIVE_ENTRIES {
        return Err(AppError::Validation(format!(
            "archive has {} entries, limit is {}",
            archive.len(),
            MAX_ARCHIVE_ENTRIES
        )));
    }

    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| AppError::Validation(format!("corrupt zip entry #{}: {}", index, e)))?;

        if file.is_dir() {
            continue;
        }

        let enclosed = file.enclosed_name().ok_or_else(|| {
            AppError::Validation(format!("archive entry '{}' has an unsafe path", file.name()))
        })?;

        if enclosed
            .components()
            .any(|c| matches!(c, Component::Normal(part) if part == "__MACOSX"))
        {
            continue;
        }

        let path = enclosed
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        if !seen.insert(path.clone()) {
            return Err(AppError::Validation(format!(
                "duplicate archive entry '{}'",
                path
            )));
        }

        let name = enclosed
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&path)
            .to_string();

        entries.push(FileEntry {
            language: Language::detect(&path),
            name,
            path,
            size: file.size(),
            analysis: None,
        });
    }

    if entries.is_empty() {
        return Err(AppError::Validation("archive contains no files".to_string()));
    }

    Ok(entries)
}
