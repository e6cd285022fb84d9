//! Local storage for exported transcripts
//!
//! Writes an exported artifact to the configured export directory, by
//! default `<Documents>/Scribe/transcripts`.

use crate::error::StorageError;
use crate::transcription::ArtifactFormat;
use chrono::{Local, NaiveDate};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Ensure the export directory exists
pub fn ensure_export_dir(dir: &Path) -> Result<(), StorageError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        info!("Created export directory: {:?}", dir);
    }
    Ok(())
}

/// `transcription_YYYY-MM-DD.{txt|srt}`
pub fn export_file_name(format: ArtifactFormat, date: NaiveDate) -> String {
    format!(
        "transcription_{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Save exported content under `dir`
///
/// Returns the path to the saved file. A same-day export of the same format
/// overwrites the earlier one.
pub fn save_export(
    dir: &Path,
    format: ArtifactFormat,
    content: &str,
) -> Result<PathBuf, StorageError> {
    if content.trim().is_empty() {
        return Err(StorageError::EmptyExport);
    }

    ensure_export_dir(dir)?;
    let filepath = dir.join(export_file_name(format, Local::now().date_naive()));

    let write_err = |e| StorageError::WriteFile {
        path: filepath.clone(),
        source: e,
    };
    let mut file = fs::File::create(&filepath).map_err(write_err)?;
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.flush().map_err(write_err)?;

    info!(format = format.name(), "Saved export to: {:?}", filepath);
    Ok(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            export_file_name(ArtifactFormat::Text, date),
            "transcription_2024-03-09.txt"
        );
        assert_eq!(
            export_file_name(ArtifactFormat::Subtitle, date),
            "transcription_2024-03-09.srt"
        );
    }

    #[test]
    fn test_save_export_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("exports");

        let path = save_export(&dir, ArtifactFormat::Subtitle, "1\n00:00:00,000 --> 00:00:01,000\nhi\n")
            .unwrap();

        assert!(path.starts_with(&dir));
        assert_eq!(path.extension().unwrap(), "srt");
        assert!(fs::read_to_string(&path).unwrap().contains("-->"));
    }

    #[test]
    fn test_save_export_rejects_empty_content() {
        let root = tempfile::tempdir().unwrap();
        let result = save_export(root.path(), ArtifactFormat::Text, "  \n");
        assert!(matches!(result, Err(StorageError::EmptyExport)));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_export_reports_unwritable_directory() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result = save_export(&blocker.join("sub"), ArtifactFormat::Text, "hello");
        assert!(matches!(result, Err(StorageError::CreateDirectory { .. })));
    }
}
