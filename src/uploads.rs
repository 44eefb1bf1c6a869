//! Upload Collaborator
//! Mission: Persist uploaded receipt bytes to disk and hand back references
//!
//! Filenames are `<unix-millis>-<sanitized original name>`, presumptively
//! unique per request. Files are never rewritten in place, so no locking
//! is needed around the shared directory.

use crate::records::models::FileRef;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Writes uploaded files beneath a configured base directory
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create the store, making sure the base directory exists
    pub fn new(base_dir: &str) -> Result<Self> {
        let base_dir = PathBuf::from(base_dir);
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create upload dir {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    /// Store file bytes and return the `{path, filename}` reference
    pub fn store(&self, original_name: &str, bytes: &[u8]) -> Result<FileRef> {
        let filename = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_name(original_name)
        );
        let path = self.base_dir.join(&filename);

        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write upload {}", path.display()))?;

        debug!("Stored upload: {} ({} bytes)", path.display(), bytes.len());

        Ok(FileRef {
            path: path.to_string_lossy().to_string(),
            filename,
        })
    }
}

/// Strip path separators and anything else surprising from a client-supplied
/// name, keeping it recognizable
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_writes_file_and_returns_ref() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_str().unwrap()).unwrap();

        let file_ref = store.store("receipt.png", b"fake-bytes").unwrap();

        assert!(file_ref.filename.ends_with("-receipt.png"));
        let written = fs::read(&file_ref.path).unwrap();
        assert_eq!(written, b"fake-bytes");
    }

    #[test]
    fn test_sanitize_strips_path_components() {
        assert_eq!(sanitize_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_name("my receipt.jpg"), "my_receipt.jpg");
        assert_eq!(sanitize_name(""), "upload");
    }

    #[test]
    fn test_filenames_embed_original_name() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_str().unwrap()).unwrap();

        let a = store.store("slip.pdf", b"a").unwrap();
        assert!(a.filename.contains("slip.pdf"));
        assert!(a.path.contains(&a.filename));
    }
}
