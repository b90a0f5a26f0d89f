//! File helpers shared by the topology store and the node executor

use std::io;
use std::path::Path;

/// Replace `path` with `contents` so that readers see either the old file or
/// the new one, never a partial write.
///
/// The data goes to a uniquely named sibling first and is then renamed over
/// `path`; the sibling is removed if anything fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut staging_name = std::ffi::OsString::from(".");
    staging_name.push(file_name);
    staging_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let staging = path.with_file_name(staging_name);

    let result = async {
        tokio::fs::write(&staging, contents).await?;
        tokio::fs::rename(&staging, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("config.json")]);
    }

    #[tokio::test]
    async fn test_write_atomic_missing_parent_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("config.json");

        assert!(write_atomic(&path, b"data").await.is_err());
        assert!(!path.exists());
    }
}
