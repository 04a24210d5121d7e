//! The host document store.
//!
//! Notes, sources and folders are addressed by store-relative paths using
//! `/` separators (`Inbox/scan.pdf`), the way a note vault names them. The
//! pipeline only needs the handful of operations on [`DocumentStore`];
//! [`LocalStore`] maps them onto a directory on disk.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::Pdf2MdError;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, Pdf2MdError>;

    /// Create or replace the file at `path`.
    async fn write_text(&self, path: &str, text: &str) -> Result<(), Pdf2MdError>;

    async fn exists(&self, path: &str) -> bool;

    /// Create `path` and any missing parents.
    async fn create_folder(&self, path: &str) -> Result<(), Pdf2MdError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), Pdf2MdError>;
}

// ── Path helpers ─────────────────────────────────────────────────────────

/// `("Inbox", "scan.pdf")` for `Inbox/scan.pdf`; parent is empty at the root.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// File name without its last extension.
pub fn file_stem(path: &str) -> &str {
    let (_, name) = split_path(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

/// Last extension, without the dot; empty when there is none.
pub fn extension(path: &str) -> &str {
    let (_, name) = split_path(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(i) => &name[i + 1..],
    }
}

/// Join a folder and a name; an empty folder means the store root.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim().trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

// ── Local directory store ────────────────────────────────────────────────

/// A [`DocumentStore`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a store path. Paths that climb out of the root are
    /// rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, Pdf2MdError> {
        let mut out = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(Pdf2MdError::Internal(format!(
                        "path '{path}' escapes the store root"
                    )))
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, Pdf2MdError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Pdf2MdError::FileNotFound { path: path.into() },
            _ => Pdf2MdError::ReadFailed {
                path: path.into(),
                source: e,
            },
        })
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<(), Pdf2MdError> {
        let full = self.resolve(path)?;
        let write_failed = |source| Pdf2MdError::OutputWriteFailed {
            path: path.into(),
            source,
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        tokio::fs::write(&full, text).await.map_err(write_failed)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn create_folder(&self, path: &str) -> Result<(), Pdf2MdError> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|source| Pdf2MdError::OutputWriteFailed {
                path: path.into(),
                source,
            })
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), Pdf2MdError> {
        let (src, dst) = (self.resolve(from)?, self.resolve(to)?);
        tokio::fs::rename(&src, &dst)
            .await
            .map_err(|source| Pdf2MdError::OutputWriteFailed {
                path: to.into(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_parts() {
        assert_eq!(split_path("Inbox/scan.pdf"), ("Inbox", "scan.pdf"));
        assert_eq!(split_path("scan.pdf"), ("", "scan.pdf"));
        assert_eq!(file_stem("a/b/report.v2.pdf"), "report.v2");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(extension("a/b/photo.JPG"), "JPG");
        assert_eq!(extension("README"), "");
        assert_eq!(join_path("Notes/", "x.md"), "Notes/x.md");
        assert_eq!(join_path("", "x.md"), "x.md");
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let store = LocalStore::new("/vault");
        assert_eq!(store.resolve("a/b.md").unwrap(), PathBuf::from("/vault/a/b.md"));
        assert!(store.resolve("../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn write_read_rename_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.write_text("Notes/a.md", "hello").await.unwrap();
        assert!(store.exists("Notes/a.md").await);
        assert_eq!(store.read_bytes("Notes/a.md").await.unwrap(), b"hello");

        tokio_test::assert_ok!(store.create_folder("Archive").await);
        tokio_test::assert_ok!(store.rename("Notes/a.md", "Archive/a.md").await);
        assert!(!store.exists("Notes/a.md").await);
        assert!(store.exists("Archive/a.md").await);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let err = tokio_test::assert_err!(store.read_bytes("nope.pdf").await);
        assert!(matches!(err, Pdf2MdError::FileNotFound { .. }));
    }
}
