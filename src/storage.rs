//! Upload directory shared by the ingress handler, the explainers and the
//! static file route.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use axum::body::Bytes;
use image::ImageFormat;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl StorageError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An image received from a client, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub original_filename: Option<String>,
    pub format: ImageFormat,
}

impl UploadedImage {
    /// Returns `None` when the bytes do not start with a known image signature.
    pub fn detect(bytes: Bytes, original_filename: Option<&str>) -> Option<Self> {
        let format = image::guess_format(&bytes).ok()?;
        Some(UploadedImage {
            bytes,
            original_filename: original_filename.and_then(display_name),
            format,
        })
    }

    fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Server-generated file name, relative to the upload directory
    pub name: String,
    pub path: PathBuf,
    pub original_filename: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Opens the store, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io("create", &root, e))?;
        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| StorageError::io("resolve", &root, e))?;
        Ok(UploadStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists an upload under a fresh unique name. The client filename is
    /// kept as metadata and never touches the filesystem.
    pub async fn save(&self, upload: &UploadedImage) -> Result<StoredImage, StorageError> {
        let name = format!("{}.{}", Uuid::new_v4(), upload.extension());
        let path = self.write_new(&name, &upload.bytes).await?;

        tracing::debug!(
            name = %name,
            original = upload.original_filename.as_deref().unwrap_or("-"),
            size = upload.bytes.len(),
            "stored upload"
        );

        Ok(StoredImage {
            name,
            path,
            original_filename: upload.original_filename.clone(),
            size: upload.bytes.len(),
        })
    }

    /// Writes `bytes` to `name` in the upload directory. Fails if the file
    /// already exists.
    pub async fn write_new(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.resolve(name)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("create", &path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StorageError::io("write", &path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io("flush", &path, e))?;
        Ok(path)
    }

    /// Copies `source` to `name` in the upload directory. Like `write_new`,
    /// fails if `name` already exists.
    pub async fn copy_into(&self, source: &Path, name: &str) -> Result<PathBuf, StorageError> {
        let bytes = fs::read(source)
            .await
            .map_err(|e| StorageError::io("read", source, e))?;
        self.write_new(name, &bytes).await
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(relative.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(relative.to_string()))
            }
            Err(e) => return Err(StorageError::io("stat", &path, e)),
        }
        fs::read(&path)
            .await
            .map_err(|e| StorageError::io("read", &path, e))
    }

    /// Maps a relative path onto the upload directory. Only plain path
    /// segments are accepted, so the result never escapes the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut clean = PathBuf::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(segment) => clean.push(segment),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath(relative.to_string()))
                }
            }
        }
        if clean.as_os_str().is_empty() || relative.contains('\\') {
            return Err(StorageError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(clean))
    }
}

/// Last path segment of a client-supplied filename, for display only.
pub fn display_name(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake-png-payload";

    async fn temp_store() -> (TempDir, UploadStore) {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).await.unwrap();
        (dir, store)
    }

    fn png_upload(name: &str) -> UploadedImage {
        UploadedImage::detect(Bytes::from_static(PNG), Some(name)).unwrap()
    }

    #[test]
    fn test_detect_rejects_non_image() {
        assert!(UploadedImage::detect(Bytes::from_static(b"just some text"), Some("a.png")).is_none());
        assert!(UploadedImage::detect(Bytes::new(), None).is_none());
    }

    #[test]
    fn test_detect_strips_directories_from_filename() {
        let upload = png_upload("../../etc/passwd");
        assert_eq!(upload.format, ImageFormat::Png);
        assert_eq!(upload.original_filename.as_deref(), Some("passwd"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("lesion.jpg").as_deref(), Some("lesion.jpg"));
        assert_eq!(display_name("C:\\photos\\lesion.jpg").as_deref(), Some("lesion.jpg"));
        assert_eq!(display_name("photos/"), None);
        assert_eq!(display_name(".."), None);
        assert_eq!(display_name(""), None);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("uploads");
        let store = UploadStore::open(&root).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_save_uses_generated_name() {
        let (_dir, store) = temp_store().await;

        let stored = store.save(&png_upload("lesion.png")).await.unwrap();

        assert!(stored.name.ends_with(".png"));
        assert_ne!(stored.name, "lesion.png");
        assert_eq!(stored.path.parent(), Some(store.root()));
        assert_eq!(stored.size, PNG.len());
        assert_eq!(store.read(&stored.name).await.unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_same_client_name_does_not_overwrite() {
        let (_dir, store) = temp_store().await;

        let first = store.save(&png_upload("lesion.png")).await.unwrap();
        let second = store.save(&png_upload("lesion.png")).await.unwrap();

        assert_ne!(first.name, second.name);
        assert!(store.exists(&first.name).await);
        assert!(store.exists(&second.name).await);
    }

    #[tokio::test]
    async fn test_traversal_filename_stays_inside_root() {
        let (dir, store) = temp_store().await;

        let stored = store.save(&png_upload("../../escape.png")).await.unwrap();

        assert!(stored.path.starts_with(store.root()));
        assert!(!dir.path().join("escape.png").exists());
    }

    #[tokio::test]
    async fn test_write_new_refuses_existing_file() {
        let (_dir, store) = temp_store().await;

        store.write_new("a.png", PNG).await.unwrap();
        let err = store.write_new("a.png", b"other").await.unwrap_err();

        assert!(matches!(err, StorageError::Io { op: "create", .. }));
        assert_eq!(store.read("a.png").await.unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_copy_into_refuses_existing_target() {
        let (_dir, store) = temp_store().await;
        let source = store.write_new("source.png", PNG).await.unwrap();
        store.write_new("heatmap_source.png", b"earlier").await.unwrap();

        let err = store
            .copy_into(&source, "heatmap_source.png")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io { op: "create", .. }));
        assert_eq!(store.read("heatmap_source.png").await.unwrap(), b"earlier");
    }

    #[tokio::test]
    async fn test_copy_into_duplicates_bytes() {
        let (_dir, store) = temp_store().await;
        let source = store.write_new("source.png", PNG).await.unwrap();

        let target = store.copy_into(&source, "copy.png").await.unwrap();

        assert_eq!(target.parent(), Some(store.root()));
        assert_eq!(store.read("copy.png").await.unwrap(), PNG);
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let store = UploadStore {
            root: PathBuf::from("/srv/uploads"),
        };

        for bad in ["", ".", "../secret", "a/../../b", "/etc/passwd", "..\\secret"] {
            assert!(
                matches!(store.resolve(bad), Err(StorageError::InvalidPath(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(
            store.resolve("./nested/a.png").unwrap(),
            PathBuf::from("/srv/uploads/nested/a.png")
        );
    }

    #[tokio::test]
    async fn test_read_missing_and_directory_are_not_found() {
        let (_dir, store) = temp_store().await;
        tokio::fs::create_dir(store.root().join("sub")).await.unwrap();

        assert!(matches!(store.read("nope.png").await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.read("sub").await, Err(StorageError::NotFound(_))));
    }
}
