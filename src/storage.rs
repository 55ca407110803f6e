use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use crate::metrics::Metrics;

// ============================================================================
// Upload Store - files on local disk under UPLOAD_DIR
// ============================================================================
//
// Layout:
//   books/           book files (never served statically)
//   covers/          cover images (public)
//   avatars/         profile pictures (public)
//   payment-proofs/  manual payment evidence (never served statically)
//
// Stored names are `{unix_millis}-{random}{ext}`; client file names are
// never used on disk.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Unsupported file type: {content_type}")]
    UnsupportedType { content_type: String },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Invalid file name")]
    InvalidName,

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

const MB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    BookFile,
    Cover,
    Avatar,
    PaymentProof,
}

impl UploadKind {
    pub const ALL: [UploadKind; 4] = [
        UploadKind::BookFile,
        UploadKind::Cover,
        UploadKind::Avatar,
        UploadKind::PaymentProof,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            UploadKind::BookFile => "books",
            UploadKind::Cover => "covers",
            UploadKind::Avatar => "avatars",
            UploadKind::PaymentProof => "payment-proofs",
        }
    }

    pub fn max_bytes(&self) -> usize {
        match self {
            UploadKind::BookFile | UploadKind::Cover => 50 * MB,
            UploadKind::Avatar | UploadKind::PaymentProof => 5 * MB,
        }
    }

    /// Covers and avatars are linked from public pages.
    pub fn is_public(&self) -> bool {
        match self {
            UploadKind::Cover | UploadKind::Avatar => true,
            UploadKind::BookFile | UploadKind::PaymentProof => false,
        }
    }

    /// File extension for an accepted media type.
    fn extension_for(&self, content_type: &str) -> Option<&'static str> {
        let image = match content_type {
            "image/jpeg" | "image/jpg" => Some(".jpg"),
            "image/png" => Some(".png"),
            "image/webp" => Some(".webp"),
            "image/gif" => Some(".gif"),
            _ => None,
        };
        match self {
            UploadKind::BookFile => match content_type {
                "application/pdf" => Some(".pdf"),
                "application/epub+zip" => Some(".epub"),
                _ => None,
            },
            UploadKind::Cover | UploadKind::Avatar => image,
            UploadKind::PaymentProof => match content_type {
                "application/pdf" => Some(".pdf"),
                _ => image,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub kind: UploadKind,
    /// Path relative to the upload root, e.g. `covers/1718000000000-9f2c01ab.png`.
    pub relative_path: String,
    /// Set for public kinds only.
    pub public_url: Option<String>,
    pub size: usize,
}

pub struct UploadStore {
    root: PathBuf,
    public_base_url: String,
    metrics: Arc<Metrics>,
}

impl UploadStore {
    /// Create the store and its directory tree.
    pub async fn init(root: PathBuf, public_base_url: String, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        for kind in UploadKind::ALL {
            let dir = root.join(kind.dir());
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
        }
        tracing::info!(root = %root.display(), "📁 Upload store ready");
        Ok(Self {
            root,
            public_base_url,
            metrics,
        })
    }

    pub async fn save(
        &self,
        kind: UploadKind,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, UploadError> {
        let ext = validate(kind, content_type, bytes.len())?;

        let file_name = format!("{}-{:08x}{}", Utc::now().timestamp_millis(), rand::random::<u32>(), ext);
        let relative_path = format!("{}/{}", kind.dir(), file_name);
        tokio::fs::write(self.root.join(&relative_path), bytes).await?;

        self.metrics.record_upload(kind.dir());
        tracing::debug!(path = %relative_path, size = bytes.len(), "Stored upload");

        let public_url = kind
            .is_public()
            .then(|| format!("{}/uploads/{}", self.public_base_url, relative_path));

        Ok(StoredFile {
            kind,
            relative_path,
            public_url,
            size: bytes.len(),
        })
    }

    /// Absolute path of a stored file. Rejects anything that could escape the root.
    pub fn resolve(&self, relative_path: &str) -> Result<PathBuf, UploadError> {
        let path = Path::new(relative_path);
        let safe = !relative_path.is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(UploadError::InvalidName);
        }
        Ok(self.root.join(path))
    }

    /// Path of a file in one of the public directories.
    pub fn public_file(&self, kind: UploadKind, file_name: &str) -> Result<PathBuf, UploadError> {
        if !kind.is_public() || file_name.contains('/') || file_name.contains('\\') {
            return Err(UploadError::InvalidName);
        }
        self.resolve(&format!("{}/{}", kind.dir(), file_name))
    }

    /// Map a public URL produced by `save` back to its relative path.
    pub fn relative_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix("/uploads/"))
            .map(str::to_string)
    }

    /// Best-effort delete; a missing file is not an error.
    pub async fn remove(&self, relative_path: &str) {
        let Ok(path) = self.resolve(relative_path) else {
            tracing::warn!(path = relative_path, "Refusing to remove file outside upload root");
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = relative_path, "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = relative_path, error = %e, "Failed to remove upload"),
        }
    }
}

fn validate(kind: UploadKind, content_type: Option<&str>, size: usize) -> Result<&'static str, UploadError> {
    if size == 0 {
        return Err(UploadError::Empty);
    }
    if size > kind.max_bytes() {
        return Err(UploadError::TooLarge {
            limit: kind.max_bytes(),
        });
    }

    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    kind.extension_for(&essence)
        .ok_or(UploadError::UnsupportedType { content_type: essence })
}
