//! Report photos on local disk.
//!
//! Each photo is one file named `<uuid>.<ext>`, where the extension comes
//! from the image subtype. That file name is the media reference stored on
//! the report and the id served at `GET /media/{id}`. Uploads are written
//! to a `.part` file first and renamed once complete.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tatsahay_core::{MediaError, MediaStore};
use tatsahay_shared::constants::MEDIA_CONTENT_PREFIX;

/// Resolve `name` inside `base`, rejecting anything that could escape it.
fn ensure_within(base: &Path, name: &str) -> Result<PathBuf, MediaError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(base.join(file)),
        _ => Err(MediaError::NotFound(name.to_string())),
    }
}

const PARTIAL_SUFFIX: &str = ".part";

/// Validate a media reference of the form `<uuid>.<ext>`.
fn parse_ref(media_ref: &str) -> Result<(), MediaError> {
    let not_found = || MediaError::NotFound(media_ref.to_string());
    let (stem, ext) = media_ref.split_once('.').ok_or_else(not_found)?;
    Uuid::parse_str(stem).map_err(|_| not_found())?;
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(not_found());
    }
    Ok(())
}

/// File extension for an accepted content type, `None` if not an image.
fn extension_for(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let subtype = essence.strip_prefix(MEDIA_CONTENT_PREFIX)?;
    let ext = match subtype {
        "jpeg" | "jpg" | "pjpeg" => "jpg".to_string(),
        other if !other.is_empty() && other.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            other.to_string()
        }
        _ => return None,
    };
    Some(ext)
}

/// Content type to serve a stored file with.
pub fn content_type_for(media_ref: &str) -> &'static str {
    match media_ref.rsplit('.').next() {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Delete `.part` files left behind by uploads that never finished.
async fn remove_partial_uploads(base: &Path) -> usize {
    let mut removed = 0;
    let mut entries = match fs::read_dir(base).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %base.display(), error = %e, "Failed to scan media directory");
            return 0;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(
                file = %entry.path().display(),
                error = %e,
                "Failed to remove partial upload"
            ),
        }
    }
    removed
}

#[derive(Debug, Clone)]
pub struct DiskMediaStore {
    base_path: PathBuf,
    max_size: usize,
}

impl DiskMediaStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, MediaError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            MediaError::Storage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        let removed = remove_partial_uploads(&base_path).await;
        info!(
            path = %base_path.display(),
            max_size,
            removed_partial = removed,
            "Media store initialized"
        );

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub async fn get(&self, media_ref: &str) -> Result<Bytes, MediaError> {
        parse_ref(media_ref)?;
        let path = ensure_within(&self.base_path, media_ref)?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!(media = media_ref, size = data.len(), "Read media");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(media_ref.to_string()))
            }
            Err(e) => Err(MediaError::Storage(format!(
                "Failed to read media {media_ref}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn store(&self, data: Bytes, content_type: &str) -> Result<String, MediaError> {
        if data.is_empty() {
            return Err(MediaError::Empty);
        }
        if data.len() > self.max_size {
            return Err(MediaError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        let ext = extension_for(content_type)
            .ok_or_else(|| MediaError::UnsupportedType(content_type.to_string()))?;

        let media_ref = format!("{}.{}", Uuid::new_v4(), ext);
        let path = ensure_within(&self.base_path, &media_ref)?;
        let partial = ensure_within(&self.base_path, &format!("{media_ref}{PARTIAL_SUFFIX}"))?;

        let written = match fs::write(&partial, &data).await {
            Ok(()) => fs::rename(&partial, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(MediaError::Storage(format!(
                "Failed to write media {media_ref}: {e}"
            )));
        }

        debug!(media = %media_ref, size = data.len(), content_type, "Stored media");
        Ok(media_ref)
    }

    async fn exists(&self, media_ref: &str) -> Result<bool, MediaError> {
        if parse_ref(media_ref).is_err() {
            return Ok(false);
        }
        let path = ensure_within(&self.base_path, media_ref)?;
        fs::try_exists(&path).await.map_err(|e| {
            MediaError::Storage(format!("Failed to check media {media_ref}: {e}"))
        })
    }

    async fn discard(&self, media_ref: &str) -> Result<(), MediaError> {
        parse_ref(media_ref)?;
        let path = ensure_within(&self.base_path, media_ref)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(media = media_ref, "Discarded media");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaError::Storage(format!(
                "Failed to delete media {media_ref}: {e}"
            ))),
        }
    }
}
