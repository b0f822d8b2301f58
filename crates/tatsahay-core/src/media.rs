use async_trait::async_trait;
use bytes::Bytes;

use crate::error::MediaError;

/// Durable storage for report photos.
///
/// `store` returns an opaque reference that the report keeps in its
/// `image_ref` field.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, data: Bytes, content_type: &str) -> Result<String, MediaError>;

    /// Whether `media_ref` names media this store holds. Malformed
    /// references are simply absent.
    async fn exists(&self, media_ref: &str) -> Result<bool, MediaError>;

    /// Remove media that ended up unreferenced. Best effort.
    async fn discard(&self, media_ref: &str) -> Result<(), MediaError>;
}
