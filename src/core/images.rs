//! Image service abstraction
//!
//! Images live in their own collection and point back to the record that
//! owns them through `parentType` / `parentId`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::store::StoreError;

/// Image payload submitted alongside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
    /// Owner type, filled in by the repository
    #[serde(default)]
    pub parent_type: String,
    /// Owner id, filled in by the repository
    #[serde(default)]
    pub parent_id: String,
}

impl NewImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            blur_hash: None,
            parent_type: String::new(),
            parent_id: String::new(),
        }
    }

    /// Tag the image with its owning record
    pub fn owned_by(mut self, parent_type: &str, parent_id: &str) -> Self {
        self.parent_type = parent_type.to_string();
        self.parent_id = parent_id.to_string();
        self
    }
}

/// A stored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
    pub status: bool,
    pub parent_type: String,
    pub parent_id: String,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Store images; each is created active
    async fn insert_images(&self, images: Vec<NewImage>) -> Result<Vec<ImageRecord>, StoreError>;

    /// Remove every image owned by the given record, returning how many went
    async fn delete_by_parent(&self, parent_type: &str, parent_id: &str) -> Result<u64, StoreError>;
}
