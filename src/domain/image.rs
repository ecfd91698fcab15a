use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Property Image Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyImage {
    pub id: Uuid,
    pub property_id: Uuid,
    /// Stored name returned by the blob storage
    pub file: String,
    /// Visibility toggle, independent of soft delete
    pub enabled: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl PropertyImage {
    pub fn new(property_id: Uuid, file: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_id,
            file: file.into(),
            enabled: true,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    /// Shown in listings
    pub fn is_visible(&self) -> bool {
        self.enabled && !self.is_deleted
    }
}
