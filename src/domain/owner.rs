use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Owner Entity
// ============================================================================
//
// Owners cannot be removed while a property references them.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub birth_date: NaiveDate,
    /// Stored file name of the owner's photo
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(name: impl Into<String>, address: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: address.into(),
            birth_date,
            photo: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}
