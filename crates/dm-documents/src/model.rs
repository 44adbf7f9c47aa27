//! Document Model

use chrono::{DateTime, Utc};
use dm_core::traits::{Entity, Id, Identifiable, Timestamped};
use dm_files::File;
use serde::{Deserialize, Serialize};

/// Polymorphic reference to the record a document belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Owner type discriminator (e.g., "Project")
    pub owner_type: String,
    /// Owner ID
    pub owner_id: Id,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: Id) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id,
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.owner_id)
    }
}

/// A file attached to an owner record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Id,
    pub owner_type: String,
    pub owner_id: Id,
    /// Extracted or annotated text
    pub text: Option<String>,
    /// The stored file, owned by this document
    pub file: Option<File>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(&self.owner_type, self.owner_id)
    }

    pub fn belongs_to(&self, owner: &OwnerRef) -> bool {
        self.owner_type == owner.owner_type && self.owner_id == owner.owner_id
    }

    pub fn original_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.original_name.as_str())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.mime_type.as_str())
    }
}

impl Identifiable for Document {
    fn id(&self) -> Option<Id> {
        Some(self.id)
    }
}

impl Timestamped for Document {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

impl Entity for Document {
    const TABLE_NAME: &'static str = "documents";
    const TYPE_NAME: &'static str = "Document";
}
