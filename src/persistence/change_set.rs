use crate::domain::{Owner, Property, PropertyImage, PropertyTrace};

// ============================================================================
// Pending Changes
// ============================================================================
//
// Writes staged by repositories, flushed in order by `save_changes`.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    InsertOwner(Owner),
    InsertProperty(Property),
    UpdateProperty(Property),
    InsertImage(PropertyImage),
    InsertTrace(PropertyTrace),
}

impl PendingChange {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingChange::InsertOwner(_) => "InsertOwner",
            PendingChange::InsertProperty(_) => "InsertProperty",
            PendingChange::UpdateProperty(_) => "UpdateProperty",
            PendingChange::InsertImage(_) => "InsertImage",
            PendingChange::InsertTrace(_) => "InsertTrace",
        }
    }
}
