// ============================================================================
// Domain Layer - Plain Property Management Data
// ============================================================================
//
// Entities are plain values. They carry no persistence session and are
// handed to repositories explicitly.
//
// ============================================================================

pub mod filters;
pub mod image;
pub mod money;
pub mod owner;
pub mod property;
pub mod trace;

pub use filters::PropertyFilters;
pub use image::PropertyImage;
pub use owner::Owner;
pub use property::{Property, PropertyDetails};
pub use trace::PropertyTrace;
