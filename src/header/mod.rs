//! DICOM-style header model.
//!
//! - [`MetadataRecord`]: ordered tag to element table with typed accessors
//! - [`SliceHeaderOverlay`]: per-slice exceptions over a base record
//! - [`HeaderDefaults`]: builds the initial record of an image
//! - [`keywords`]: free-form `key = value` headers and `dicom_` folding

mod defaults;
mod error;
pub mod keywords;
mod overlay;
mod record;
mod tag;

pub use defaults::{DefaultedHeader, HeaderDefaults, StandardHeaderDefaults, age_string, parse_date};
pub use error::TagConversionError;
pub use keywords::{FreeformHeader, HeaderValue};
pub use overlay::SliceHeaderOverlay;
pub use record::{Element, MetadataRecord};
pub use tag::{Tag, Value, Vr, tags};
