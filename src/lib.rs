//! mvio - volumetric image I/O
//!
//! Format dispatch for medical and scientific volume files, plus a lazily
//! synthesized DICOM-style header for every loaded image.
//!
//! - [`format`]: reader/writer registries and the built-in codecs
//! - [`image`]: pixel buffers and the [`image::Image`] wrapper
//! - [`header`]: the tag/element header model and its defaults
//! - [`multi`]: filename-driven load and save
//! - [`config`]: JSON configuration and logging setup

pub mod config;
pub mod constants;
pub mod format;
pub mod header;
pub mod image;
pub mod multi;
