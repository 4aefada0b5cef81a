//! Filename-driven loading and saving.
//!
//! [`MultiReader`] and [`MultiWriter`] are the entry points most callers
//! need: hand them a path, and they pick a codec from their registry, drive
//! it with the registered progress observers, and convert between codec
//! output and [`crate::image::Image`].
//!
//! ```rust,ignore
//! use mvio::multi::{MultiReader, MultiWriter};
//!
//! let mut reader = MultiReader::new();
//! let image = reader.load("scan.vff")?;
//! println!("patient: {:?}", image.patient_name());
//!
//! MultiWriter::new().save(&image, "scan.mha")?;
//! ```

mod reader;
mod writer;


pub use reader::MultiReader;
pub use writer::MultiWriter;
