//! Format dispatch: choosing and driving a codec for a file.
//!
//! Readers and writers are registered once in a [`ReaderRegistry`] or
//! [`WriterRegistry`] and looked up by filename afterwards.
//!
//! ## Reader dispatch
//!
//! - An exact whole-filename registration wins without probing.
//! - Otherwise every registered extension is tried, the file's own
//!   extension first, and each reader's signature is probed at most once.
//!   The first positive probe wins; content beats the extension.
//!
//! ## Writer dispatch
//!
//! Writing never reads the target. The first registered suffix the
//! lowercased filename ends with picks the writer, so `.raw.mha` can be
//! told apart from `.mha`.
//!
//! ## Built-in codecs
//!
//! - **MetaImage** (`.mha`, `.mhd`)
//! - **VFF** (`.vff`)
//! - **VTK structured points** (`.vtk`)
//! - **Raster** (PNG, BMP, JPEG, TIFF, PNM)
//! - **NumPy** (`.npy`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mvio::format::{Progress, ReaderRegistry};
//!
//! let registry = ReaderRegistry::with_builtin_formats();
//! let reader = registry.resolve(Path::new("scan.mha"))?;
//! let decoded = reader.read(Path::new("scan.mha"), &Progress::silent())?;
//! ```

mod error;
pub mod formats;
pub mod magic;
mod progress;
mod registry;
pub mod sidecar;
mod traits;

#[cfg(test)]
mod tests;

pub use error::FormatError;
pub use magic::Magic;
pub use progress::{Progress, ProgressEvent, ProgressObserver};
pub use registry::{ReaderRegistry, ResolvedWriter, WriterRegistry, normalize_extension};
pub use traits::{
    Capabilities, DecodedImage, EncodeHeader, FileProbe, FormatDescriptor, FormatReader,
    FormatWriter, HeaderStyle,
};
