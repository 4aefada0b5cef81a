//! Reader and writer registries.
//!
//! Both registries are filled during a setup phase and are read-only
//! afterwards, so a finished registry can be shared between threads.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::format::error::FormatError;
use crate::format::formats::{
    MetaImageFormat, NpyFormat, RasterFormat, VffFormat, VtkLegacyFormat,
};
use crate::format::magic;
use crate::format::traits::{Capabilities, FormatDescriptor, FormatReader, FormatWriter, HeaderStyle};

/// Lowercase an extension and make sure it starts with a dot.
pub fn normalize_extension(ext: &str) -> String {
    let lower = ext.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

fn lowercase_basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Glob patterns per format name, for file dialogs.
fn push_patterns(
    out: &mut IndexMap<String, Vec<String>>,
    descriptor: &FormatDescriptor,
    wanted: Capabilities,
) {
    if !wanted.is_empty() && !descriptor.capabilities.contains(wanted) {
        return;
    }
    for (ext, name) in descriptor.extensions {
        let pattern = if descriptor.whole_filename() {
            ext.to_string()
        } else {
            format!("*{}", normalize_extension(ext))
        };
        let patterns = out.entry(name.to_string()).or_default();
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
}

struct ReaderEntry {
    handler: Arc<dyn FormatReader>,
    descriptor: FormatDescriptor,
    /// Decided at registration: probe with the handler's own check rather
    /// than its magic list.
    custom_probe: bool,
}

impl ReaderEntry {
    fn probe(&self, path: &Path) -> Result<bool, FormatError> {
        match (self.custom_probe, self.handler.probe()) {
            (true, Some(probe)) => Ok(probe.can_read_file(path)? > 0),
            _ => magic::probe(path, self.descriptor.magic),
        }
    }
}

/// Registry of format readers.
///
/// Extension buckets are kept sorted; each bucket preserves registration
/// order.
#[derive(Default)]
pub struct ReaderRegistry {
    entries: Vec<ReaderEntry>,
    by_extension: BTreeMap<String, Vec<usize>>,
    by_filename: HashMap<String, Vec<usize>>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in readers registered.
    pub fn with_builtin_formats() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(MetaImageFormat));
        registry.register(Arc::new(VffFormat));
        registry.register(Arc::new(VtkLegacyFormat));
        for raster in RasterFormat::all() {
            registry.register(Arc::new(raster));
        }
        registry.register(Arc::new(NpyFormat));

        registry
    }

    /// Register a reader under every extension (or filename) it declares.
    pub fn register(&mut self, handler: Arc<dyn FormatReader>) {
        let descriptor = handler.descriptor();
        let custom_probe = handler.probe().is_some();
        let index = self.entries.len();

        for (ext, _) in descriptor.extensions {
            if descriptor.whole_filename() {
                self.by_filename
                    .entry(ext.to_lowercase())
                    .or_default()
                    .push(index);
            } else {
                self.by_extension
                    .entry(normalize_extension(ext))
                    .or_default()
                    .push(index);
            }
        }

        log::debug!(
            "Registered reader {} ({} names)",
            descriptor.id,
            descriptor.extensions.len()
        );
        self.entries.push(ReaderEntry {
            handler,
            descriptor,
            custom_probe,
        });
    }

    /// All registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        self.by_extension.keys().map(String::as_str).collect()
    }

    /// All registered whole filenames.
    pub fn filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_filename.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get a reader by its ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn FormatReader>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| Arc::clone(&e.handler))
    }

    /// Number of registered readers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Choose the reader for `path`.
    ///
    /// An exact whole-filename registration wins outright. Otherwise every
    /// extension bucket is walked, the file's own extension first, and each
    /// reader is probed at most once; the first positive probe wins.
    ///
    /// A probe that runs past the end of the file does not stop the walk,
    /// but if nothing matches the truncation is reported instead of
    /// [`FormatError::FormatNotFound`]. With the built-in formats this means
    /// any file shorter than the longest signature (12 bytes) gets
    /// [`FormatError::TruncatedFile`], even a short unrelated text file
    /// whose extension nobody registered. Use [`FormatError::is_truncation`]
    /// together with the file length before reporting such a file as
    /// corrupt.
    pub fn resolve(&self, path: &Path) -> Result<Arc<dyn FormatReader>, FormatError> {
        let basename = lowercase_basename(path);
        if let Some(&index) = self.by_filename.get(&basename).and_then(|v| v.first()) {
            let entry = &self.entries[index];
            log::debug!("{} matched by filename to {}", basename, entry.descriptor.id);
            return Ok(Arc::clone(&entry.handler));
        }

        let own = path
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()));

        let mut order: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        if let Some(pos) = own
            .as_deref()
            .and_then(|own| order.iter().position(|ext| *ext == own))
        {
            let ext = order.remove(pos);
            order.insert(0, ext);
        }

        let mut tested = vec![false; self.entries.len()];
        let mut truncation = None;

        for ext in order {
            for &index in &self.by_extension[ext] {
                if std::mem::replace(&mut tested[index], true) {
                    continue;
                }
                let entry = &self.entries[index];
                match entry.probe(path) {
                    Ok(true) => {
                        log::debug!(
                            "{} matched {} (via {})",
                            path.display(),
                            entry.descriptor.id,
                            ext
                        );
                        return Ok(Arc::clone(&entry.handler));
                    }
                    Ok(false) => {
                        log::trace!("{} rejected {}", entry.descriptor.id, path.display());
                    }
                    Err(FormatError::Io(e)) => return Err(FormatError::Io(e)),
                    Err(e) if e.is_truncation() => {
                        log::trace!("{} probe: {}", entry.descriptor.id, e);
                        truncation.get_or_insert(e);
                    }
                    Err(e) => {
                        log::debug!("{} probe failed: {}", entry.descriptor.id, e);
                    }
                }
            }
        }

        Err(truncation.unwrap_or_else(|| FormatError::not_found(path)))
    }

    /// Format name to glob patterns for readers whose capabilities contain
    /// every bit of `wanted` (empty: all readers).
    pub fn matching_format_strings(&self, wanted: Capabilities) -> IndexMap<String, Vec<String>> {
        let mut out = IndexMap::new();
        for entry in &self.entries {
            push_patterns(&mut out, &entry.descriptor, wanted);
        }
        out
    }
}

/// A writer chosen for a filename.
#[derive(Clone)]
pub struct ResolvedWriter {
    pub handler: Arc<dyn FormatWriter>,
    pub descriptor: FormatDescriptor,
    pub header_style: HeaderStyle,
}

struct WriterEntry {
    handler: Arc<dyn FormatWriter>,
    descriptor: FormatDescriptor,
    header_style: HeaderStyle,
}

impl WriterEntry {
    fn resolved(&self) -> ResolvedWriter {
        ResolvedWriter {
            handler: Arc::clone(&self.handler),
            descriptor: self.descriptor,
            header_style: self.header_style,
        }
    }
}

/// Registry of format writers.
///
/// Suffixes keep registration order, which decides between overlapping
/// suffixes such as `.raw.mha` and `.mha`.
#[derive(Default)]
pub struct WriterRegistry {
    entries: Vec<WriterEntry>,
    by_extension: IndexMap<String, Vec<usize>>,
    by_filename: HashMap<String, Vec<usize>>,
}

impl WriterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in writers registered.
    pub fn with_builtin_formats() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(MetaImageFormat));
        registry.register(Arc::new(VffFormat));
        registry.register(Arc::new(VtkLegacyFormat));
        for raster in RasterFormat::all() {
            registry.register(Arc::new(raster));
        }
        registry.register(Arc::new(NpyFormat));

        registry
    }

    /// Register a writer under every extension (or filename) it declares.
    pub fn register(&mut self, handler: Arc<dyn FormatWriter>) {
        let descriptor = handler.descriptor();
        let header_style = handler.header_style();
        let index = self.entries.len();

        for (ext, _) in descriptor.extensions {
            if descriptor.whole_filename() {
                self.by_filename
                    .entry(ext.to_lowercase())
                    .or_default()
                    .push(index);
            } else {
                self.by_extension
                    .entry(normalize_extension(ext))
                    .or_default()
                    .push(index);
            }
        }

        log::debug!(
            "Registered writer {} ({:?} header)",
            descriptor.id,
            header_style
        );
        self.entries.push(WriterEntry {
            handler,
            descriptor,
            header_style,
        });
    }

    /// All registered suffixes, in registration order.
    pub fn extensions(&self) -> Vec<&str> {
        self.by_extension.keys().map(String::as_str).collect()
    }

    /// Get a writer by its ID.
    pub fn get(&self, id: &str) -> Option<ResolvedWriter> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(WriterEntry::resolved)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Choose the writer for `path` without touching the file.
    ///
    /// Whole-filename registrations win; otherwise the first registered
    /// suffix the lowercased filename ends with.
    pub fn resolve(&self, path: &Path) -> Result<ResolvedWriter, FormatError> {
        let basename = lowercase_basename(path);
        if let Some(&index) = self.by_filename.get(&basename).and_then(|v| v.first()) {
            return Ok(self.entries[index].resolved());
        }

        let lower = path.to_string_lossy().to_lowercase();
        for (ext, indices) in &self.by_extension {
            if !lower.ends_with(ext.as_str()) {
                continue;
            }
            if let Some(&index) = indices.first() {
                let entry = &self.entries[index];
                log::debug!("{} will be written by {}", path.display(), entry.descriptor.id);
                return Ok(entry.resolved());
            }
        }

        Err(FormatError::unknown_extension(path))
    }

    /// Format name to glob patterns for writers whose capabilities contain
    /// every bit of `wanted` (empty: all writers).
    pub fn matching_format_strings(&self, wanted: Capabilities) -> IndexMap<String, Vec<String>> {
        let mut out = IndexMap::new();
        for entry in &self.entries {
            push_patterns(&mut out, &entry.descriptor, wanted);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("MHA"), ".mha");
        assert_eq!(normalize_extension(".Raw.MHA"), ".raw.mha");
    }

    #[test]
    fn test_builtin_readers() {
        let registry = ReaderRegistry::with_builtin_formats();
        let extensions = registry.extensions();

        for ext in [".mha", ".mhd", ".vff", ".vtk", ".png", ".tif", ".npy"] {
            assert!(extensions.contains(&ext), "missing {}", ext);
        }
        assert!(registry.get("metaimage").is_some());
        assert!(registry.get("nope").is_none());

        // Sorted
        let mut sorted = extensions.clone();
        sorted.sort_unstable();
        assert_eq!(extensions, sorted);
    }

    #[test]
    fn test_builtin_writers() {
        let registry = WriterRegistry::with_builtin_formats();
        let mha = registry.resolve(Path::new("/tmp/OUT.MHA")).unwrap();
        assert_eq!(mha.descriptor.id, "metaimage");
        assert_eq!(mha.header_style, HeaderStyle::Keywords);

        let png = registry.resolve(Path::new("slice.png")).unwrap();
        assert_eq!(png.header_style, HeaderStyle::None);

        let err = registry.resolve(Path::new("volume.xyz")).err().unwrap();
        assert!(matches!(err, FormatError::UnknownExtension { .. }));
    }

    #[test]
    fn test_matching_format_strings() {
        let registry = ReaderRegistry::with_builtin_formats();

        let all = registry.matching_format_strings(Capabilities::empty());
        let meta = all.get("MetaImage").unwrap();
        assert_eq!(meta, &vec!["*.mha".to_string(), "*.mhd".to_string()]);

        let volumes = registry.matching_format_strings(Capabilities::IMAGE_3D);
        assert!(volumes.contains_key("MetaImage"));
        assert!(!volumes.contains_key("PNG"));
    }
}
