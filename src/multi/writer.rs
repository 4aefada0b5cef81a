//! Writing façade.

use std::path::Path;
use std::sync::Arc;

use crate::format::{
    EncodeHeader, FormatError, HeaderStyle, Progress, ProgressEvent, ProgressObserver,
    ResolvedWriter, WriterRegistry,
};
use crate::header::keywords::record_to_keywords;
use crate::image::Image;

/// Saves images by filename through a [`WriterRegistry`].
pub struct MultiWriter {
    registry: Arc<WriterRegistry>,
    observers: Vec<ProgressObserver>,
    writer_id: Option<&'static str>,
}

impl Default for MultiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiWriter {
    /// Writer over the built-in formats.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(WriterRegistry::with_builtin_formats()))
    }

    pub fn with_registry(registry: Arc<WriterRegistry>) -> Self {
        Self {
            registry,
            observers: Vec::new(),
            writer_id: None,
        }
    }

    pub fn registry(&self) -> &WriterRegistry {
        &self.registry
    }

    /// Receive progress events from every subsequent save.
    pub fn add_observer(&mut self, observer: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.observers.push(Arc::new(observer));
    }

    /// Id of the handler used by the last successful save.
    pub fn writer_id(&self) -> Option<&'static str> {
        self.writer_id
    }

    /// Whether some registered writer claims `path`. Never touches the file.
    pub fn can_write(&self, path: impl AsRef<Path>) -> bool {
        self.registry.resolve(path.as_ref()).is_ok()
    }

    /// Save `image` to `path`, choosing the writer from the filename.
    ///
    /// The header handed to the writer follows its declared style: keyword
    /// writers get the record flattened to `dicom_<Keyword>` pairs plus the
    /// free-form entries, structured writers get the record itself.
    pub fn save(&mut self, image: &Image, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let path = path.as_ref();
        let result = self.save_inner(image, path);
        if let Err(e) = &result {
            log::error!("Failed to save {}: {}", path.display(), e);
        }
        result
    }

    fn save_inner(&mut self, image: &Image, path: &Path) -> Result<(), FormatError> {
        let resolved = self.registry.resolve(path)?;
        let header = Self::encode_header(image, path, &resolved)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let progress =
            Progress::with_observers(self.observers.clone()).with_text(format!("Writing {}", name));

        let shared = image
            .buffer()
            .map_err(|e| FormatError::encode(path, resolved.descriptor.id, e))?;
        {
            let buffer = shared.read();
            resolved.handler.write(path, &buffer, &header, &progress)?;
        }
        self.writer_id = Some(resolved.descriptor.id);

        log::info!(
            "Saved {} with {} writer",
            path.display(),
            resolved.descriptor.id
        );
        Ok(())
    }

    fn encode_header(
        image: &Image,
        path: &Path,
        resolved: &ResolvedWriter,
    ) -> Result<EncodeHeader, FormatError> {
        let header = match resolved.header_style {
            HeaderStyle::None => EncodeHeader::None,
            HeaderStyle::Keywords => {
                let record = image
                    .header()
                    .map_err(|e| FormatError::encode(path, resolved.descriptor.id, e))?;
                EncodeHeader::Keywords(record_to_keywords(&record, &image.freeform()))
            }
            HeaderStyle::Structured => EncodeHeader::Structured(
                image
                    .header()
                    .map_err(|e| FormatError::encode(path, resolved.descriptor.id, e))?,
            ),
        };
        Ok(header)
    }
}
