//! Reading façade.

use std::path::Path;
use std::sync::Arc;

use crate::config::IoConfig;
use crate::format::{
    DecodedImage, FormatDescriptor, FormatError, FormatReader, Progress, ProgressEvent,
    ProgressObserver, ReaderRegistry, sidecar,
};
use crate::header::{FreeformHeader, HeaderDefaults};
use crate::image::{Image, PixelBuffer};

/// Loads images by filename through a [`ReaderRegistry`].
pub struct MultiReader {
    registry: Arc<ReaderRegistry>,
    config: IoConfig,
    defaults: Option<Arc<dyn HeaderDefaults>>,
    observers: Vec<ProgressObserver>,
    reader_id: Option<&'static str>,
}

impl Default for MultiReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiReader {
    /// Reader over the built-in formats with default settings.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ReaderRegistry::with_builtin_formats()))
    }

    /// Reader over an already populated registry.
    pub fn with_registry(registry: Arc<ReaderRegistry>) -> Self {
        Self {
            registry,
            config: IoConfig::default(),
            defaults: None,
            observers: Vec::new(),
            reader_id: None,
        }
    }

    /// Header defaults and percentile bounds for loaded images.
    pub fn with_config(mut self, config: IoConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the header defaults collaborator for loaded images.
    pub fn with_header_defaults(mut self, defaults: Arc<dyn HeaderDefaults>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    /// Receive progress events from every subsequent load.
    pub fn add_observer(&mut self, observer: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.observers.push(Arc::new(observer));
    }

    /// Id of the handler used by the last successful load.
    pub fn reader_id(&self) -> Option<&'static str> {
        self.reader_id
    }

    /// Whether some registered reader claims `path`.
    pub fn can_read(&self, path: impl AsRef<Path>) -> bool {
        self.registry.resolve(path.as_ref()).is_ok()
    }

    fn progress(&self, path: &Path) -> Progress {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Progress::with_observers(self.observers.clone()).with_text(format!("Reading {}", name))
    }

    /// Decode with `reader` and merge the companion header, if any.
    ///
    /// Entries from the codec take precedence over companion entries.
    fn decode(
        reader: &dyn FormatReader,
        path: &Path,
        progress: &Progress,
    ) -> Result<DecodedImage, FormatError> {
        let mut decoded = reader.read(path, progress)?;
        if let Some(mut merged) = sidecar::read_sidecar(path)? {
            merged.extend(std::mem::take(&mut decoded.header));
            decoded.header = merged;
        }
        Ok(decoded)
    }

    fn wrap(
        &self,
        buffer: PixelBuffer,
        header: FreeformHeader,
        path: &Path,
        descriptor: &FormatDescriptor,
    ) -> Image {
        let mut image = Image::new(buffer)
            .with_filename(path)
            .with_config(&self.config)
            .with_freeform(header);
        if let Some(defaults) = &self.defaults {
            image = image.with_header_defaults(Arc::clone(defaults));
        }
        if descriptor.uses_mm {
            image.set_measurement_unit_to_mm();
        }
        image
    }

    /// Load the image at `path`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Image, FormatError> {
        let path = path.as_ref();
        let result = self.load_inner(path);
        if let Err(e) = &result {
            log::error!("Failed to load {}: {}", path.display(), e);
        }
        result
    }

    fn load_inner(&mut self, path: &Path) -> Result<Image, FormatError> {
        let reader = self.registry.resolve(path)?;
        let descriptor = reader.descriptor();
        let progress = self.progress(path);

        let decoded = Self::decode(reader.as_ref(), path, &progress)?;
        self.reader_id = Some(descriptor.id);

        log::info!(
            "Loaded {} with {} reader ({:?})",
            path.display(),
            descriptor.id,
            decoded.buffer.dimensions()
        );
        Ok(self.wrap(decoded.buffer, decoded.header, path, &descriptor))
    }

    /// Load one file per z-slice and stack them into a volume.
    ///
    /// The reader is chosen from the first file. Every slice must be a
    /// single plane with the same size, component count and scalar type.
    /// Progress is reported once per slice.
    pub fn load_series<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Image, FormatError> {
        let result = self.load_series_inner(paths);
        if let Err(e) = &result {
            log::error!("Failed to load series of {} files: {}", paths.len(), e);
        }
        result
    }

    fn load_series_inner<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Image, FormatError> {
        let first_path = paths
            .first()
            .map(|p| p.as_ref())
            .ok_or_else(|| FormatError::unsupported("empty file series"))?;
        let reader = self.registry.resolve(first_path)?;
        let descriptor = reader.descriptor();
        let progress = self.progress(first_path);
        let silent = Progress::silent();

        let mut stacked: Option<(PixelBuffer, FreeformHeader)> = None;
        let mut positions = Vec::with_capacity(paths.len());

        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let slice = Self::decode(reader.as_ref(), path, &silent)?;
            let [x, y, z] = slice.buffer.dimensions();
            if z != 1 {
                return Err(FormatError::decode(
                    path,
                    descriptor.id,
                    format!("series slice has depth {}", z),
                ));
            }
            positions.push(slice.buffer.origin()[2]);

            if let Some((volume, _)) = stacked.as_mut() {
                let [vx, vy, _] = volume.dimensions();
                let compatible = [vx, vy] == [x, y]
                    && volume.components() == slice.buffer.components()
                    && volume.data_mut().append(slice.buffer.data());
                if !compatible {
                    return Err(FormatError::decode(
                        path,
                        descriptor.id,
                        "slice does not match the first slice of the series",
                    ));
                }
            } else {
                stacked = Some((slice.buffer, slice.header));
            }
            progress.report_step(index + 1, paths.len());
        }

        let (first, header) =
            stacked.ok_or_else(|| FormatError::unsupported("empty file series"))?;
        let [x, y, _] = first.dimensions();
        let spacing = first.spacing();
        let origin = first.origin();
        let components = first.components();
        let data = first.data().clone();

        let buffer = PixelBuffer::new([x, y, paths.len()], components, data)
            .map_err(|e| FormatError::decode(first_path, descriptor.id, e))?
            .with_spacing(spacing)
            .with_origin(origin);

        let mut image = self.wrap(buffer, header, first_path, &descriptor);
        if positions.windows(2).any(|w| w[0] != w[1]) {
            image.set_slice_positions(2, positions);
        }
        self.reader_id = Some(descriptor.id);

        log::info!(
            "Loaded series of {} slices with {} reader",
            paths.len(),
            descriptor.id
        );
        Ok(image)
    }
}
