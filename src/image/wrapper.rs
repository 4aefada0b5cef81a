//! Uniform image wrapper produced by readers and consumed by writers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::IoConfig;
use crate::constants::{
    DEFAULT_PERCENTILE_HIGH, DEFAULT_PERCENTILE_LOW, DEFAULT_VALUE_NAME, DEFAULT_VALUE_UNIT,
};
use crate::header::{
    FreeformHeader, HeaderDefaults, HeaderValue, MetadataRecord, SliceHeaderOverlay,
    StandardHeaderDefaults, Tag, Value, Vr, tags,
};
use crate::image::buffer::{
    BufferDescriptor, ByteOrder, PixelBuffer, PixelData, SharedBuffer, WeakBuffer,
};
use crate::image::dimension::{Dimension, DimensionKind, default_dimensions};
use crate::image::error::ImageError;
use crate::image::stats::{percentile_range, window_from_range};
use crate::image::synthesis::{HeaderCache, SynthesisContext};

enum BufferSource {
    Owned(SharedBuffer),
    Observed(WeakBuffer),
}

/// Pixel buffer plus a lazily synthesized DICOM-style header.
///
/// The header is built on first access and cached. It is rebuilt only when
/// the buffer's modification stamp moves, and then only the elements that
/// depend on pixel content are re-derived.
pub struct Image {
    source: BufferSource,
    defaults: Arc<dyn HeaderDefaults>,
    percentiles: (f64, f64),
    filename: Option<PathBuf>,
    dimensions: [Dimension; 3],
    value_name: String,
    value_unit: String,
    slice_positions: [Option<Vec<f64>>; 3],
    cache: Mutex<HeaderCache>,
}

impl Image {
    /// Wrap a buffer this image owns.
    pub fn new(buffer: PixelBuffer) -> Self {
        Self::with_source(BufferSource::Owned(buffer.into_shared()))
    }

    /// Share ownership of an existing buffer.
    pub fn from_shared(buffer: SharedBuffer) -> Self {
        Self::with_source(BufferSource::Owned(buffer))
    }

    /// Observe a buffer owned elsewhere without extending its lifetime.
    pub fn observe(buffer: &SharedBuffer) -> Self {
        Self::with_source(BufferSource::Observed(Arc::downgrade(buffer)))
    }

    fn with_source(source: BufferSource) -> Self {
        Self {
            source,
            defaults: Arc::new(StandardHeaderDefaults::default()),
            percentiles: (DEFAULT_PERCENTILE_LOW, DEFAULT_PERCENTILE_HIGH),
            filename: None,
            dimensions: default_dimensions(),
            value_name: DEFAULT_VALUE_NAME.to_string(),
            value_unit: DEFAULT_VALUE_UNIT.to_string(),
            slice_positions: [None, None, None],
            cache: Mutex::new(HeaderCache::new(FreeformHeader::new())),
        }
    }

    /// File the pixels were read from.
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Replace the collaborator used for first synthesis.
    pub fn with_header_defaults(mut self, defaults: Arc<dyn HeaderDefaults>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Free-form header handed to the defaults collaborator.
    pub fn with_freeform(mut self, header: FreeformHeader) -> Self {
        self.cache.get_mut().freeform = header;
        self
    }

    /// Take header defaults and percentile bounds from `config`.
    pub fn with_config(mut self, config: &IoConfig) -> Self {
        self.defaults = Arc::new(StandardHeaderDefaults::new(config.header.clone()));
        self.percentiles = config.percentiles();
        self
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// The pixel buffer, failing once an observed producer has gone.
    pub fn buffer(&self) -> Result<SharedBuffer, ImageError> {
        match &self.source {
            BufferSource::Owned(buffer) => Ok(Arc::clone(buffer)),
            BufferSource::Observed(weak) => weak.upgrade().ok_or(ImageError::ProducerDropped),
        }
    }

    /// Whether the image keeps its buffer alive.
    pub fn owns_buffer(&self) -> bool {
        matches!(self.source, BufferSource::Owned(_))
    }

    pub fn descriptor(&self) -> Result<BufferDescriptor, ImageError> {
        Ok(self.buffer()?.read().descriptor())
    }

    /// Run `f` on the up-to-date slice header set.
    fn with_overlay<R>(&self, f: impl FnOnce(&mut SliceHeaderOverlay) -> R) -> Result<R, ImageError> {
        let buffer = self.buffer()?;
        let buffer = buffer.read();
        let ctx = SynthesisContext {
            defaults: self.defaults.as_ref(),
            filename: self.filename.as_deref(),
            percentiles: self.percentiles,
        };
        let mut cache = self.cache.lock();
        Ok(f(cache.refresh(&buffer, &ctx)))
    }

    /// The synthesized base header.
    pub fn header(&self) -> Result<MetadataRecord, ImageError> {
        self.with_overlay(|overlay| overlay.base().clone())
    }

    /// Effective header of slice `index`.
    pub fn slice_header(&self, index: usize) -> Result<MetadataRecord, ImageError> {
        let depth = self.descriptor()?.dimensions[2];
        if index >= depth {
            return Err(ImageError::SliceOutOfRange { index, depth });
        }
        self.with_overlay(|overlay| overlay.get(index))
    }

    /// Base header plus every per-slice exception.
    pub fn slice_headers(&self) -> Result<SliceHeaderOverlay, ImageError> {
        self.with_overlay(|overlay| overlay.clone())
    }

    /// Whether the header has been synthesized yet.
    pub fn is_header_synthesized(&self) -> bool {
        self.cache.lock().is_synthesized()
    }

    /// Set an authoritative header element. It is never re-derived.
    pub fn set_tag(&self, tag: Tag, value: impl Into<Value>) -> Result<(), ImageError> {
        let value = value.into();
        self.with_overlay(|overlay| overlay.base_mut().set(tag, value))??;
        Ok(())
    }

    /// Set an authoritative element with an explicit VR.
    pub fn set_tag_with_vr(&self, tag: Tag, vr: Vr, value: impl Into<Value>) -> Result<(), ImageError> {
        let value = value.into();
        self.with_overlay(|overlay| overlay.base_mut().set_with_vr(tag, vr, value))??;
        Ok(())
    }

    /// Remove a header element.
    pub fn remove_tag(&self, tag: Tag) -> Result<(), ImageError> {
        self.with_overlay(|overlay| {
            overlay.base_mut().remove(tag);
        })
    }

    /// Record a per-slice exception.
    pub fn set_slice_tag(
        &self,
        index: usize,
        tag: Tag,
        vr: Vr,
        value: impl Into<Value>,
    ) -> Result<(), ImageError> {
        let value = value.into();
        self.with_overlay(|overlay| overlay.set_slice_tag(index, tag, vr, value))??;
        Ok(())
    }

    /// Store an edited slice header; only tags that differ from the base
    /// are kept.
    pub fn commit_slice_header(&self, index: usize, record: &MetadataRecord) -> Result<(), ImageError> {
        self.with_overlay(|overlay| overlay.commit(index, record))
    }

    /// Free-form header entries that did not map onto header elements.
    pub fn freeform(&self) -> FreeformHeader {
        self.cache.lock().freeform.clone()
    }

    pub fn set_freeform_entry(&self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.cache.lock().freeform.insert(key.into(), value.into());
    }

    /// Mutate pixel values. Marks the buffer modified.
    ///
    /// The value count must stay unchanged; see [`PixelBuffer::modify_data`].
    pub fn modify_pixels<R>(&self, f: impl FnOnce(&mut PixelData) -> R) -> Result<R, ImageError> {
        let buffer = self.buffer()?;
        let mut buffer = buffer.write();
        buffer.modify_data(f)
    }

    pub fn set_spacing(&self, spacing: [f64; 3]) -> Result<(), ImageError> {
        self.buffer()?.write().set_spacing(spacing);
        Ok(())
    }

    pub fn set_origin(&self, origin: [f64; 3]) -> Result<(), ImageError> {
        self.buffer()?.write().set_origin(origin);
        Ok(())
    }

    /// Number of axes longer than one voxel.
    pub fn rank(&self) -> Result<usize, ImageError> {
        let dims = self.descriptor()?.dimensions;
        Ok(dims.iter().filter(|&&d| d > 1).count())
    }

    pub fn dimensions(&self) -> &[Dimension; 3] {
        &self.dimensions
    }

    pub fn set_dimension(&mut self, axis: usize, dimension: Dimension) {
        if let Some(slot) = self.dimensions.get_mut(axis) {
            *slot = dimension;
        }
    }

    /// Switch every distance axis to millimetres.
    pub fn set_measurement_unit_to_mm(&mut self) {
        for dimension in &mut self.dimensions {
            if dimension.kind == DimensionKind::Distance {
                dimension.unit = "mm".to_string();
            }
        }
    }

    /// Unit of the x axis.
    pub fn measurement_unit(&self) -> &str {
        &self.dimensions[0].unit
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn value_unit(&self) -> &str {
        &self.value_unit
    }

    pub fn set_value_name(&mut self, name: impl Into<String>) {
        self.value_name = name.into();
    }

    pub fn set_value_unit(&mut self, unit: impl Into<String>) {
        self.value_unit = unit.into();
    }

    /// Explicit slice positions along `axis`, if any were recorded.
    pub fn slice_positions(&self, axis: usize) -> Option<&[f64]> {
        self.slice_positions.get(axis)?.as_deref()
    }

    pub fn set_slice_positions(&mut self, axis: usize, positions: Vec<f64>) {
        if let Some(slot) = self.slice_positions.get_mut(axis) {
            *slot = Some(positions);
        }
    }

    /// Copy axis descriptors, base header elements and free-form entries
    /// from `other`.
    ///
    /// This image's header is synthesized first, so its instance UIDs,
    /// slice positions and per-slice overlays are kept. Pixel-dependent
    /// elements are re-derived from this image's own buffer on next access.
    pub fn copy_info(&mut self, other: &Image) -> Result<(), ImageError> {
        let source = other.header()?;
        let freeform = other.freeform();
        self.with_overlay(|_| ())?;

        self.dimensions = other.dimensions.clone();
        self.value_name = other.value_name.clone();
        self.value_unit = other.value_unit.clone();
        self.slice_positions = other.slice_positions.clone();
        self.cache.get_mut().copy_base(&source, freeform);
        Ok(())
    }

    /// Overwrite window centre/width from the full data range.
    ///
    /// The result is stored as an explicit value.
    pub fn reset_window_level(&self) -> Result<(), ImageError> {
        let range = {
            let buffer = self.buffer()?;
            let buffer = buffer.read();
            percentile_range(buffer.data(), 0.0, 100.0)
        };
        let Some(range) = range else {
            return Ok(());
        };
        self.with_overlay(|overlay| {
            let record = overlay.base_mut();
            let slope = record.rescale_slope().unwrap_or(1.0);
            let intercept = record.rescale_intercept().unwrap_or(0.0);
            let (center, width) = window_from_range(range, slope, intercept);
            record.set(tags::WINDOW_CENTER, center)?;
            record.set(tags::WINDOW_WIDTH, width)
        })??;
        Ok(())
    }

    /// Effective header of slice `index` with that slice's pixel bytes
    /// stored as PixelData (OB for 8-bit data, OW otherwise).
    pub fn slice_dataset(&self, index: usize) -> Result<MetadataRecord, ImageError> {
        let mut record = self.slice_header(index)?;
        let bytes = {
            let buffer = self.buffer()?;
            let buffer = buffer.read();
            buffer.slice_data(index)?.to_bytes(ByteOrder::LittleEndian)
        };
        let vr = if record.bits_allocated() == Some(8) {
            Vr::OB
        } else {
            Vr::OW
        };
        record.set_with_vr(tags::PIXEL_DATA, vr, Value::Bytes(bytes))?;
        Ok(record)
    }

    fn first_text(&self, candidates: &[Tag]) -> Option<String> {
        let header = self.header().ok()?;
        candidates.iter().find_map(|&tag| header.non_empty_text(tag))
    }

    /// First non-empty of content, acquisition, series and study date.
    pub fn date(&self) -> Option<String> {
        self.first_text(&[
            tags::CONTENT_DATE,
            tags::ACQUISITION_DATE,
            tags::SERIES_DATE,
            tags::STUDY_DATE,
        ])
    }

    /// First non-empty of content, acquisition, series and study time.
    pub fn time(&self) -> Option<String> {
        self.first_text(&[
            tags::CONTENT_TIME,
            tags::ACQUISITION_TIME,
            tags::SERIES_TIME,
            tags::STUDY_TIME,
        ])
    }

    pub fn modality(&self) -> Option<String> {
        self.header().ok()?.modality()
    }

    pub fn rescale_slope(&self) -> Option<f64> {
        self.header().ok()?.rescale_slope()
    }

    pub fn rescale_intercept(&self) -> Option<f64> {
        self.header().ok()?.rescale_intercept()
    }

    pub fn study_id(&self) -> Option<String> {
        self.header().ok()?.non_empty_text(tags::STUDY_ID)
    }

    pub fn series_number(&self) -> Option<i64> {
        self.header().ok()?.i64(tags::SERIES_NUMBER)
    }

    pub fn patient_name(&self) -> Option<String> {
        self.header().ok()?.patient_name()
    }

    pub fn patient_id(&self) -> Option<String> {
        self.header().ok()?.patient_id()
    }

    pub fn patient_age(&self) -> Option<String> {
        self.header().ok()?.non_empty_text(tags::PATIENT_AGE)
    }

    /// Row and column direction cosines; identity when unknown.
    pub fn direction_cosines(&self) -> ([f64; 3], [f64; 3]) {
        let identity = ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let Some(cosines) = self
            .header()
            .ok()
            .and_then(|h| h.f64_vec(tags::IMAGE_ORIENTATION_PATIENT))
        else {
            return identity;
        };
        if cosines.len() < 6 {
            return identity;
        }
        (
            [cosines[0], cosines[1], cosines[2]],
            [cosines[3], cosines[4], cosines[5]],
        )
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("filename", &self.filename)
            .field("owns_buffer", &self.owns_buffer())
            .field("dimensions", &self.dimensions)
            .field("header_synthesized", &self.is_header_synthesized())
            .finish()
    }
}
