//! Per-slice exceptions layered over a shared base record.

use std::collections::BTreeMap;

use crate::header::error::TagConversionError;
use crate::header::record::MetadataRecord;
use crate::header::tag::{Tag, Value, Vr, tags};

/// A base record plus sparse per-slice records holding only divergent tags.
///
/// [`SliceHeaderOverlay::get`] always returns an owned record, so editing
/// the result leaves the base untouched until [`SliceHeaderOverlay::commit`]
/// is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceHeaderOverlay {
    base: MetadataRecord,
    slices: BTreeMap<usize, MetadataRecord>,
}

impl SliceHeaderOverlay {
    pub fn new(base: MetadataRecord) -> Self {
        Self {
            base,
            slices: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &MetadataRecord {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut MetadataRecord {
        &mut self.base
    }

    /// Effective record for slice `index`: the base with that slice's
    /// exceptions applied.
    pub fn get(&self, index: usize) -> MetadataRecord {
        let mut record = self.base.clone();
        if let Some(overlay) = self.slices.get(&index) {
            record.apply(overlay);
        }
        record
    }

    /// Only the exceptions recorded for slice `index`.
    pub fn overlay(&self, index: usize) -> Option<&MetadataRecord> {
        self.slices.get(&index)
    }

    /// Record a per-slice exception.
    pub fn set_slice_tag(
        &mut self,
        index: usize,
        tag: Tag,
        vr: Vr,
        value: impl Into<Value>,
    ) -> Result<(), TagConversionError> {
        let overlay = self.slices.entry(index).or_default();
        if tag.is_range_tag() {
            // Range tags inside an overlay validate against the base
            if let Some(pr) = self.base.get(tags::PIXEL_REPRESENTATION) {
                overlay.insert(tags::PIXEL_REPRESENTATION, pr.clone())?;
            }
        }
        overlay.set_with_vr(tag, vr, value)
    }

    /// Store the tags of `record` that differ from the base as slice
    /// `index`'s exceptions, replacing any previous ones.
    pub fn commit(&mut self, index: usize, record: &MetadataRecord) {
        let delta = record.diff(&self.base);
        if delta.is_empty() {
            self.slices.remove(&index);
        } else {
            self.slices.insert(index, delta);
        }
    }

    /// Number of slices carrying exceptions.
    pub fn overlay_count(&self) -> usize {
        self.slices.len()
    }

    /// Slice indices carrying exceptions, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slices.keys().copied()
    }

    /// Drop every per-slice exception.
    pub fn clear_slices(&mut self) {
        self.slices.clear();
    }

    /// Replace the base record and drop all exceptions.
    pub fn reset(&mut self, base: MetadataRecord) {
        self.base = base;
        self.slices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MetadataRecord {
        let mut record = MetadataRecord::new();
        record.set(tags::MODALITY, "CT").unwrap();
        record.set(tags::INSTANCE_NUMBER, 1_i64).unwrap();
        record.set(tags::SLICE_LOCATION, 0.0).unwrap();
        record
    }

    #[test]
    fn test_missing_slice_equals_base() {
        let overlay = SliceHeaderOverlay::new(base());
        assert_eq!(overlay.get(0), base());
        assert_eq!(overlay.get(99), base());
    }

    #[test]
    fn test_overlay_takes_precedence() {
        let mut overlay = SliceHeaderOverlay::new(base());
        overlay
            .set_slice_tag(2, tags::SLICE_LOCATION, Vr::DS, 5.0)
            .unwrap();

        let slice = overlay.get(2);
        assert_eq!(slice.f64(tags::SLICE_LOCATION), Some(5.0));
        assert_eq!(slice.modality().as_deref(), Some("CT"));
        assert_eq!(overlay.get(1), base());
        assert_eq!(overlay.overlay(2).unwrap().len(), 1);
    }

    #[test]
    fn test_edits_need_commit() {
        let mut overlay = SliceHeaderOverlay::new(base());

        let mut edited = overlay.get(0);
        edited.set(tags::MODALITY, "MR").unwrap();
        assert_eq!(overlay.get(0).modality().as_deref(), Some("CT"));
        assert_eq!(overlay.base(), &base());

        overlay.commit(0, &edited);
        assert_eq!(overlay.get(0).modality().as_deref(), Some("MR"));
        assert_eq!(overlay.get(1).modality().as_deref(), Some("CT"));
        assert_eq!(overlay.base(), &base());

        // Committing an unchanged record removes the exception
        overlay.commit(0, &base());
        assert_eq!(overlay.overlay_count(), 0);
    }

    #[test]
    fn test_reset_discards_slices() {
        let mut overlay = SliceHeaderOverlay::new(base());
        overlay
            .set_slice_tag(0, tags::INSTANCE_NUMBER, Vr::IS, 7_i64)
            .unwrap();
        overlay.reset(MetadataRecord::new());
        assert_eq!(overlay.overlay_count(), 0);
        assert!(overlay.base().is_empty());
    }
}
