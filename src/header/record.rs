//! Ordered DICOM-style metadata record.

use indexmap::IndexMap;

use crate::header::error::TagConversionError;
use crate::header::tag::{Tag, Value, Vr, tags};

/// One stored element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub vr: Vr,
    pub value: Value,
    /// Computed from pixel statistics rather than set by a caller or source
    /// file. Derived elements may be recomputed; others are never touched.
    pub derived: bool,
}

/// Ordered tag to element table.
///
/// Range tags (smallest/largest pixel value) can only be stored once a
/// pixel representation is present, and are dropped along with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    elements: IndexMap<Tag, Element>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn value(&self, tag: Tag) -> Option<&Value> {
        self.elements.get(&tag).map(|e| &e.value)
    }

    /// Iterate elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Element)> {
        self.elements.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.elements.keys().copied()
    }

    pub fn is_derived(&self, tag: Tag) -> bool {
        self.elements.get(&tag).is_some_and(|e| e.derived)
    }

    /// Set an authoritative value using the dictionary VR.
    pub fn set(&mut self, tag: Tag, value: impl Into<Value>) -> Result<(), TagConversionError> {
        let vr = tag
            .default_vr()
            .ok_or_else(|| TagConversionError::new(tag.to_string(), "no dictionary VR, use set_with_vr"))?;
        self.set_with_vr(tag, vr, value)
    }

    /// Set an authoritative value with an explicit VR.
    pub fn set_with_vr(
        &mut self,
        tag: Tag,
        vr: Vr,
        value: impl Into<Value>,
    ) -> Result<(), TagConversionError> {
        self.insert(
            tag,
            Element {
                vr,
                value: value.into(),
                derived: false,
            },
        )
    }

    /// Set an authoritative value by dictionary keyword.
    pub fn set_keyword(
        &mut self,
        keyword: &str,
        value: impl Into<Value>,
    ) -> Result<(), TagConversionError> {
        let tag = Tag::from_keyword(keyword)
            .ok_or_else(|| TagConversionError::new(keyword, "unknown keyword"))?;
        self.set(tag, value)
    }

    /// Store a derived value unless an authoritative one is already present.
    ///
    /// Returns whether the value was written.
    pub fn set_derived(
        &mut self,
        tag: Tag,
        vr: Vr,
        value: impl Into<Value>,
    ) -> Result<bool, TagConversionError> {
        if self.elements.get(&tag).is_some_and(|e| !e.derived) {
            return Ok(false);
        }
        self.insert(
            tag,
            Element {
                vr,
                value: value.into(),
                derived: true,
            },
        )?;
        Ok(true)
    }

    /// Insert a prepared element, keeping its position if the tag exists.
    pub fn insert(&mut self, tag: Tag, element: Element) -> Result<(), TagConversionError> {
        if tag.is_range_tag() && !self.contains(tags::PIXEL_REPRESENTATION) {
            return Err(TagConversionError::new(
                tag.keyword().unwrap_or("range tag"),
                "pixel representation must be set first",
            ));
        }
        self.elements.insert(tag, element);
        Ok(())
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        let removed = self.elements.shift_remove(&tag);
        if tag == tags::PIXEL_REPRESENTATION {
            self.elements
                .shift_remove(&tags::SMALLEST_PIXEL_VALUE_IN_SERIES);
            self.elements
                .shift_remove(&tags::LARGEST_PIXEL_VALUE_IN_SERIES);
        }
        removed
    }

    /// Copy every element of `other` over this record.
    pub fn apply(&mut self, other: &MetadataRecord) {
        // Representation first so range tags are accepted
        if let Some(pr) = other.get(tags::PIXEL_REPRESENTATION) {
            self.elements.insert(tags::PIXEL_REPRESENTATION, pr.clone());
        }
        for (tag, element) in other.iter() {
            if let Err(e) = self.insert(*tag, element.clone()) {
                log::warn!("Skipping overlay element: {}", e);
            }
        }
    }

    /// Elements of `self` that are absent from or differ in `base`.
    pub fn diff(&self, base: &MetadataRecord) -> MetadataRecord {
        let elements = self
            .elements
            .iter()
            .filter(|(tag, element)| base.get(**tag) != Some(*element))
            .map(|(tag, element)| (*tag, element.clone()))
            .collect();
        MetadataRecord { elements }
    }

    /// Text form of a value.
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.value(tag).and_then(Value::to_text)
    }

    /// Text form, `None` when absent or blank.
    pub fn non_empty_text(&self, tag: Tag) -> Option<String> {
        self.text(tag)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn f64(&self, tag: Tag) -> Option<f64> {
        self.value(tag).and_then(Value::as_f64)
    }

    pub fn f64_vec(&self, tag: Tag) -> Option<Vec<f64>> {
        self.value(tag).and_then(Value::to_f64_vec)
    }

    pub fn i64(&self, tag: Tag) -> Option<i64> {
        self.value(tag).and_then(Value::as_i64)
    }

    pub fn rows(&self) -> Option<i64> {
        self.i64(tags::ROWS)
    }

    pub fn columns(&self) -> Option<i64> {
        self.i64(tags::COLUMNS)
    }

    pub fn bits_allocated(&self) -> Option<i64> {
        self.i64(tags::BITS_ALLOCATED)
    }

    pub fn pixel_representation(&self) -> Option<i64> {
        self.i64(tags::PIXEL_REPRESENTATION)
    }

    /// Row and column spacing.
    pub fn pixel_spacing(&self) -> Option<Vec<f64>> {
        self.f64_vec(tags::PIXEL_SPACING)
    }

    pub fn image_position(&self) -> Option<Vec<f64>> {
        self.f64_vec(tags::IMAGE_POSITION_PATIENT)
    }

    pub fn window_center(&self) -> Option<f64> {
        self.f64(tags::WINDOW_CENTER)
    }

    pub fn window_width(&self) -> Option<f64> {
        self.f64(tags::WINDOW_WIDTH)
    }

    pub fn rescale_slope(&self) -> Option<f64> {
        self.f64(tags::RESCALE_SLOPE)
    }

    pub fn rescale_intercept(&self) -> Option<f64> {
        self.f64(tags::RESCALE_INTERCEPT)
    }

    pub fn modality(&self) -> Option<String> {
        self.non_empty_text(tags::MODALITY)
    }

    pub fn patient_name(&self) -> Option<String> {
        self.non_empty_text(tags::PATIENT_NAME)
    }

    pub fn patient_id(&self) -> Option<String> {
        self.non_empty_text(tags::PATIENT_ID)
    }

    pub fn sop_instance_uid(&self) -> Option<String> {
        self.non_empty_text(tags::SOP_INSTANCE_UID)
    }

    pub fn instance_number(&self) -> Option<i64> {
        self.i64(tags::INSTANCE_NUMBER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read_back() {
        let mut record = MetadataRecord::new();
        record.set(tags::ROWS, 512_i64).unwrap();
        record.set_keyword("Modality", "CT").unwrap();
        record
            .set(tags::PIXEL_SPACING, vec![0.5, 0.25])
            .unwrap();

        assert_eq!(record.rows(), Some(512));
        assert_eq!(record.modality().as_deref(), Some("CT"));
        assert_eq!(record.pixel_spacing(), Some(vec![0.5, 0.25]));
        assert_eq!(record.get(tags::ROWS).unwrap().vr, Vr::US);
        assert!(record.set_keyword("Bogus", "x").is_err());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut record = MetadataRecord::new();
        record.set(tags::MODALITY, "MR").unwrap();
        record.set(tags::ROWS, 2_i64).unwrap();
        record.set(tags::MODALITY, "CT").unwrap();

        let order: Vec<Tag> = record.tags().collect();
        assert_eq!(order, vec![tags::MODALITY, tags::ROWS]);
    }

    #[test]
    fn test_range_tags_need_representation() {
        let mut record = MetadataRecord::new();
        let err = record
            .set_derived(tags::SMALLEST_PIXEL_VALUE_IN_SERIES, Vr::US, 0_i64)
            .unwrap_err();
        assert_eq!(err.tag, "SmallestPixelValueInSeries");
        assert!(!record.contains(tags::SMALLEST_PIXEL_VALUE_IN_SERIES));

        record.set(tags::PIXEL_REPRESENTATION, 0_i64).unwrap();
        record
            .set_derived(tags::SMALLEST_PIXEL_VALUE_IN_SERIES, Vr::US, 0_i64)
            .unwrap();
        record
            .set_derived(tags::LARGEST_PIXEL_VALUE_IN_SERIES, Vr::US, 9_i64)
            .unwrap();

        record.remove(tags::PIXEL_REPRESENTATION);
        assert!(!record.contains(tags::SMALLEST_PIXEL_VALUE_IN_SERIES));
        assert!(!record.contains(tags::LARGEST_PIXEL_VALUE_IN_SERIES));
    }

    #[test]
    fn test_derived_never_overwrites_explicit() {
        let mut record = MetadataRecord::new();
        record.set(tags::WINDOW_CENTER, 40.0).unwrap();

        let written = record
            .set_derived(tags::WINDOW_CENTER, Vr::DS, 100.0)
            .unwrap();
        assert!(!written);
        assert_eq!(record.window_center(), Some(40.0));
        assert!(!record.is_derived(tags::WINDOW_CENTER));

        assert!(record.set_derived(tags::WINDOW_WIDTH, Vr::DS, 10.0).unwrap());
        assert!(record.set_derived(tags::WINDOW_WIDTH, Vr::DS, 20.0).unwrap());
        assert_eq!(record.window_width(), Some(20.0));
        assert!(record.is_derived(tags::WINDOW_WIDTH));
    }

    #[test]
    fn test_diff_and_apply() {
        let mut base = MetadataRecord::new();
        base.set(tags::MODALITY, "CT").unwrap();
        base.set(tags::SLICE_LOCATION, 1.0).unwrap();

        let mut edited = base.clone();
        edited.set(tags::SLICE_LOCATION, 2.0).unwrap();
        edited.set(tags::INSTANCE_NUMBER, 3_i64).unwrap();

        let delta = edited.diff(&base);
        assert_eq!(delta.len(), 2);
        assert!(!delta.contains(tags::MODALITY));

        let mut rebuilt = base.clone();
        rebuilt.apply(&delta);
        assert_eq!(rebuilt, edited);
    }
}
