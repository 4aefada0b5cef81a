//! Default header synthesis for images without native metadata.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Datelike, Local, NaiveDate};

use crate::config::HeaderDefaultsConfig;
use crate::constants::{MAX_UID_LENGTH, SECONDARY_CAPTURE_SOP_CLASS};
use crate::header::error::TagConversionError;
use crate::header::keywords::{FreeformHeader, HeaderValue, fold_dicom_keyword, DICOM_PREFIX};
use crate::header::record::MetadataRecord;
use crate::header::tag::{Tag, Value, tags};
use crate::image::BufferDescriptor;

/// Output of a [`HeaderDefaults`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultedHeader {
    pub record: MetadataRecord,
    /// Free-form entries that did not map onto any element.
    pub leftovers: FreeformHeader,
}

/// Builds the initial record of an image.
///
/// Called once per image, on first header access.
pub trait HeaderDefaults: Send + Sync {
    fn defaults(
        &self,
        descriptor: &BufferDescriptor,
        filename: Option<&Path>,
        header: &FreeformHeader,
    ) -> DefaultedHeader;
}

static UID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Config-driven [`HeaderDefaults`].
#[derive(Debug, Clone, Default)]
pub struct StandardHeaderDefaults {
    config: HeaderDefaultsConfig,
}

impl StandardHeaderDefaults {
    pub fn new(config: HeaderDefaultsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeaderDefaultsConfig {
        &self.config
    }

    /// Fresh UID root unique within this process.
    fn uid_root(&self) -> String {
        let seq = UID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        // UID components carry no leading zeros
        let station = match self.config.station_id.trim_start_matches('0') {
            "" => "0",
            s => s,
        };
        let mut root = format!(
            "{}.{}.{}.{}",
            self.config.base_uid.trim_end_matches('.'),
            station,
            stamp,
            seq
        );
        // Leave room for the longest suffix
        root.truncate(MAX_UID_LENGTH - 4);
        root.trim_end_matches('.').to_string()
    }

    fn structural(&self, record: &mut MetadataRecord, descriptor: &BufferDescriptor) -> Result<(), TagConversionError> {
        let [sx, sy, sz] = descriptor.spacing;
        record.set(tags::SAMPLES_PER_PIXEL, descriptor.components as i64)?;
        record.set(
            tags::PHOTOMETRIC_INTERPRETATION,
            if descriptor.components >= 3 { "RGB" } else { "MONOCHROME2" },
        )?;
        record.set(tags::ROWS, descriptor.dimensions[1] as i64)?;
        record.set(tags::COLUMNS, descriptor.dimensions[0] as i64)?;
        // Row spacing comes first
        record.set(tags::PIXEL_SPACING, vec![sy, sx])?;
        record.set(tags::SLICE_THICKNESS, sz)?;
        record.set(tags::IMAGE_POSITION_PATIENT, descriptor.origin.to_vec())?;
        Ok(())
    }

    fn identity(&self, record: &mut MetadataRecord, filename: Option<&Path>) -> Result<(), TagConversionError> {
        let now = Local::now();
        let date = now.format("%Y%m%d").to_string();
        let time = now.format("%H%M%S").to_string();
        let root = self.uid_root();

        record.set(tags::SOP_CLASS_UID, SECONDARY_CAPTURE_SOP_CLASS)?;
        record.set(tags::SOP_INSTANCE_UID, format!("{}.4.1", root))?;
        record.set(tags::STUDY_DATE, date.clone())?;
        record.set(tags::SERIES_DATE, date.clone())?;
        record.set(tags::CONTENT_DATE, date)?;
        record.set(tags::STUDY_TIME, time.clone())?;
        record.set(tags::SERIES_TIME, time.clone())?;
        record.set(tags::CONTENT_TIME, time)?;
        record.set(tags::MODALITY, self.config.modality.clone())?;
        record.set(tags::MANUFACTURER, self.config.manufacturer.clone())?;
        record.set(tags::STATION_NAME, self.config.station_id.clone())?;
        record.set(tags::PATIENT_NAME, self.config.patient_name.clone())?;

        let stem = filename
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        record.set(tags::PATIENT_ID, stem)?;
        if let Some(name) = filename.and_then(|p| p.file_name()) {
            record.set(tags::SERIES_DESCRIPTION, name.to_string_lossy().into_owned())?;
        }

        record.set(tags::STUDY_INSTANCE_UID, format!("{}.1", root))?;
        record.set(tags::SERIES_INSTANCE_UID, format!("{}.2", root))?;
        record.set(tags::FRAME_OF_REFERENCE_UID, format!("{}.3", root))?;
        record.set(tags::STUDY_ID, "1")?;
        record.set(tags::SERIES_NUMBER, 1_i64)?;
        record.set(tags::INSTANCE_NUMBER, 1_i64)?;
        if !self.config.patient_orientation.is_empty() {
            record.set(tags::PATIENT_ORIENTATION, self.config.patient_orientation.clone())?;
        }
        Ok(())
    }
}

/// Parse `YYYYMMDD`, `YYYY-MM-DD` or `YYYY.MM.DD`.
pub fn parse_date(value: &str) -> Result<NaiveDate, TagConversionError> {
    let value = value.trim().trim_matches('\'');
    ["%Y%m%d", "%Y-%m-%d", "%Y.%m.%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| TagConversionError::new("date", format!("cannot parse '{}'", value)))
}

/// Age string (`nnnY`) of someone born on `birth` at `at`.
pub fn age_string(birth: NaiveDate, at: NaiveDate) -> Result<String, TagConversionError> {
    let mut years = at.year() - birth.year();
    if (at.month(), at.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    if !(0..=999).contains(&years) {
        return Err(TagConversionError::new(
            "PatientAge",
            format!("birth date {} is not before {}", birth, at),
        ));
    }
    Ok(format!("{:03}Y", years))
}

fn map_key(record: &mut MetadataRecord, tag: Tag, value: Value) -> Result<(), TagConversionError> {
    record.set(tag, value)
}

fn parse_number(key: &str, text: &str) -> Result<f64, TagConversionError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| TagConversionError::new(key, format!("'{}' is not a number", text)))
}

/// Apply one understood free-form key. Returns `Ok(false)` for keys this
/// collaborator does not handle.
fn apply_freeform(record: &mut MetadataRecord, key: &str, text: &str) -> Result<bool, TagConversionError> {
    match key {
        k if k.starts_with(DICOM_PREFIX) => fold_dicom_keyword(record, k, text)?,
        "title" => map_key(record, tags::SERIES_DESCRIPTION, Value::text(text))?,
        "subject" => map_key(record, tags::PATIENT_NAME, Value::text(text))?,
        "date" => {
            let date = parse_date(text)?;
            map_key(record, tags::STUDY_DATE, Value::text(date.format("%Y%m%d").to_string()))?
        }
        "patient_id" => map_key(record, tags::PATIENT_ID, Value::text(text))?,
        "modality" => map_key(record, tags::MODALITY, Value::text(text))?,
        "rescale_slope" => {
            map_key(record, tags::RESCALE_SLOPE, Value::float(parse_number(key, text)?))?
        }
        "rescale_intercept" => {
            map_key(record, tags::RESCALE_INTERCEPT, Value::float(parse_number(key, text)?))?
        }
        "patient_birth_date" => {
            let birth = parse_date(text)?;
            record.set(tags::PATIENT_BIRTH_DATE, birth.format("%Y%m%d").to_string())?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn derive_age(record: &mut MetadataRecord) -> Result<(), TagConversionError> {
    let (Some(birth), Some(study)) = (
        record.non_empty_text(tags::PATIENT_BIRTH_DATE),
        record.non_empty_text(tags::STUDY_DATE),
    ) else {
        return Ok(());
    };
    let age = age_string(parse_date(&birth)?, parse_date(&study)?)?;
    record.set(tags::PATIENT_AGE, age)
}

impl HeaderDefaults for StandardHeaderDefaults {
    fn defaults(
        &self,
        descriptor: &BufferDescriptor,
        filename: Option<&Path>,
        header: &FreeformHeader,
    ) -> DefaultedHeader {
        let mut record = MetadataRecord::new();

        if let Err(e) = self.identity(&mut record, filename) {
            log::warn!("Incomplete identity defaults: {}", e);
        }
        if let Err(e) = self.structural(&mut record, descriptor) {
            log::warn!("Incomplete structural defaults: {}", e);
        }

        let mut leftovers = FreeformHeader::new();
        for (key, value) in header {
            let HeaderValue::Text(text) = value else {
                leftovers.insert(key.clone(), value.clone());
                continue;
            };
            match apply_freeform(&mut record, key, text) {
                Ok(true) => {}
                Ok(false) => {
                    leftovers.insert(key.clone(), value.clone());
                }
                Err(e) => log::warn!("Skipping header entry {}: {}", key, e),
            }
        }

        if let Err(e) = derive_age(&mut record) {
            log::warn!("Omitting patient age: {}", e);
        }

        DefaultedHeader { record, leftovers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ScalarType;

    fn descriptor() -> BufferDescriptor {
        BufferDescriptor {
            dimensions: [64, 32, 4],
            scalar_type: ScalarType::I16,
            components: 1,
            spacing: [0.5, 0.25, 2.0],
            origin: [1.0, 2.0, 3.0],
        }
    }

    #[test]
    fn test_structural_defaults() {
        let defaults = StandardHeaderDefaults::default();
        let out = defaults.defaults(&descriptor(), None, &FreeformHeader::new());
        let record = out.record;

        assert_eq!(record.rows(), Some(32));
        assert_eq!(record.columns(), Some(64));
        assert_eq!(record.pixel_spacing(), Some(vec![0.25, 0.5]));
        assert_eq!(record.f64(tags::SLICE_THICKNESS), Some(2.0));
        assert_eq!(record.image_position(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(
            record.text(tags::PHOTOMETRIC_INTERPRETATION).as_deref(),
            Some("MONOCHROME2")
        );
        assert_eq!(record.modality().as_deref(), Some("OT"));
        assert_eq!(record.instance_number(), Some(1));
    }

    #[test]
    fn test_uids_are_rooted_and_numeric() {
        let defaults = StandardHeaderDefaults::default();
        let record = defaults
            .defaults(&descriptor(), None, &FreeformHeader::new())
            .record;

        let sop = record.sop_instance_uid().unwrap();
        assert!(sop.starts_with(crate::config::DEFAULT_BASE_UID));
        assert!(sop.len() <= MAX_UID_LENGTH);
        let last = sop.rsplit('.').next().unwrap();
        assert!(last.parse::<u64>().is_ok());

        let other = defaults
            .defaults(&descriptor(), None, &FreeformHeader::new())
            .record;
        assert_ne!(
            record.text(tags::STUDY_INSTANCE_UID),
            other.text(tags::STUDY_INSTANCE_UID)
        );
    }

    #[test]
    fn test_freeform_mapping() {
        let mut header = FreeformHeader::new();
        header.insert("title".into(), "Femur scan".into());
        header.insert("subject".into(), "RAT^01".into());
        header.insert("date".into(), "2020-03-15".into());
        header.insert("rescale_slope".into(), "0.5".into());
        header.insert("rescale_intercept".into(), "-1000".into());
        header.insert("dicom_Modality".into(), "CT".into());
        header.insert("voxel_comment".into(), "kept".into());

        let defaults = StandardHeaderDefaults::default();
        let out = defaults.defaults(&descriptor(), Some(Path::new("/tmp/femur.vff")), &header);

        let record = out.record;
        assert_eq!(
            record.text(tags::SERIES_DESCRIPTION).as_deref(),
            Some("Femur scan")
        );
        assert_eq!(record.patient_name().as_deref(), Some("RAT^01"));
        assert_eq!(record.text(tags::STUDY_DATE).as_deref(), Some("20200315"));
        assert_eq!(record.rescale_slope(), Some(0.5));
        assert_eq!(record.rescale_intercept(), Some(-1000.0));
        assert_eq!(record.modality().as_deref(), Some("CT"));
        assert_eq!(record.patient_id().as_deref(), Some("femur"));

        assert_eq!(out.leftovers.len(), 1);
        assert!(out.leftovers.contains_key("voxel_comment"));
    }

    #[test]
    fn test_patient_age_from_birth_date() {
        let mut header = FreeformHeader::new();
        header.insert("date".into(), "20200315".into());
        header.insert("patient_birth_date".into(), "19800316".into());

        let record = StandardHeaderDefaults::default()
            .defaults(&descriptor(), None, &header)
            .record;
        assert_eq!(record.text(tags::PATIENT_AGE).as_deref(), Some("039Y"));
    }

    #[test]
    fn test_bad_entries_are_omitted() {
        let mut header = FreeformHeader::new();
        header.insert("rescale_slope".into(), "steep".into());
        header.insert("patient_birth_date".into(), "not a date".into());
        header.insert("subject".into(), "KEPT^NAME".into());

        let out = StandardHeaderDefaults::default().defaults(&descriptor(), None, &header);
        assert!(!out.record.contains(tags::RESCALE_SLOPE));
        assert!(!out.record.contains(tags::PATIENT_AGE));
        assert_eq!(out.record.patient_name().as_deref(), Some("KEPT^NAME"));
        assert!(out.leftovers.is_empty());
    }

    #[test]
    fn test_age_string() {
        let birth = NaiveDate::from_ymd_opt(2000, 6, 1).unwrap();
        let at = NaiveDate::from_ymd_opt(2010, 6, 1).unwrap();
        assert_eq!(age_string(birth, at).unwrap(), "010Y");
        assert!(age_string(at, birth).is_err());
    }
}
