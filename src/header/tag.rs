//! Tags, value representations and element values.

use std::fmt;
use std::str::FromStr;

use crate::header::error::TagConversionError;

/// A `(group, element)` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const fn group(&self) -> u16 {
        self.0
    }

    pub const fn element(&self) -> u16 {
        self.1
    }

    /// Group length elements, `(gggg,0000)`.
    pub const fn is_group_length(&self) -> bool {
        self.1 == 0x0000
    }

    /// Look up a tag by its dictionary keyword.
    pub fn from_keyword(keyword: &str) -> Option<Tag> {
        DICTIONARY
            .iter()
            .find(|entry| entry.keyword == keyword)
            .map(|entry| entry.tag)
    }

    /// Dictionary keyword, if the tag is known.
    pub fn keyword(&self) -> Option<&'static str> {
        dictionary_entry(*self).map(|entry| entry.keyword)
    }

    /// Dictionary value representation, if the tag is known.
    pub fn default_vr(&self) -> Option<Vr> {
        dictionary_entry(*self).map(|entry| entry.vr)
    }

    /// Whether the value is derived from pixel statistics.
    pub fn is_derived_statistic(&self) -> bool {
        matches!(
            *self,
            tags::WINDOW_CENTER
                | tags::WINDOW_WIDTH
                | tags::SMALLEST_PIXEL_VALUE_IN_SERIES
                | tags::LARGEST_PIXEL_VALUE_IN_SERIES
        )
    }

    /// Whether the tag holds a pixel value range bound.
    pub fn is_range_tag(&self) -> bool {
        matches!(
            *self,
            tags::SMALLEST_PIXEL_VALUE_IN_SERIES | tags::LARGEST_PIXEL_VALUE_IN_SERIES
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Value representation codes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vr {
    AE,
    AS,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OW,
    PN,
    SH,
    SL,
    SS,
    ST,
    TM,
    UI,
    UL,
    UN,
    US,
}

impl Vr {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::FD => "FD",
            Vr::FL => "FL",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::OB => "OB",
            Vr::OW => "OW",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::SL => "SL",
            Vr::SS => "SS",
            Vr::ST => "ST",
            Vr::TM => "TM",
            Vr::UI => "UI",
            Vr::UL => "UL",
            Vr::UN => "UN",
            Vr::US => "US",
        }
    }

    /// Binary representations that cannot be rendered as text.
    pub const fn is_binary(&self) -> bool {
        matches!(self, Vr::OB | Vr::OW | Vr::UN)
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = TagConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vr = match s {
            "AE" => Vr::AE,
            "AS" => Vr::AS,
            "CS" => Vr::CS,
            "DA" => Vr::DA,
            "DS" => Vr::DS,
            "DT" => Vr::DT,
            "FD" => Vr::FD,
            "FL" => Vr::FL,
            "IS" => Vr::IS,
            "LO" => Vr::LO,
            "LT" => Vr::LT,
            "OB" => Vr::OB,
            "OW" => Vr::OW,
            "PN" => Vr::PN,
            "SH" => Vr::SH,
            "SL" => Vr::SL,
            "SS" => Vr::SS,
            "ST" => Vr::ST,
            "TM" => Vr::TM,
            "UI" => Vr::UI,
            "UL" => Vr::UL,
            "UN" => Vr::UN,
            "US" => Vr::US,
            other => return Err(TagConversionError::new(other, "unknown value representation")),
        };
        Ok(vr)
    }
}

/// Element value.
///
/// Multi-valued text uses the `\` separator, as in DICOM.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn int(v: i64) -> Self {
        Value::Ints(vec![v])
    }

    pub fn float(v: f64) -> Self {
        Value::Floats(vec![v])
    }

    /// Whether the value renders to an empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::Ints(v) => v.is_empty(),
            Value::Floats(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
        }
    }

    /// Text form of the value; binary values have none.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Ints(v) => Some(join(v.iter().map(|x| x.to_string()))),
            Value::Floats(v) => Some(join(v.iter().map(|x| x.to_string()))),
            Value::Bytes(_) => None,
        }
    }

    /// All numeric components, parsing text when needed.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::Text(s) => s
                .split('\\')
                .map(|part| part.trim().parse::<f64>().ok())
                .collect(),
            Value::Ints(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Value::Floats(v) => Some(v.clone()),
            Value::Bytes(_) => None,
        }
    }

    /// First numeric component.
    pub fn as_f64(&self) -> Option<f64> {
        self.to_f64_vec().and_then(|v| v.first().copied())
    }

    /// First component as an integer. Non-integral floats are rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Ints(v) => v.first().copied(),
            Value::Text(s) => {
                let first = s.split('\\').next()?.trim();
                first
                    .parse::<i64>()
                    .ok()
                    .or_else(|| first.parse::<f64>().ok().and_then(integral))
            }
            Value::Floats(v) => v.first().copied().and_then(integral),
            Value::Bytes(_) => None,
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.is_finite()).then_some(f as i64)
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join("\\")
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Floats(v)
    }
}

/// Well-known tags.
pub mod tags {
    use super::Tag;

    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    pub const SERIES_DATE: Tag = Tag(0x0008, 0x0021);
    pub const ACQUISITION_DATE: Tag = Tag(0x0008, 0x0022);
    pub const CONTENT_DATE: Tag = Tag(0x0008, 0x0023);
    pub const STUDY_TIME: Tag = Tag(0x0008, 0x0030);
    pub const SERIES_TIME: Tag = Tag(0x0008, 0x0031);
    pub const ACQUISITION_TIME: Tag = Tag(0x0008, 0x0032);
    pub const CONTENT_TIME: Tag = Tag(0x0008, 0x0033);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const MANUFACTURER: Tag = Tag(0x0008, 0x0070);
    pub const INSTITUTION_NAME: Tag = Tag(0x0008, 0x0080);
    pub const STATION_NAME: Tag = Tag(0x0008, 0x1010);
    pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
    pub const SERIES_DESCRIPTION: Tag = Tag(0x0008, 0x103E);
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
    pub const PATIENT_SEX: Tag = Tag(0x0010, 0x0040);
    pub const PATIENT_AGE: Tag = Tag(0x0010, 0x1010);
    pub const SLICE_THICKNESS: Tag = Tag(0x0018, 0x0050);
    pub const SPACING_BETWEEN_SLICES: Tag = Tag(0x0018, 0x0088);
    pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
    pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
    pub const STUDY_ID: Tag = Tag(0x0020, 0x0010);
    pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
    pub const INSTANCE_NUMBER: Tag = Tag(0x0020, 0x0013);
    pub const PATIENT_ORIENTATION: Tag = Tag(0x0020, 0x0020);
    pub const IMAGE_POSITION_PATIENT: Tag = Tag(0x0020, 0x0032);
    pub const IMAGE_ORIENTATION_PATIENT: Tag = Tag(0x0020, 0x0037);
    pub const FRAME_OF_REFERENCE_UID: Tag = Tag(0x0020, 0x0052);
    pub const SLICE_LOCATION: Tag = Tag(0x0020, 0x1041);
    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag(0x0028, 0x0004);
    pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const PIXEL_SPACING: Tag = Tag(0x0028, 0x0030);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag(0x0028, 0x0101);
    pub const HIGH_BIT: Tag = Tag(0x0028, 0x0102);
    pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
    pub const SMALLEST_PIXEL_VALUE_IN_SERIES: Tag = Tag(0x0028, 0x0108);
    pub const LARGEST_PIXEL_VALUE_IN_SERIES: Tag = Tag(0x0028, 0x0109);
    pub const WINDOW_CENTER: Tag = Tag(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag(0x0028, 0x1051);
    pub const RESCALE_INTERCEPT: Tag = Tag(0x0028, 0x1052);
    pub const RESCALE_SLOPE: Tag = Tag(0x0028, 0x1053);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
}

struct DictionaryEntry {
    tag: Tag,
    keyword: &'static str,
    vr: Vr,
}

const fn entry(tag: Tag, keyword: &'static str, vr: Vr) -> DictionaryEntry {
    DictionaryEntry { tag, keyword, vr }
}

const DICTIONARY: &[DictionaryEntry] = &[
    entry(tags::SOP_CLASS_UID, "SOPClassUID", Vr::UI),
    entry(tags::SOP_INSTANCE_UID, "SOPInstanceUID", Vr::UI),
    entry(tags::STUDY_DATE, "StudyDate", Vr::DA),
    entry(tags::SERIES_DATE, "SeriesDate", Vr::DA),
    entry(tags::ACQUISITION_DATE, "AcquisitionDate", Vr::DA),
    entry(tags::CONTENT_DATE, "ContentDate", Vr::DA),
    entry(tags::STUDY_TIME, "StudyTime", Vr::TM),
    entry(tags::SERIES_TIME, "SeriesTime", Vr::TM),
    entry(tags::ACQUISITION_TIME, "AcquisitionTime", Vr::TM),
    entry(tags::CONTENT_TIME, "ContentTime", Vr::TM),
    entry(tags::MODALITY, "Modality", Vr::CS),
    entry(tags::MANUFACTURER, "Manufacturer", Vr::LO),
    entry(tags::INSTITUTION_NAME, "InstitutionName", Vr::LO),
    entry(tags::STATION_NAME, "StationName", Vr::SH),
    entry(tags::STUDY_DESCRIPTION, "StudyDescription", Vr::LO),
    entry(tags::SERIES_DESCRIPTION, "SeriesDescription", Vr::LO),
    entry(tags::PATIENT_NAME, "PatientName", Vr::PN),
    entry(tags::PATIENT_ID, "PatientID", Vr::LO),
    entry(tags::PATIENT_BIRTH_DATE, "PatientBirthDate", Vr::DA),
    entry(tags::PATIENT_SEX, "PatientSex", Vr::CS),
    entry(tags::PATIENT_AGE, "PatientAge", Vr::AS),
    entry(tags::SLICE_THICKNESS, "SliceThickness", Vr::DS),
    entry(tags::SPACING_BETWEEN_SLICES, "SpacingBetweenSlices", Vr::DS),
    entry(tags::STUDY_INSTANCE_UID, "StudyInstanceUID", Vr::UI),
    entry(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID", Vr::UI),
    entry(tags::STUDY_ID, "StudyID", Vr::SH),
    entry(tags::SERIES_NUMBER, "SeriesNumber", Vr::IS),
    entry(tags::INSTANCE_NUMBER, "InstanceNumber", Vr::IS),
    entry(tags::PATIENT_ORIENTATION, "PatientOrientation", Vr::CS),
    entry(tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient", Vr::DS),
    entry(tags::IMAGE_ORIENTATION_PATIENT, "ImageOrientationPatient", Vr::DS),
    entry(tags::FRAME_OF_REFERENCE_UID, "FrameOfReferenceUID", Vr::UI),
    entry(tags::SLICE_LOCATION, "SliceLocation", Vr::DS),
    entry(tags::SAMPLES_PER_PIXEL, "SamplesPerPixel", Vr::US),
    entry(tags::PHOTOMETRIC_INTERPRETATION, "PhotometricInterpretation", Vr::CS),
    entry(tags::NUMBER_OF_FRAMES, "NumberOfFrames", Vr::IS),
    entry(tags::ROWS, "Rows", Vr::US),
    entry(tags::COLUMNS, "Columns", Vr::US),
    entry(tags::PIXEL_SPACING, "PixelSpacing", Vr::DS),
    entry(tags::BITS_ALLOCATED, "BitsAllocated", Vr::US),
    entry(tags::BITS_STORED, "BitsStored", Vr::US),
    entry(tags::HIGH_BIT, "HighBit", Vr::US),
    entry(tags::PIXEL_REPRESENTATION, "PixelRepresentation", Vr::US),
    entry(tags::SMALLEST_PIXEL_VALUE_IN_SERIES, "SmallestPixelValueInSeries", Vr::US),
    entry(tags::LARGEST_PIXEL_VALUE_IN_SERIES, "LargestPixelValueInSeries", Vr::US),
    entry(tags::WINDOW_CENTER, "WindowCenter", Vr::DS),
    entry(tags::WINDOW_WIDTH, "WindowWidth", Vr::DS),
    entry(tags::RESCALE_INTERCEPT, "RescaleIntercept", Vr::DS),
    entry(tags::RESCALE_SLOPE, "RescaleSlope", Vr::DS),
    entry(tags::PIXEL_DATA, "PixelData", Vr::OW),
];

fn dictionary_entry(tag: Tag) -> Option<&'static DictionaryEntry> {
    DICTIONARY.iter().find(|entry| entry.tag == tag)
}
