//! Free-form keyword headers and their mapping to and from records.
//!
//! Keys prefixed `dicom_` carry record elements by keyword
//! (`dicom_PatientName = DOE^JOHN`). Everything else is an opaque
//! format-specific entry.

use indexmap::IndexMap;

use crate::header::error::TagConversionError;
use crate::header::record::MetadataRecord;
use crate::header::tag::{Tag, Value, Vr, tags};

/// Prefix marking a keyword that maps onto a record element.
pub const DICOM_PREFIX: &str = "dicom_";

/// Value of a free-form header entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    List(Vec<String>),
}

impl HeaderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            HeaderValue::List(_) => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Text(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Text(s)
    }
}

/// Ordered free-form header, as produced by codecs.
pub type FreeformHeader = IndexMap<String, HeaderValue>;

/// VRs that survive the trip through a keyword header.
const KEYWORD_VRS: &[Vr] = &[
    Vr::DA,
    Vr::TM,
    Vr::UI,
    Vr::SH,
    Vr::CS,
    Vr::LO,
    Vr::PN,
    Vr::UL,
    Vr::DS,
    Vr::IS,
    Vr::FD,
];

/// Elements keyword writers encode natively.
const NATIVE_TAGS: &[Tag] = &[
    tags::SOP_CLASS_UID,
    tags::ROWS,
    tags::COLUMNS,
    tags::BITS_ALLOCATED,
    tags::BITS_STORED,
    tags::PIXEL_SPACING,
];

/// Strip one pair of surrounding single quotes.
pub fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed)
}

/// Store one `dicom_<Keyword>` entry in `record`.
pub fn fold_dicom_keyword(
    record: &mut MetadataRecord,
    key: &str,
    value: &str,
) -> Result<(), TagConversionError> {
    let keyword = key.strip_prefix(DICOM_PREFIX).unwrap_or(key);
    let tag = Tag::from_keyword(keyword)
        .ok_or_else(|| TagConversionError::new(keyword, "unknown keyword"))?;
    record.set(tag, Value::text(unquote(value)))
}

/// Move every `dicom_` entry of `header` into `record`.
///
/// Returns the remaining entries in their original order. Entries that fail
/// to convert are logged and dropped.
pub fn fold_dicom_keywords(header: &FreeformHeader, record: &mut MetadataRecord) -> FreeformHeader {
    let mut leftovers = FreeformHeader::new();
    for (key, value) in header {
        if !key.starts_with(DICOM_PREFIX) {
            leftovers.insert(key.clone(), value.clone());
            continue;
        }
        let Some(text) = value.as_text() else {
            log::warn!("Ignoring list value for {}", key);
            continue;
        };
        if let Err(e) = fold_dicom_keyword(record, key, text) {
            log::warn!("Skipping header keyword {}: {}", key, e);
        }
    }
    leftovers
}

fn element_to_keyword(tag: Tag, vr: Vr, value: &Value) -> Result<Option<(String, String)>, TagConversionError> {
    if tag.is_group_length() || NATIVE_TAGS.contains(&tag) || !KEYWORD_VRS.contains(&vr) {
        return Ok(None);
    }
    let keyword = tag
        .keyword()
        .ok_or_else(|| TagConversionError::new(tag.to_string(), "no keyword"))?;
    let text = value
        .to_text()
        .ok_or_else(|| TagConversionError::new(keyword, "value has no text form"))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let text = if matches!(vr, Vr::DA | Vr::TM) {
        format!("'{}'", text)
    } else {
        text
    };
    Ok(Some((format!("{}{}", DICOM_PREFIX, keyword), text)))
}

/// Flatten a record and free-form entries into keyword/value pairs for
/// writers that take a keyword header.
pub fn record_to_keywords(
    record: &MetadataRecord,
    freeform: &FreeformHeader,
) -> IndexMap<String, String> {
    let mut keywords = IndexMap::new();

    for (tag, element) in record.iter() {
        match element_to_keyword(*tag, element.vr, &element.value) {
            Ok(Some((key, value))) => {
                keywords.insert(key, value);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Not migrating {}: {}", tag, e),
        }
    }

    for (key, value) in freeform {
        match value {
            HeaderValue::Text(text) => {
                keywords.insert(key.clone(), text.clone());
            }
            HeaderValue::List(_) => log::debug!("Not migrating list entry {}", key),
        }
    }

    keywords
}
