//! `key = value` text headers, inline or in a companion file.
//!
//! One pair per line. Blank lines and lines starting with `#` are ignored.
//! Keys keep their case; values are trimmed but otherwise verbatim.

use std::fs;
use std::path::{Path, PathBuf};

use crate::format::error::FormatError;
use crate::header::{FreeformHeader, HeaderValue};

/// Suffix appended to an image path to locate its companion header.
pub const SIDECAR_SUFFIX: &str = ".header";

/// Split one line into a trimmed key and value.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

/// Parse every pair in `text`. Later duplicates replace earlier ones but
/// keep the first position.
pub fn parse(text: &str) -> FreeformHeader {
    let mut header = FreeformHeader::new();
    for (key, value) in text.lines().filter_map(parse_line) {
        header.insert(key.to_string(), HeaderValue::from(value));
    }
    header
}

/// Render pairs, one per line.
pub fn render<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Companion header path for `image_path`.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Read the companion header of `image_path`, if there is one.
pub fn read_sidecar(image_path: &Path) -> Result<Option<FreeformHeader>, FormatError> {
    let path = sidecar_path(image_path);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    log::debug!("Read companion header {:?}", path);
    Ok(Some(parse(&text)))
}

/// Write the companion header of `image_path`. Nothing is written for an
/// empty pair list.
pub fn write_sidecar<'a>(
    image_path: &Path,
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Option<PathBuf>, FormatError> {
    let text = render(pairs);
    if text.is_empty() {
        return Ok(None);
    }
    let path = sidecar_path(image_path);
    fs::write(&path, text)?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("a = b"), Some(("a", "b")));
        assert_eq!(parse_line("  key=value with = sign "), Some(("key", "value with = sign")));
        assert_eq!(parse_line("# comment = no"), None);
        assert_eq!(parse_line("= orphan"), None);
        assert_eq!(parse_line("no separator"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_parse_keeps_order() {
        let header = parse("title = scan\n\ndicom_Modality = CT\nsubject = X\n");
        let keys: Vec<_> = header.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "dicom_Modality", "subject"]);
        assert_eq!(header["dicom_Modality"].as_text(), Some("CT"));
    }

    #[test]
    fn test_sidecar_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("slice.npy");

        assert!(read_sidecar(&image).unwrap().is_none());
        assert!(write_sidecar(&image, []).unwrap().is_none());

        let written = write_sidecar(&image, [("dicom_PatientID", "P1"), ("note", "x")])
            .unwrap()
            .unwrap();
        assert_eq!(written, dir.path().join("slice.npy.header"));

        let header = read_sidecar(&image).unwrap().unwrap();
        assert_eq!(header.len(), 2);
        assert_eq!(header["note"].as_text(), Some("x"));
    }
}
