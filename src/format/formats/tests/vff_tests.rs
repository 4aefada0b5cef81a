//! Tests for the VFF codec.

use std::fs;

use indexmap::IndexMap;

use super::ramp_volume;
use crate::format::formats::VffFormat;
use crate::format::progress::Progress;
use crate::format::traits::{EncodeHeader, FormatReader, FormatWriter};
use crate::format::FormatError;
use crate::image::{PixelBuffer, PixelData, ScalarType};

#[test]
fn test_vff_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.vff");
    let buffer = ramp_volume();

    let mut keywords = IndexMap::new();
    keywords.insert("title".to_string(), "Ramp phantom".to_string());
    keywords.insert("dicom_Modality".to_string(), "CT".to_string());

    VffFormat
        .write(&path, &buffer, &EncodeHeader::Keywords(keywords), &Progress::silent())
        .unwrap();
    assert!(fs::read(&path).unwrap().starts_with(b"ncaa\n"));

    let decoded = VffFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [3, 2, 2]);
    assert_eq!(decoded.buffer.scalar_type(), ScalarType::I16);
    assert_eq!(decoded.buffer.spacing(), [0.5, 0.75, 2.0]);
    assert_eq!(decoded.buffer.origin(), [1.0, -1.5, 10.0]);
    assert_eq!(decoded.buffer.data(), buffer.data());

    assert_eq!(decoded.header["title"].as_text(), Some("Ramp phantom"));
    assert_eq!(decoded.header["dicom_Modality"].as_text(), Some("CT"));
    assert!(!decoded.header.contains_key("bits"));
    assert!(!decoded.header.contains_key("rawsize"));
}

#[test]
fn test_vff_2d_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.vff");
    let buffer = PixelBuffer::new([2, 2, 1], 1, PixelData::U8(vec![1, 2, 3, 255])).unwrap();

    VffFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap();
    let decoded = VffFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [2, 2, 1]);
    assert_eq!(decoded.buffer.data(), &PixelData::U8(vec![1, 2, 3, 255]));
}

#[test]
fn test_vff_rejects_unsigned_16bit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("u16.vff");
    let buffer = PixelBuffer::zeros([2, 2, 1], 1, ScalarType::U16);

    let err = VffFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap_err();
    assert!(matches!(err, FormatError::Unsupported { .. }));
    assert!(!path.exists());
}

#[test]
fn test_vff_oversized_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.vff");
    fs::write(
        &path,
        b"ncaa\nrank=3;\nbits=16;\nsize=4294967296 4294967296 4294967296;\n\x0c\n\x00\x00",
    )
    .unwrap();

    let err = VffFormat.read(&path, &Progress::silent()).unwrap_err();
    assert!(matches!(err, FormatError::InvalidHeader { .. }));
}
