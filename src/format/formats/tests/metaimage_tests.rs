//! Tests for the MetaImage codec.

use std::fs;

use indexmap::IndexMap;

use super::ramp_volume;
use crate::format::formats::MetaImageFormat;
use crate::format::progress::Progress;
use crate::format::traits::{EncodeHeader, FormatReader, FormatWriter};
use crate::format::FormatError;
use crate::image::{PixelData, ScalarType};

#[test]
fn test_metaimage_local_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.mha");
    let buffer = ramp_volume();

    let mut keywords = IndexMap::new();
    keywords.insert("dicom_PatientID".to_string(), "P-42".to_string());
    keywords.insert("title".to_string(), "ramp".to_string());

    MetaImageFormat
        .write(&path, &buffer, &EncodeHeader::Keywords(keywords), &Progress::silent())
        .unwrap();
    let decoded = MetaImageFormat.read(&path, &Progress::silent()).unwrap();

    assert_eq!(decoded.buffer.dimensions(), [3, 2, 2]);
    assert_eq!(decoded.buffer.spacing(), [0.5, 0.75, 2.0]);
    assert_eq!(decoded.buffer.origin(), [1.0, -1.5, 10.0]);
    assert_eq!(decoded.buffer.data(), buffer.data());
    assert_eq!(decoded.header["dicom_PatientID"].as_text(), Some("P-42"));
    assert_eq!(decoded.header["title"].as_text(), Some("ramp"));
}

#[test]
fn test_metaimage_detached_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.mhd");
    let buffer = ramp_volume();

    MetaImageFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap();
    assert!(dir.path().join("volume.raw").is_file());

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.ends_with("ElementDataFile = volume.raw\n"));

    let decoded = MetaImageFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.data(), buffer.data());
    assert!(decoded.header.is_empty());
}

#[test]
fn test_metaimage_big_endian_hand_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("be.mha");
    let mut bytes = b"ObjectType = Image\nNDims = 2\nDimSize = 2 1\n\
        BinaryDataByteOrderMSB = True\nElementType = MET_USHORT\n\
        ElementDataFile = LOCAL\n"
        .to_vec();
    bytes.extend_from_slice(&[0x01, 0x02, 0x00, 0x10]);
    fs::write(&path, bytes).unwrap();

    let decoded = MetaImageFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.scalar_type(), ScalarType::U16);
    assert_eq!(decoded.buffer.dimensions(), [2, 1, 1]);
    assert_eq!(decoded.buffer.data(), &PixelData::U16(vec![0x0102, 0x0010]));
}

#[test]
fn test_metaimage_short_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.mha");
    fs::write(
        &path,
        b"ObjectType = Image\nDimSize = 4 4\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n\x01\x02",
    )
    .unwrap();

    let err = MetaImageFormat.read(&path, &Progress::silent()).unwrap_err();
    assert!(matches!(err, FormatError::Decode { .. }));
}

#[test]
fn test_metaimage_compressed_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zip.mha");
    fs::write(
        &path,
        b"ObjectType = Image\nDimSize = 1 1\nCompressedData = True\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n\x00",
    )
    .unwrap();

    let err = MetaImageFormat.read(&path, &Progress::silent()).unwrap_err();
    assert!(matches!(err, FormatError::Unsupported { .. }));
}

#[test]
fn test_metaimage_oversized_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.mha");
    fs::write(
        &path,
        b"ObjectType = Image\nDimSize = 4294967296 4294967296 4294967296\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n\x00",
    )
    .unwrap();

    let err = MetaImageFormat.read(&path, &Progress::silent()).unwrap_err();
    assert!(matches!(err, FormatError::InvalidHeader { .. }));
}
