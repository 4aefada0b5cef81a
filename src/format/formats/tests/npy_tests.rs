//! Tests for the NumPy codec.

use indexmap::IndexMap;

use super::ramp_volume;
use crate::format::formats::NpyFormat;
use crate::format::progress::Progress;
use crate::format::sidecar;
use crate::format::traits::{EncodeHeader, FormatReader, FormatWriter};
use crate::image::{PixelBuffer, PixelData, ScalarType};

#[test]
fn test_npy_volume_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.npy");
    let buffer = ramp_volume();

    NpyFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap();
    assert!(!sidecar::sidecar_path(&path).exists());

    let decoded = NpyFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [3, 2, 2]);
    assert_eq!(decoded.buffer.scalar_type(), ScalarType::I16);
    assert_eq!(decoded.buffer.data(), buffer.data());
}

#[test]
fn test_npy_2d_float_with_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plane.npy");
    let buffer =
        PixelBuffer::new([2, 3, 1], 1, PixelData::F32(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5])).unwrap();

    let mut keywords = IndexMap::new();
    keywords.insert("dicom_PatientName".to_string(), "DOE^JANE".to_string());
    NpyFormat
        .write(&path, &buffer, &EncodeHeader::Keywords(keywords), &Progress::silent())
        .unwrap();

    let companion = sidecar::read_sidecar(&path).unwrap().unwrap();
    assert_eq!(companion["dicom_PatientName"].as_text(), Some("DOE^JANE"));

    let decoded = NpyFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [2, 3, 1]);
    assert_eq!(decoded.buffer.data(), buffer.data());
}

#[test]
fn test_npy_multichannel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.npy");
    let buffer = PixelBuffer::new([2, 1, 1], 3, PixelData::U8(vec![1, 2, 3, 4, 5, 6])).unwrap();

    NpyFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap();
    let decoded = NpyFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [2, 1, 1]);
    assert_eq!(decoded.buffer.components(), 3);
    assert_eq!(decoded.buffer.data(), buffer.data());
}
