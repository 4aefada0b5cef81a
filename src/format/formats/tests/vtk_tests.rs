//! Tests for the legacy VTK codec.

use std::fs;

use super::ramp_volume;
use crate::format::formats::VtkLegacyFormat;
use crate::format::progress::Progress;
use crate::format::traits::{EncodeHeader, FileProbe, FormatReader, FormatWriter};
use crate::format::FormatError;
use crate::image::PixelData;

#[test]
fn test_vtk_binary_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.vtk");
    let buffer = ramp_volume();

    VtkLegacyFormat
        .write(&path, &buffer, &EncodeHeader::None, &Progress::silent())
        .unwrap();
    assert_eq!(VtkLegacyFormat.can_read_file(&path).unwrap(), 1);

    let decoded = VtkLegacyFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.dimensions(), [3, 2, 2]);
    assert_eq!(decoded.buffer.spacing(), [0.5, 0.75, 2.0]);
    assert_eq!(decoded.buffer.origin(), [1.0, -1.5, 10.0]);
    assert_eq!(decoded.buffer.data(), buffer.data());
}

#[test]
fn test_vtk_ascii_without_lookup_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ascii.vtk");
    fs::write(
        &path,
        "# vtk DataFile Version 3.0\nascii sample\nASCII\nDATASET STRUCTURED_POINTS\n\
         DIMENSIONS 2 2 1\nORIGIN 0 0 0\nSPACING 1 1 1\nPOINT_DATA 4\n\
         SCALARS v float\n0.5 1.5\n2.5 3.5\n",
    )
    .unwrap();

    let decoded = VtkLegacyFormat.read(&path, &Progress::silent()).unwrap();
    assert_eq!(decoded.buffer.data(), &PixelData::F32(vec![0.5, 1.5, 2.5, 3.5]));
}

#[test]
fn test_vtk_probe_rejects_other_datasets() {
    let dir = tempfile::tempdir().unwrap();

    let poly = dir.path().join("poly.vtk");
    fs::write(&poly, "# vtk DataFile Version 3.0\nmesh\nASCII\nDATASET POLYDATA\n").unwrap();
    assert_eq!(VtkLegacyFormat.can_read_file(&poly).unwrap(), 0);

    let other = dir.path().join("other.vtk");
    fs::write(&other, "ObjectType = Image\n").unwrap();
    assert_eq!(VtkLegacyFormat.can_read_file(&other).unwrap(), 0);

    let empty = dir.path().join("empty.vtk");
    fs::write(&empty, "").unwrap();
    assert_eq!(VtkLegacyFormat.can_read_file(&empty).unwrap(), 0);
}

#[test]
fn test_vtk_oversized_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.vtk");
    fs::write(
        &path,
        "# vtk DataFile Version 3.0\nhuge\nBINARY\nDATASET STRUCTURED_POINTS\n\
         DIMENSIONS 4294967296 4294967296 4294967296\nPOINT_DATA 1\n\
         SCALARS v short\n\x00\x00",
    )
    .unwrap();

    let err = VtkLegacyFormat.read(&path, &Progress::silent()).unwrap_err();
    assert!(matches!(err, FormatError::InvalidHeader { .. }));
}
