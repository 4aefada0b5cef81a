//! Dispatch tests for the reader and writer registries.
//!
//! Stub handlers with fixed descriptors stand in for real codecs so the
//! tests exercise only the selection logic.


use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::format::{
    Capabilities, DecodedImage, EncodeHeader, FileProbe, FormatDescriptor, FormatError,
    FormatReader, FormatWriter, Magic, Progress,
};
use crate::image::{PixelBuffer, ScalarType};

pub(super) const VTK_STUB: FormatDescriptor = FormatDescriptor {
    id: "vtk-stub",
    extensions: &[(".vtk", "VTK")],
    magic: &[Magic::prefix(b"# vtk")],
    capabilities: Capabilities::IMAGE_3D,
    uses_mm: true,
};

pub(super) const MHA_STUB: FormatDescriptor = FormatDescriptor {
    id: "mha-stub",
    extensions: &[(".mha", "MetaImage")],
    magic: &[Magic::prefix(b"ObjectType =")],
    capabilities: Capabilities::IMAGE_3D,
    uses_mm: true,
};

/// Handler with a fixed descriptor that decodes to a 1x1x1 image.
pub(super) struct Stub {
    descriptor: FormatDescriptor,
    /// When set, the handler probes itself and counts the calls.
    probe_calls: Option<Arc<AtomicUsize>>,
}

impl Stub {
    pub(super) fn new(descriptor: FormatDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            probe_calls: None,
        })
    }

    /// Stub whose custom probe always declines.
    pub(super) fn counting(descriptor: FormatDescriptor) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stub = Arc::new(Self {
            descriptor,
            probe_calls: Some(Arc::clone(&calls)),
        });
        (stub, calls)
    }
}

impl FileProbe for Stub {
    fn can_read_file(&self, _path: &Path) -> Result<u32, FormatError> {
        if let Some(calls) = &self.probe_calls {
            calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(0)
    }
}

impl FormatReader for Stub {
    fn descriptor(&self) -> FormatDescriptor {
        self.descriptor
    }

    fn probe(&self) -> Option<&dyn FileProbe> {
        self.probe_calls.as_ref().map(|_| self as &dyn FileProbe)
    }

    fn read(&self, _path: &Path, _progress: &Progress) -> Result<DecodedImage, FormatError> {
        Ok(DecodedImage::new(PixelBuffer::zeros([1, 1, 1], 1, ScalarType::U8)))
    }
}

impl FormatWriter for Stub {
    fn descriptor(&self) -> FormatDescriptor {
        self.descriptor
    }

    fn write(
        &self,
        _path: &Path,
        _buffer: &PixelBuffer,
        _header: &EncodeHeader,
        _progress: &Progress,
    ) -> Result<(), FormatError> {
        Ok(())
    }
}

/// Write `contents` to `name` inside `dir`.
pub(super) fn fixture(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
