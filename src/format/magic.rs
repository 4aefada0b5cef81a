//! Byte and text signature probes.
//!
//! A [`Magic`] entry is either a fixed byte pattern at a byte offset, or a
//! text pattern checked at the start of a given line for formats with a
//! textual header. A file matches a signature list only when every entry
//! matches.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::format::error::FormatError;

/// One signature entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Magic {
    /// Expected bytes.
    pub pattern: &'static [u8],
    /// Byte offset when `>= 0`. When negative, `-offset` lines are skipped
    /// and `pattern` is compared against the start of the following line.
    pub offset: i64,
}

impl Magic {
    /// Pattern expected at byte `offset` from the start of the file.
    pub const fn at(pattern: &'static [u8], offset: i64) -> Self {
        Self { pattern, offset }
    }

    /// Pattern expected at the very start of the file.
    pub const fn prefix(pattern: &'static [u8]) -> Self {
        Self { pattern, offset: 0 }
    }

    /// Pattern expected at the start of line `line` (zero-based).
    pub const fn line(pattern: &'static [u8], line: i64) -> Self {
        Self {
            pattern,
            offset: -line,
        }
    }
}

/// Check every entry of `magic` against the file at `path`.
///
/// Returns `Ok(false)` on a mismatch, including an empty pattern.
/// A byte-offset entry that runs past the end of the file is reported as
/// [`FormatError::TruncatedFile`] rather than a mismatch.
pub fn probe(path: &Path, magic: &[Magic]) -> Result<bool, FormatError> {
    if magic.is_empty() {
        return Ok(false);
    }

    for entry in magic {
        if entry.pattern.is_empty() {
            log::trace!("Empty magic pattern never matches ({})", path.display());
            return Ok(false);
        }

        let matched = if entry.offset >= 0 {
            probe_bytes(path, entry)?
        } else {
            probe_line(path, entry)?
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn probe_bytes(path: &Path, entry: &Magic) -> Result<bool, FormatError> {
    let offset = entry.offset.unsigned_abs() as usize;
    let requested = offset + entry.pattern.len();

    let mut buf = Vec::with_capacity(requested);
    File::open(path)?
        .take(requested as u64)
        .read_to_end(&mut buf)?;

    if buf.len() < requested {
        return Err(FormatError::TruncatedFile {
            path: path.to_path_buf(),
            requested,
            available: buf.len(),
        });
    }

    Ok(&buf[offset..requested] == entry.pattern)
}

fn probe_line(path: &Path, entry: &Magic) -> Result<bool, FormatError> {
    let wanted = entry.offset.unsigned_abs() as usize + 1;
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();

    for _ in 0..wanted {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            // Fewer lines than asked for
            return Ok(false);
        }
    }

    Ok(line.starts_with(entry.pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_prefix_match() {
        let file = fixture(b"ObjectType = Image\nNDims = 3\n");
        assert!(probe(file.path(), &[Magic::prefix(b"ObjectType =")]).unwrap());
        assert!(!probe(file.path(), &[Magic::prefix(b"# vtk")]).unwrap());
    }

    #[test]
    fn test_offset_match() {
        let file = fixture(b"\x00\x00\x00\x00DICM rest");
        assert!(probe(file.path(), &[Magic::at(b"DICM", 4)]).unwrap());
        assert!(!probe(file.path(), &[Magic::at(b"DICM", 0)]).unwrap());
    }

    #[test]
    fn test_all_entries_must_match() {
        let file = fixture(b"ncaa\nrank=3;\n");
        let both = [Magic::prefix(b"ncaa"), Magic::line(b"rank", 1)];
        assert!(probe(file.path(), &both).unwrap());

        let one_wrong = [Magic::prefix(b"ncaa"), Magic::line(b"type", 1)];
        assert!(!probe(file.path(), &one_wrong).unwrap());
    }

    #[test]
    fn test_empty_pattern_fails() {
        let file = fixture(b"anything");
        assert!(!probe(file.path(), &[Magic::prefix(b"")]).unwrap());
        assert!(!probe(file.path(), &[]).unwrap());
    }

    #[test]
    fn test_pattern_past_end_is_truncation() {
        let file = fixture(b"abc");
        let err = probe(file.path(), &[Magic::prefix(b"abcdef")]).unwrap_err();
        assert!(matches!(
            err,
            FormatError::TruncatedFile {
                requested: 6,
                available: 3,
                ..
            }
        ));

        // Even a pattern that could never match is reported as truncation
        let err = probe(file.path(), &[Magic::at(b"zz", 2)]).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_line_probe_short_file_is_mismatch() {
        let file = fixture(b"one line only\n");
        assert!(!probe(file.path(), &[Magic::line(b"two", 3)]).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe(&dir.path().join("absent.mha"), &[Magic::prefix(b"x")]).unwrap_err();
        assert!(matches!(err, FormatError::Io(_)));
    }
}
