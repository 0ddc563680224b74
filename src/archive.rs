use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::files::{self, FileAccessError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Access(#[from] FileAccessError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Build a ZIP archive of every plain file directly inside `dir`.
///
/// The archive is assembled fully in memory. Entries carry bare file
/// names with no directory prefix, matching what the listing endpoints
/// report. A directory with no files yields a valid empty archive; a
/// file that fails to read aborts the whole build.
pub fn build_zip(dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    let names = files::list_files(dir)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut buf = Vec::new();
    for name in &names {
        let mut file = File::open(dir.join(name))?;
        buf.clear();
        file.read_to_end(&mut buf)?;

        writer.start_file(name.as_str(), options)?;
        writer.write_all(&buf)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn test_build_zip_round_trip() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"alpha").unwrap();
        fs::write(tmp.path().join("b.bin"), [0u8, 1, 2, 3]).unwrap();

        let bytes = build_zip(tmp.path()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("a.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "alpha");

        let mut raw = Vec::new();
        archive
            .by_name("b.bin")
            .unwrap()
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, vec![0u8, 1, 2, 3]);
    }

    #[test]
    fn test_build_zip_empty_dir_is_valid() {
        let tmp = TempDir::new().unwrap();
        let bytes = build_zip(tmp.path()).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_build_zip_skips_subdirectories() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("kept.txt"), b"k").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("ignored.txt"), b"i").unwrap();

        let bytes = build_zip(tmp.path()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.by_name("kept.txt").is_ok());
    }

    #[test]
    fn test_build_zip_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = build_zip(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Access(FileAccessError::NotFound)
        ));
    }
}
