use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::access::Purpose;

/// Errors raised while resolving report paths under the data root.
#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("path escapes the data root")]
    PathEscape,

    #[error("file not found")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Resolves robot folders and report files beneath a single data root.
///
/// Every resolution is validated twice: requested names are rejected
/// lexically before any filesystem access, then resolved paths are
/// canonicalized and checked for ancestry under the root. A name that
/// would escape the root fails the same way whether or not its target
/// exists.
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Uninspected join of root, robot folder and purpose subdirectory.
    ///
    /// Only for folder names that come from the directory store, where
    /// listing endpoints treat a missing directory as an empty listing
    /// rather than an error.
    pub fn purpose_dir(&self, robot_folder: &str, purpose: Purpose) -> PathBuf {
        self.root.join(robot_folder).join(purpose.subdir())
    }

    /// Resolve the purpose directory for a robot, verifying it exists
    /// and sits under the data root.
    pub fn resolve_dir(
        &self,
        robot_folder: &str,
        purpose: Purpose,
    ) -> Result<PathBuf, FileAccessError> {
        validate_component(robot_folder)?;

        let root = canonicalize_existing(&self.root)?;
        let dir = canonicalize_existing(&self.purpose_dir(robot_folder, purpose))?;
        if !dir.starts_with(&root) {
            return Err(FileAccessError::PathEscape);
        }
        if !dir.is_dir() {
            return Err(FileAccessError::NotADirectory);
        }
        Ok(dir)
    }

    /// Resolve a single report file inside a robot's purpose directory.
    ///
    /// The filename is validated lexically first, so traversal attempts
    /// are rejected before the filesystem is consulted at all.
    pub fn resolve_file(
        &self,
        robot_folder: &str,
        purpose: Purpose,
        filename: &str,
    ) -> Result<PathBuf, FileAccessError> {
        validate_component(filename)?;

        let dir = self.resolve_dir(robot_folder, purpose)?;
        let file = canonicalize_existing(&dir.join(filename))?;
        if !file.starts_with(&dir) {
            return Err(FileAccessError::PathEscape);
        }
        if !file.is_file() {
            return Err(FileAccessError::NotFound);
        }
        Ok(file)
    }
}

/// Reject names that are empty, relative markers, or contain separators.
fn validate_component(component: &str) -> Result<(), FileAccessError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
        || component.contains('\0')
    {
        return Err(FileAccessError::PathEscape);
    }
    Ok(())
}

fn canonicalize_existing(path: &Path) -> Result<PathBuf, FileAccessError> {
    path.canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => FileAccessError::NotFound,
        io::ErrorKind::NotADirectory => FileAccessError::NotADirectory,
        _ => FileAccessError::Io(e),
    })
}

/// List the plain files directly inside `dir`, sorted by name.
///
/// Subdirectories are skipped; symlinks count when they point at a
/// regular file. Entries whose metadata cannot be read are skipped
/// rather than failing the whole listing.
pub fn list_files(dir: &Path) -> Result<Vec<String>, FileAccessError> {
    let meta = fs::metadata(dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => FileAccessError::NotFound,
        io::ErrorKind::NotADirectory => FileAccessError::NotADirectory,
        _ => FileAccessError::Io(e),
    })?;
    if !meta.is_dir() {
        return Err(FileAccessError::NotADirectory);
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Follows symlinks, so a link to a file lists as a file
        let meta = match fs::metadata(entry.path()) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        if meta.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, FileResolver) {
        let tmp = TempDir::new().unwrap();
        let reports = tmp.path().join("robot-1").join(Purpose::Reports.subdir());
        fs::create_dir_all(&reports).unwrap();
        fs::write(reports.join("run_01.csv"), b"a,b,c").unwrap();
        fs::write(reports.join("run_02.csv"), b"d,e,f").unwrap();
        let resolver = FileResolver::new(tmp.path());
        (tmp, resolver)
    }

    #[test]
    fn test_resolve_file_happy_path() {
        let (_tmp, resolver) = fixture();
        let path = resolver
            .resolve_file("robot-1", Purpose::Reports, "run_01.csv")
            .unwrap();
        assert!(path.is_file());
        assert!(path.ends_with("run_01.csv"));
    }

    #[test]
    fn test_resolve_file_missing_is_not_found() {
        let (_tmp, resolver) = fixture();
        let err = resolver
            .resolve_file("robot-1", Purpose::Reports, "nope.csv")
            .unwrap_err();
        assert!(matches!(err, FileAccessError::NotFound));
    }

    #[test]
    fn test_resolve_dir_missing_robot() {
        let (_tmp, resolver) = fixture();
        let err = resolver
            .resolve_dir("robot-9", Purpose::Reports)
            .unwrap_err();
        assert!(matches!(err, FileAccessError::NotFound));
    }

    #[test]
    fn test_traversal_rejected_even_when_target_exists() {
        let (tmp, resolver) = fixture();
        // A real file outside the purpose directory
        fs::write(tmp.path().join("secret.txt"), b"s").unwrap();

        let err = resolver
            .resolve_file("robot-1", Purpose::Reports, "../../secret.txt")
            .unwrap_err();
        assert!(matches!(err, FileAccessError::PathEscape));

        // Same failure when the target does not exist
        let err = resolver
            .resolve_file("robot-1", Purpose::Reports, "../../missing.txt")
            .unwrap_err();
        assert!(matches!(err, FileAccessError::PathEscape));
    }

    #[test]
    fn test_component_validation() {
        assert!(validate_component("run_01.csv").is_ok());
        assert!(validate_component("archive..2024.csv").is_ok());
        assert!(validate_component("").is_err());
        assert!(validate_component(".").is_err());
        assert!(validate_component("..").is_err());
        assert!(validate_component("a/b").is_err());
        assert!(validate_component("a\\b").is_err());
    }

    #[test]
    fn test_traversal_in_robot_folder_rejected() {
        let (_tmp, resolver) = fixture();
        let err = resolver
            .resolve_dir("../robot-1", Purpose::Reports)
            .unwrap_err();
        assert!(matches!(err, FileAccessError::PathEscape));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_rejected() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("leak.txt"), b"x").unwrap();

        let (tmp, resolver) = fixture();
        let reports = tmp.path().join("robot-1").join(Purpose::Reports.subdir());
        symlink(outside.path().join("leak.txt"), reports.join("leak.txt")).unwrap();

        let err = resolver
            .resolve_file("robot-1", Purpose::Reports, "leak.txt")
            .unwrap_err();
        assert!(matches!(err, FileAccessError::PathEscape));
    }

    #[test]
    fn test_list_files_skips_directories() {
        let (tmp, _resolver) = fixture();
        let reports = tmp.path().join("robot-1").join(Purpose::Reports.subdir());
        fs::create_dir(reports.join("nested")).unwrap();

        let names = list_files(&reports).unwrap();
        assert_eq!(names, vec!["run_01.csv", "run_02.csv"]);
    }

    #[test]
    fn test_list_files_reflects_state_at_call_time() {
        let (tmp, _resolver) = fixture();
        let reports = tmp.path().join("robot-1").join(Purpose::Reports.subdir());

        fs::write(reports.join("run_03.csv"), b"g").unwrap();
        assert_eq!(list_files(&reports).unwrap().len(), 3);

        fs::remove_file(reports.join("run_03.csv")).unwrap();
        assert_eq!(list_files(&reports).unwrap().len(), 2);
    }

    #[test]
    fn test_list_files_missing_dir() {
        let (tmp, _resolver) = fixture();
        let err = list_files(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, FileAccessError::NotFound));
    }

    #[test]
    fn test_list_files_on_plain_file() {
        let (tmp, _resolver) = fixture();
        let file = tmp.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();
        let err = list_files(&file).unwrap_err();
        assert!(matches!(err, FileAccessError::NotADirectory));
    }
}
