//! Output directory management.
//!
//! A finished archive has this layout:
//!
//! ```text
//! <output_dir>/
//! ├─ LOCK      # Advisory lock held while building
//! ├─ meta.db   # Metadata index
//! ├─ dat.0     # Segment files
//! ├─ dat.1
//! └─ ...
//! ```

use crate::error::{CoreError, CoreResult};
use crate::segment::DirectorySegments;
use crate::types::SegmentId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names within the output directory.
const META_FILE: &str = "meta.db";
const LOCK_FILE: &str = "LOCK";

/// An output directory reserved for one build.
///
/// Holds an exclusive advisory lock on `LOCK` for as long as it lives, so
/// two builds cannot write into the same directory.
#[derive(Debug)]
pub struct OutputDir {
    path: PathBuf,
    _lock_file: File,
}

impl OutputDir {
    /// Creates `path` if needed and reserves it for a new build.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `path` exists and is not a directory (`InvalidOutputDir`)
    /// - it already holds `meta.db` or segment files (`OutputNotEmpty`)
    /// - another build holds the lock (`OutputLocked`)
    /// - I/O errors occur
    pub fn create(path: &Path) -> CoreResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(CoreError::invalid_output_dir(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::OutputLocked);
        }

        if holds_build(path)? {
            return Err(CoreError::OutputNotEmpty {
                path: path.display().to_string(),
            });
        }

        debug!(path = %path.display(), "reserved output directory");
        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the metadata index.
    #[must_use]
    pub fn meta_path(&self) -> PathBuf {
        meta_path(&self.path)
    }

    /// Returns a segment opener writing into this directory.
    #[must_use]
    pub fn segments(&self) -> DirectorySegments {
        DirectorySegments::new(&self.path)
    }
}

/// Returns the metadata index path inside an archive directory.
#[must_use]
pub fn meta_path(dir: &Path) -> PathBuf {
    dir.join(META_FILE)
}

/// Returns the path of segment `id` inside an archive directory.
#[must_use]
pub fn segment_path(dir: &Path, id: SegmentId) -> PathBuf {
    dir.join(id.file_name())
}

/// Returns true if `name` is a segment file name (`dat.<n>`).
#[must_use]
pub fn is_segment_file(name: &str) -> bool {
    name.strip_prefix("dat.")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn holds_build(path: &Path) -> CoreResult<bool> {
    for entry in fs::read_dir(path)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name == META_FILE || is_segment_file(&name) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let root = tempdir().unwrap();
        let path = root.path().join("nested").join("out");

        let dir = OutputDir::create(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.meta_path(), path.join("meta.db"));
        assert_eq!(dir.segments().dir(), path.as_path());
    }

    #[test]
    fn accepts_unrelated_files() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("README"), b"notes").unwrap();
        fs::write(root.path().join("dat.old"), b"x").unwrap();
        OutputDir::create(root.path()).unwrap();
    }

    #[test]
    fn rejects_previous_build() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("dat.0"), b"x").unwrap();
        assert!(matches!(
            OutputDir::create(root.path()),
            Err(CoreError::OutputNotEmpty { .. })
        ));

        let root = tempdir().unwrap();
        fs::write(root.path().join("meta.db"), b"").unwrap();
        assert!(matches!(
            OutputDir::create(root.path()),
            Err(CoreError::OutputNotEmpty { .. })
        ));
    }

    #[test]
    fn rejects_file_path() {
        let root = tempdir().unwrap();
        let file = root.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            OutputDir::create(&file),
            Err(CoreError::InvalidOutputDir { .. })
        ));
    }

    #[test]
    fn lock_is_exclusive() {
        let root = tempdir().unwrap();
        let first = OutputDir::create(root.path()).unwrap();
        assert!(matches!(
            OutputDir::create(root.path()),
            Err(CoreError::OutputLocked)
        ));
        drop(first);
        OutputDir::create(root.path()).unwrap();
    }

    #[test]
    fn segment_names() {
        assert!(is_segment_file("dat.0"));
        assert!(is_segment_file("dat.12"));
        assert!(!is_segment_file("dat."));
        assert!(!is_segment_file("dat.x"));
        assert!(!is_segment_file("data.1"));
        assert_eq!(
            segment_path(Path::new("/a"), SegmentId::new(3)),
            PathBuf::from("/a/dat.3")
        );
    }
}
