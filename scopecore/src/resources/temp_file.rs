//! A scratch file that only exists while its scope is open.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::{AcquisitionError, ReleaseError};
use crate::resource::{Acquire, Release};

/// Where to create the scratch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempFileParams {
    /// Path of the file to create.
    pub path: PathBuf,
}

impl TempFileParams {
    /// Create a scratch file at `path`. An existing file is truncated.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// A scratch file open for writing. Release closes and deletes it.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    removed: bool,
}

impl TempFile {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is still open for writing.
    pub const fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn release_error(&self, reason: &str, source: io::Error) -> ReleaseError {
        ReleaseError::new(self.path.display().to_string(), reason).with_source(source)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer
            .as_mut()
            .map_or_else(|| Err(released()), |writer| writer.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer
            .as_mut()
            .map_or_else(|| Err(released()), BufWriter::flush)
    }
}

fn released() -> io::Error {
    io::Error::other("temporary file already released")
}

impl Acquire for TempFileParams {
    type Resource = TempFile;

    fn descriptor(&self) -> String {
        self.path.display().to_string()
    }

    fn acquire(&self) -> Result<TempFile, AcquisitionError> {
        let file = File::create(&self.path).map_err(|e| {
            AcquisitionError::new(self.descriptor(), "cannot create temporary file").with_source(e)
        })?;
        info!(path = %self.path.display(), "created");

        Ok(TempFile {
            path: self.path.clone(),
            writer: Some(BufWriter::new(file)),
            removed: false,
        })
    }
}

impl Release for TempFile {
    fn release(&mut self) -> Result<(), ReleaseError> {
        if self.removed {
            return Ok(());
        }

        // Close before removing; a flush failure must not keep the file
        // around, so removal still runs and the flush error is reported.
        let flushed = self.writer.take().map_or(Ok(()), |writer| {
            writer.into_inner().map(drop).map_err(io::IntoInnerError::into_error)
        });

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                if let Err(flush) = &flushed {
                    error!(path = %self.path.display(), error = %flush, "flush failed before removal");
                }
                return Err(self.release_error("cannot remove temporary file", e));
            }
        }
        self.removed = true;
        info!(path = %self.path.display(), "deleted");

        flushed.map_err(|e| self.release_error("flush failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::guard::Guard;
    use crate::scoped::with_scope_config;
    use thiserror::Error;
    use tracing_test::traced_test;

    #[derive(Debug, Error)]
    #[error("simulated error")]
    struct Simulated;

    fn untracked() -> ScopeConfig {
        ScopeConfig::default().with_leak_tracking(false)
    }

    #[test]
    fn exists_only_inside_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp.txt");

        with_scope_config(TempFileParams::new(&path), untracked(), |f| {
            assert!(f.is_open());
            f.write_all(b"Temporary data")?;
            f.flush()?;
            assert_eq!(std::fs::read_to_string(f.path())?, "Temporary data");
            Ok::<_, io::Error>(())
        })
        .unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn removed_after_body_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_exception.txt");

        let result = with_scope_config(TempFileParams::new(&path), untracked(), |f| {
            f.write_all(b"Data before exception").map_err(|_| Simulated)?;
            assert!(f.path().exists());
            Err::<(), _>(Simulated)
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn nested_files_are_removed_inner_first() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("temp1.txt");
        let inner = dir.path().join("temp2.txt");
        let config = ScopeConfig::default().with_leak_tracking(false);

        let mut first = Guard::acquire_with_config(&TempFileParams::new(&outer), &config).unwrap();
        first.write_all(b"File 1").unwrap();
        {
            let mut second =
                Guard::acquire_with_config(&TempFileParams::new(&inner), &config).unwrap();
            second.write_all(b"File 2").unwrap();
            assert!(inner.exists());
        }
        assert!(!inner.exists());
        assert!(outer.exists());

        first.close().unwrap();
        assert!(!outer.exists());
    }

    #[test]
    fn already_deleted_file_counts_as_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");

        let mut temp = TempFileParams::new(&path).acquire().unwrap();
        std::fs::remove_file(&path).unwrap();

        temp.release().unwrap();
        temp.release().unwrap();
        assert!(!temp.is_open());
        assert!(temp.write_all(b"late").is_err());
        assert!(temp.flush().is_err());
    }

    #[cfg(target_os = "linux")]
    #[traced_test]
    #[test]
    fn flush_failure_is_logged_when_removal_also_fails() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "x").unwrap();

        let mut writer = BufWriter::new(File::options().write(true).open(full).unwrap());
        writer.write_all(b"buffered").unwrap();
        // A directory cannot be unlinked as a file, so removal fails too.
        let mut temp = TempFile {
            path: dir.path().to_path_buf(),
            writer: Some(writer),
            removed: false,
        };

        let err = temp.release().unwrap_err();
        assert_eq!(err.reason, "cannot remove temporary file");
        assert!(logs_contain("flush failed before removal"));
        assert!(!temp.is_open());
    }

    #[test]
    fn unwritable_location_fails_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let err = TempFileParams::new(dir.path().join("no/such/dir/temp.txt"))
            .acquire()
            .unwrap_err();
        assert_eq!(err.reason, "cannot create temporary file");
    }
}
