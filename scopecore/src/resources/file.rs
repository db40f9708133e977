//! Files opened for the duration of a scope.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::errors::{AcquisitionError, ReleaseError};
use crate::resource::{Acquire, AsyncAcquire, AsyncRelease, Release};

/// How a file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Read an existing file.
    #[default]
    Read,
    /// Create or truncate, then write.
    Write,
    /// Create if missing, then write at the end.
    Append,
}

impl OpenMode {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
        };
        options
    }

    const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}

/// Which file to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileParams {
    /// Path of the file.
    pub path: PathBuf,
    /// Open mode.
    #[serde(default)]
    pub mode: OpenMode,
}

impl FileParams {
    /// Open `path` with `mode`.
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Open `path` for reading.
    pub fn read(path: impl Into<PathBuf>) -> Self {
        Self::new(path, OpenMode::Read)
    }

    /// Open `path` for writing, truncating it.
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self::new(path, OpenMode::Write)
    }

    /// Open `path` for appending.
    pub fn append(path: impl Into<PathBuf>) -> Self {
        Self::new(path, OpenMode::Append)
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn open_error(&self, e: io::Error) -> AcquisitionError {
        let reason = match e.kind() {
            io::ErrorKind::NotFound => "file not found".to_string(),
            io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => format!("cannot open for {:?}", self.mode).to_lowercase(),
        };
        AcquisitionError::new(self.display(), reason).with_source(e)
    }
}

#[derive(Debug)]
enum Inner {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// An open file. Reads and writes go through an internal buffer that is
/// flushed on release.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    mode: OpenMode,
    inner: Option<Inner>,
}

impl FileHandle {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the file was opened with.
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the file is still open.
    pub const fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn closed(&self) -> io::Error {
        io::Error::other(format!("{} is closed", self.path.display()))
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Some(Inner::Reader(reader)) => reader.read(buf),
            Some(Inner::Writer(_)) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file not opened for reading",
            )),
            None => Err(self.closed()),
        }
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Some(Inner::Writer(writer)) => writer.write(buf),
            Some(Inner::Reader(_)) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file not opened for writing",
            )),
            None => Err(self.closed()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Some(Inner::Writer(writer)) => writer.flush(),
            Some(Inner::Reader(_)) => Ok(()),
            None => Err(self.closed()),
        }
    }
}

impl Acquire for FileParams {
    type Resource = FileHandle;

    fn descriptor(&self) -> String {
        self.display()
    }

    fn acquire(&self) -> Result<FileHandle, AcquisitionError> {
        let file = self
            .mode
            .options()
            .open(&self.path)
            .map_err(|e| self.open_error(e))?;
        let inner = if self.mode.writes() {
            Inner::Writer(BufWriter::new(file))
        } else {
            Inner::Reader(BufReader::new(file))
        };
        info!(path = %self.path.display(), mode = ?self.mode, "opened file");

        Ok(FileHandle {
            path: self.path.clone(),
            mode: self.mode,
            inner: Some(inner),
        })
    }
}

impl Release for FileHandle {
    fn release(&mut self) -> Result<(), ReleaseError> {
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        if let Inner::Writer(writer) = inner {
            // `into_inner` flushes; the file is closed when it drops.
            writer.into_inner().map_err(|e| {
                ReleaseError::new(self.path.display().to_string(), "flush failed")
                    .with_source(e.into_error())
            })?;
        }
        info!(path = %self.path.display(), "closed file");
        Ok(())
    }
}

/// An open file for async scopes.
#[derive(Debug)]
pub struct AsyncFileHandle {
    path: PathBuf,
    mode: OpenMode,
    file: Option<tokio::fs::File>,
}

impl AsyncFileHandle {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the file was opened with.
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether the file is still open.
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// The underlying file, for use with `tokio::io` extension traits.
    pub fn file_mut(&mut self) -> io::Result<&mut tokio::fs::File> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} is closed", path.display())))
    }
}

#[async_trait]
impl AsyncAcquire for FileParams {
    type Resource = AsyncFileHandle;

    fn descriptor(&self) -> String {
        self.display()
    }

    async fn acquire(&self) -> Result<AsyncFileHandle, AcquisitionError> {
        let file = tokio::fs::OpenOptions::from(self.mode.options())
            .open(&self.path)
            .await
            .map_err(|e| self.open_error(e))?;
        info!(path = %self.path.display(), mode = ?self.mode, "opened file");

        Ok(AsyncFileHandle {
            path: self.path.clone(),
            mode: self.mode,
            file: Some(file),
        })
    }
}

#[async_trait]
impl AsyncRelease for AsyncFileHandle {
    async fn release(&mut self) -> Result<(), ReleaseError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        if self.mode.writes() {
            file.flush().await.map_err(|e| {
                ReleaseError::new(self.path.display().to_string(), "flush failed").with_source(e)
            })?;
        }
        info!(path = %self.path.display(), "closed file");
        Ok(())
    }

    fn release_on_drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // A write still in flight cannot be awaited here.
        if file.try_into_std().is_err() {
            warn!(path = %self.path.display(), "closing file with an operation in flight");
        }
        info!(path = %self.path.display(), "closed file");
    }
}
