use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use sealstore_core::storage::ByteStore;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Single-file backend. Writes go through a temp file in the same directory
/// and are renamed over the target, so a reader never sees a partial write.
#[derive(Debug, Clone)]
pub struct FileByteStore {
    path: PathBuf,
}

impl FileByteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteStore for FileByteStore {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || read_file(&path))
            .await
            .map_err(io::Error::other)??;

        // A zero-length file counts as no store at all. Anything else is
        // handed to the engine, which refuses content it cannot open.
        Ok(bytes.filter(|b| !b.is_empty()))
    }

    #[instrument(skip_all, fields(path = %self.path.display(), len = bytes.len()))]
    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let path = self.path.clone();
        let bytes = bytes.to_vec();
        // Runs to completion on the blocking pool even if the caller is dropped.
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(io::Error::other)?
    }
}

fn read_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("no store file yet");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid storage path",
            ))
        }
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
