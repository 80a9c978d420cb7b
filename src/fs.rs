use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Random-access file collaborator used by a [`Reader`](crate::Reader).
///
/// Handles are closed when dropped.
pub trait FileSystem {
    type Handle: Read + Seek;

    /// Open the file for reading. Sources that cannot be seeked must be
    /// rejected here.
    fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Size of the file, in bytes.
    fn size(&self, path: &Path) -> io::Result<u64>;
}

fn check_regular(path: &Path, metadata: &Metadata) -> io::Result<()> {
    if metadata.is_file() {
        return Ok(());
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} is not a regular file", path.display()),
    ))
}

/// Regular files from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    type Handle = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        let file = File::open(path)?;
        check_regular(path, &file.metadata()?)?;

        Ok(file)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        let metadata = std::fs::metadata(path)?;
        check_regular(path, &metadata)?;

        Ok(metadata.len())
    }
}

/// In-memory files, mostly useful for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: HashMap<PathBuf, Arc<[u8]>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> &mut Self {
        self.files.insert(path.into(), data.into());
        self
    }

    fn get(&self, path: &Path) -> io::Result<&Arc<[u8]>> {
        self.files.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }
}

impl FileSystem for MemoryFileSystem {
    type Handle = Cursor<Arc<[u8]>>;

    fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        Ok(Cursor::new(self.get(path)?.clone()))
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(self.get(path)?.len() as u64)
    }
}

impl<F: FileSystem> FileSystem for &F {
    type Handle = F::Handle;

    fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        (**self).open(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        (**self).size(path)
    }
}
