use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;

/// Sequential output file: WAL segments, tables, manifests.
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the OS.
    fn flush(&mut self) -> io::Result<()>;

    /// Flush and fsync to the device.
    fn sync(&mut self) -> io::Result<()>;
}

/// Positional reads over an immutable file (tables).
pub trait RandomAccessFile: Send + Sync {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    fn size(&self) -> u64;
}

/// Filesystem capability used by the engine.
///
/// Shared through `Arc<dyn Env>` by every [`crate::Options`] and open
/// database that references it.
pub trait Env: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    /// File names (not paths) directly inside `dir`.
    fn children(&self, dir: &Path) -> io::Result<Vec<String>>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create or truncate a file for writing.
    fn new_writable_file(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;

    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>>;

    fn read_to_vec(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Take the exclusive lock guarding a database directory. Fails with
    /// `WouldBlock` while another holder in this process has it.
    fn lock_file(&self, path: &Path) -> io::Result<FileLock>;
}

/// Paths currently locked by a live handle in this process.
static LOCKED_PATHS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive hold on a database's `LOCK` file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: Option<File>,
}

impl FileLock {
    /// Register `path` in the process-wide lock table.
    pub fn acquire(path: &Path, file: Option<File>) -> io::Result<Self> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut locked = LOCKED_PATHS.lock();
        if !locked.insert(key.clone()) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("lock {} already held by this process", path.display()),
            ));
        }
        Ok(FileLock { path: key, _file: file })
    }

}

impl Drop for FileLock {
    fn drop(&mut self) {
        LOCKED_PATHS.lock().remove(&self.path);
    }
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEnv;

impl Env for DefaultEnv {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn children(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn new_writable_file(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(StdWritableFile {
            writer: BufWriter::new(file),
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(StdRandomAccessFile {
            file: Mutex::new(file),
            size,
        }))
    }

    fn read_to_vec(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        FileLock::acquire(path, Some(file))
    }
}

/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_all()    → OS page cache → physical disk
struct StdWritableFile {
    writer: BufWriter<File>,
}

impl WritableFile for StdWritableFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

struct StdRandomAccessFile {
    file: Mutex<File>,
    size: u64,
}

impl RandomAccessFile for StdRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
