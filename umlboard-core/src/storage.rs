use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::WorkspaceSnapshot;

/// How long to wait for another process to release the lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Saves and loads a workspace snapshot as a single YAML file, guarding
/// access with an advisory lock file so two processes never interleave
/// writes
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("yaml.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    /// Returns the path to the storage file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock on the file for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        Self::wait_for(&lock_file, <File as FileExt>::try_lock_exclusive, &self.file_path)?;
        Ok(lock_file)
    }

    /// Acquire a shared lock on the file for reading
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        Self::wait_for(&lock_file, <File as FileExt>::try_lock_shared, &self.file_path)?;
        Ok(Some(lock_file))
    }

    fn wait_for(
        lock_file: &File,
        try_lock: fn(&File) -> std::io::Result<()>,
        guarded: &Path,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            match try_lock(lock_file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another process may be editing: {:?}",
                            guarded
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to acquire lock on {:?}", guarded))
                }
            }
        }
    }

    fn read_snapshot(&self) -> Result<WorkspaceSnapshot> {
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))
    }

    fn write_snapshot(&self, lock_file: &mut File, snapshot: &WorkspaceSnapshot) -> Result<()> {
        // Lock holder info, for debugging stale locks
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        let yaml = serde_yaml::to_string(snapshot)?;
        fs::write(&self.file_path, yaml)
            .with_context(|| format!("Failed to write {:?}", self.file_path))?;
        Ok(())
    }

    /// Loads the workspace, creating an empty file on first use
    pub fn load(&self) -> Result<WorkspaceSnapshot> {
        if !self.file_path.exists() {
            let empty = WorkspaceSnapshot::new();
            self.save(&empty)?;
            return Ok(empty);
        }

        let _lock = self.acquire_read_lock()?;
        self.read_snapshot()
    }

    /// Saves the workspace with an exclusive lock held
    pub fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = self.acquire_write_lock()?;
        self.write_snapshot(&mut lock_file, snapshot)
        // Lock is released when lock_file is dropped
    }
}
