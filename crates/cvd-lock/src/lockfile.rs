use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;

use cvd_core::config::LOCK_DIR_NAME;
use cvd_core::error::CvdError;
use cvd_core::instance::InstanceId;
use tracing::debug;

use crate::pool::{discover_pool, temp_dir};

/// In-use state of a lockfile's one-byte payload (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InUseState {
    NotInUse = 0x00,
    InUse = 0x01,
}

impl TryFrom<u8> for InUseState {
    type Error = CvdError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Self::NotInUse),
            0x01 => Ok(Self::InUse),
            other => Err(CvdError::corrupt_state(format!(
                "unexpected lockfile payload byte 0x{other:02x}"
            ))),
        }
    }
}

/// An acquired OS-level exclusive lock on one instance id's lockfile.
///
/// The lock is released, and the file descriptor closed, when this value is
/// dropped — including on abnormal process exit (spec §3 invariant iv).
pub struct LockFile {
    file: File,
    instance_id: InstanceId,
}

impl LockFile {
    /// The path a lockfile for `instance_id` lives at (spec §6).
    ///
    /// This layout is a compatibility contract with the Python acloud tool;
    /// it must not change.
    pub fn path_for(instance_id: InstanceId) -> PathBuf {
        temp_dir()
            .join(LOCK_DIR_NAME)
            .join(format!("local-instance-{instance_id}.lock"))
    }

    fn open(instance_id: InstanceId) -> Result<File, CvdError> {
        let path = Self::path_for(instance_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CvdError::Io(format!("creating {}: {e}", parent.display())))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| CvdError::Io(format!("open({}): {e}", path.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = file.set_permissions(std::fs::Permissions::from_mode(0o666));
        }
        Ok(file)
    }

    /// Block until the exclusive lock on `instance_id`'s lockfile is granted.
    pub fn acquire(instance_id: InstanceId) -> Result<Self, CvdError> {
        let file = Self::open(instance_id)?;
        file.lock_exclusive()
            .map_err(|e| CvdError::Io(format!("flock({instance_id}): {e}")))?;
        debug!(instance_id, "acquired instance lock (blocking)");
        Ok(Self { file, instance_id })
    }

    /// Non-blocking variant of [`Self::acquire`]. Returns `None`, without an
    /// error, if the lock is held by anyone — including another thread in
    /// this process.
    pub fn try_acquire(instance_id: InstanceId) -> Result<Option<Self>, CvdError> {
        let file = Self::open(instance_id)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, instance_id })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(CvdError::Io(format!("flock({instance_id}): {e}"))),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Read the payload byte. Must be called while the lock is held, and
    /// always seeks to offset 0 first (spec §3 invariants ii, iii).
    pub fn status(&mut self) -> Result<InUseState, CvdError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| CvdError::Io(e.to_string()))?;
        let mut byte = [0u8; 1];
        let n = self
            .file
            .read(&mut byte)
            .map_err(|e| CvdError::Io(e.to_string()))?;
        if n == 0 {
            // freshly created lockfile: the implicit/default state is NotInUse.
            return Ok(InUseState::NotInUse);
        }
        InUseState::try_from(byte[0])
    }

    /// Write the payload byte, seeking to offset 0 first.
    pub fn set_status(&mut self, state: InUseState) -> Result<(), CvdError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| CvdError::Io(e.to_string()))?;
        self.file
            .write_all(&[state as u8])
            .map_err(|e| CvdError::Io(e.to_string()))?;
        self.file.flush().map_err(|e| CvdError::Io(e.to_string()))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl std::fmt::Debug for LockFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFile")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// Owns the candidate id pool and coordinates lock acquisition across it
/// (spec §4.A). Not itself thread-safe to mutate concurrently — callers
/// share one `LockManager` behind whatever synchronisation their use case
/// needs (the daemon root object owns it by value, per spec §9).
pub struct LockManager {
    pool: BTreeSet<InstanceId>,
}

impl LockManager {
    /// Discover the pool from `/proc/net/dev`. Matches
    /// `InstanceLockFileManager`'s constructor: initialization failures are
    /// captured and propagated lazily on first use (`PoolUnknown`), not
    /// eagerly — mirrored here by returning the error immediately since we
    /// have no lazy field to stash it in.
    pub fn discover() -> Result<Self, CvdError> {
        Ok(Self {
            pool: discover_pool()?,
        })
    }

    /// Build a manager over an explicit pool (used by tests and by callers
    /// that already know their candidate ids).
    pub fn with_pool(pool: BTreeSet<InstanceId>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &BTreeSet<InstanceId> {
        &self.pool
    }

    fn check_pool_nonempty(&self) -> Result<(), CvdError> {
        if self.pool.is_empty() {
            return Err(CvdError::resource_busy(
                "0 available instance numbers on the host",
            ));
        }
        Ok(())
    }

    /// Block until the lock for `id` is granted. `id` need not be in the
    /// pool — the original allows locking arbitrary ids (e.g. explicitly
    /// requested ones are checked against the pool by the caller).
    pub fn acquire_lock(&self, id: InstanceId) -> Result<LockFile, CvdError> {
        LockFile::acquire(id)
    }

    /// Batch form of [`Self::acquire_lock`]. Not atomic across the set;
    /// ids are locked in ascending order to avoid deadlock against any other
    /// caller using the same discipline (spec §4.A, §5).
    pub fn acquire_locks(&self, ids: &BTreeSet<InstanceId>) -> Result<Vec<LockFile>, CvdError> {
        let mut acquired = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.acquire_lock(id) {
                Ok(lock) => acquired.push(lock),
                Err(e) => {
                    // release everything acquired so far before failing
                    drop(acquired);
                    return Err(e);
                }
            }
        }
        Ok(acquired)
    }

    pub fn try_acquire_lock(&self, id: InstanceId) -> Result<Option<LockFile>, CvdError> {
        LockFile::try_acquire(id)
    }

    pub fn try_acquire_locks(&self, ids: &BTreeSet<InstanceId>) -> Result<Vec<LockFile>, CvdError> {
        let mut acquired = Vec::new();
        for &id in ids {
            if let Some(lock) = self.try_acquire_lock(id)? {
                acquired.push(lock);
            }
        }
        Ok(acquired)
    }

    /// Try-acquire every id in the pool, keeping only the locks whose
    /// payload byte reads `NotInUse` (spec §4.A). Used by the allocator.
    pub fn lock_all_available(&self) -> Result<Vec<LockFile>, CvdError> {
        self.check_pool_nonempty()?;
        let mut available = Vec::new();
        for &id in &self.pool {
            if let Some(mut lock) = self.try_acquire_lock(id)? {
                if lock.status()? == InUseState::NotInUse {
                    available.push(lock);
                }
            }
        }
        Ok(available)
    }

    /// First-fit variant: return the first id in ascending order whose lock
    /// is free and whose payload reads `NotInUse`.
    pub fn try_acquire_unused_lock(&self) -> Result<Option<LockFile>, CvdError> {
        self.check_pool_nonempty()?;
        for &id in &self.pool {
            if let Some(mut lock) = self.try_acquire_lock(id)? {
                if lock.status()? == InUseState::NotInUse {
                    return Ok(Some(lock));
                }
            }
        }
        Ok(None)
    }

    /// Best-effort removal of an id's lockfile from disk. The caller must
    /// check that `id` belongs to them before calling this — this is a
    /// direct port of the original's documented "quick fix", not a new
    /// authorization layer (spec §3: "Removing a Group MUST release all its
    /// lockfiles").
    pub fn remove_lock_file(&self, id: InstanceId) -> Result<(), CvdError> {
        let path = LockFile::path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CvdError::Io(format!("remove({}): {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn isolated_pool(ids: &[InstanceId]) -> (tempfile::TempDir, LockManager) {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: tests run single-threaded per-process via default test
        // harness behavior is not guaranteed, but each test uses a
        // dedicated TMPDIR so collisions are directory-isolated regardless.
        unsafe { std::env::set_var("TMPDIR", dir.path()); }
        (dir, LockManager::with_pool(ids.iter().copied().collect()))
    }

    #[test]
    fn test_acquire_and_drop_frees_lock() {
        let (_dir, mgr) = isolated_pool(&[1]);
        {
            let _lock = mgr.acquire_lock(1).unwrap();
            assert!(mgr.try_acquire_lock(1).unwrap().is_none());
        }
        assert!(mgr.try_acquire_lock(1).unwrap().is_some());
    }

    #[test]
    fn test_status_roundtrip_is_idempotent() {
        let (_dir, mgr) = isolated_pool(&[2]);
        let mut lock = mgr.acquire_lock(2).unwrap();
        assert_eq!(lock.status().unwrap(), InUseState::NotInUse);
        lock.set_status(InUseState::InUse).unwrap();
        assert_eq!(lock.status().unwrap(), InUseState::InUse);
        lock.set_status(InUseState::NotInUse).unwrap();
        assert_eq!(lock.status().unwrap(), InUseState::NotInUse);
    }

    #[test]
    fn test_lock_all_available_skips_in_use() {
        let (_dir, mgr) = isolated_pool(&[1, 2, 3]);
        let mut marked_busy = mgr.acquire_lock(2).unwrap();
        marked_busy.set_status(InUseState::InUse).unwrap();

        let available = mgr.lock_all_available().unwrap();
        let ids: BTreeSet<_> = available.iter().map(|l| l.instance_id()).collect();
        assert_eq!(ids, BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_try_acquire_unused_lock_first_fit() {
        let (_dir, mgr) = isolated_pool(&[5, 1, 3]);
        let lock = mgr.try_acquire_unused_lock().unwrap().unwrap();
        assert_eq!(lock.instance_id(), 1);
    }

    #[test]
    fn test_try_acquire_unused_lock_empty_pool_errors() {
        let (_dir, mgr) = isolated_pool(&[]);
        assert!(mgr.try_acquire_unused_lock().is_err());
    }

    #[test]
    fn test_remove_lock_file_releases_on_disk() {
        let (_dir, mgr) = isolated_pool(&[9]);
        {
            let mut lock = mgr.acquire_lock(9).unwrap();
            lock.set_status(InUseState::InUse).unwrap();
        }
        mgr.remove_lock_file(9).unwrap();
        assert!(!LockFile::path_for(9).exists());
        // removing twice is a no-op, not an error
        assert!(mgr.remove_lock_file(9).is_ok());
    }

    #[test]
    fn test_acquire_locks_ascending_order_and_rollback() {
        let (_dir, mgr) = isolated_pool(&[1, 2, 3]);
        // pre-lock id 2 so the batch acquire fails partway through
        let _blocker = mgr.acquire_lock(2).unwrap();
        let ids = BTreeSet::from([1, 2, 3]);
        assert!(mgr.try_acquire_locks(&ids).unwrap().len() == 2);
    }
}
