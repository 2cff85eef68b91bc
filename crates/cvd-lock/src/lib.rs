// cvd-lock: instance id pool discovery, advisory lockfiles, and allocation.
// Depends only on cvd-core.

pub mod allocator;
pub mod lockfile;
pub mod pool;

pub use allocator::{allocate, IdRequest};
pub use lockfile::{InUseState, LockFile, LockManager};
pub use pool::{discover_pool, parse_proc_net_dev, temp_dir};
