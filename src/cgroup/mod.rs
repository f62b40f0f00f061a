//! Cgroup management, abstracted over hierarchy versions.
//!
//! Only the v2 unified hierarchy is implemented today; callers go
//! through [`CgroupManager`] so a v1 manager can slot in later.

use lazy_static::lazy_static;
use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC};

use crate::config::Resources;
use crate::constant::CGROUP_V2_UNIFIED_MOUNT_POINT;
use crate::error::{Result, RuntimeError};

pub mod v2;

/// Scheduling period used when the user only gives a CPU fraction.
pub const DEFAULT_CPU_PERIOD_US: u64 = 100_000;

pub trait CgroupManager {
    /// Create the cgroup directory. Fails if it already exists.
    fn init(&self) -> Result<()>;

    /// Move a process into the cgroup.
    fn apply(&self, pid: i32) -> Result<()>;

    /// Write the resource limits. Individual controller failures are
    /// logged, not propagated.
    fn set(&self, resources: &Resources);

    /// Remove the cgroup. Safe to call when partially initialized.
    fn destroy(&self);
}

lazy_static! {
    static ref IS_UNIFIED: bool = match statfs(CGROUP_V2_UNIFIED_MOUNT_POINT) {
        Ok(fs) => fs.filesystem_type() == CGROUP2_SUPER_MAGIC,
        Err(_) => false,
    };
}

/// Whether the host mounts the cgroup v2 unified hierarchy.
pub fn is_cgroup2_unified_mode() -> bool {
    *IS_UNIFIED
}

/// Build a manager for the cgroup at `path` (absolute, under the
/// unified mount point).
pub fn new_cgroup_manager(path: &str) -> Result<Box<dyn CgroupManager>> {
    if is_cgroup2_unified_mode() {
        return Ok(Box::new(v2::V2Manager::new(path)));
    }

    Err(RuntimeError::unsupported(
        "cgroup v2 is not enabled on this host",
    ))
}
