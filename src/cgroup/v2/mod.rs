//! The cgroup v2 manager: one directory per container under the
//! m-docker slice, driven entirely through the filesystem.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::Resources;
use crate::constant::CGROUP_V2_UNIFIED_MOUNT_POINT;
use crate::error::{Result, RuntimeError};

use super::CgroupManager;

mod controller;
mod cpu;
mod memory;

pub use controller::{controllers, Controller};
pub use cpu::CpuController;
pub use memory::MemoryController;

const CGROUP_PROCS: &str = "cgroup.procs";
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";

pub struct V2Manager {
    path: PathBuf,
    controllers: Vec<Box<dyn Controller>>,
}

impl V2Manager {
    pub fn new(path: &str) -> Self {
        // Interpret relative paths against the unified mount point.
        let path = if path.starts_with(CGROUP_V2_UNIFIED_MOUNT_POINT) {
            PathBuf::from(path)
        } else {
            Path::new(CGROUP_V2_UNIFIED_MOUNT_POINT).join(path.trim_start_matches('/'))
        };

        V2Manager {
            path,
            controllers: controllers(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The scope's limit files only exist once every level above it
    /// delegates the controllers, root first. Best effort; a missing
    /// controller surfaces later as a `set` warning.
    fn delegate_controllers(&self, parent: &Path) {
        let root = Path::new(CGROUP_V2_UNIFIED_MOUNT_POINT);

        let mut levels = Vec::new();
        let mut current = parent;
        while current.starts_with(root) {
            levels.push(current.to_path_buf());
            if current == root {
                break;
            }
            current = match current.parent() {
                Some(dir) => dir,
                None => break,
            };
        }

        for dir in levels.iter().rev() {
            for controller in &self.controllers {
                let entry = format!("+{}", controller.name());
                if let Err(e) = fs::write(dir.join(CGROUP_SUBTREE_CONTROL), &entry) {
                    debug!("Enabling {} in {:?}: {}", entry, dir, e);
                }
            }
        }
    }
}

impl CgroupManager for V2Manager {
    fn init(&self) -> Result<()> {
        if self.path.exists() {
            // Refuse to adopt a leftover scope.
            return Err(RuntimeError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "cgroup already exists"),
            ));
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| RuntimeError::io(parent, e))?;
            self.delegate_controllers(parent);
        }
        fs::create_dir(&self.path).map_err(|e| RuntimeError::io(&self.path, e))?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755))
            .map_err(|e| RuntimeError::io(&self.path, e))?;

        debug!("Created cgroup {}", self.path.display());
        Ok(())
    }

    fn apply(&self, pid: i32) -> Result<()> {
        let procs = self.path.join(CGROUP_PROCS);
        fs::write(&procs, pid.to_string()).map_err(|e| RuntimeError::io(&procs, e))?;

        debug!("Moved pid {} into {}", pid, self.path.display());
        Ok(())
    }

    fn set(&self, resources: &Resources) {
        for controller in &self.controllers {
            if let Err(e) = controller.set(&self.path, resources) {
                warn!("Failed to set cgroup controller {}: {}", controller.name(), e);
            }
        }
    }

    fn destroy(&self) {
        // Control files cannot be unlinked; rmdir is what removes a
        // cgroup. remove_dir_all clears sub-cgroups first.
        let _ = fs::remove_dir_all(&self.path);
        let _ = fs::remove_dir(&self.path);
    }
}
