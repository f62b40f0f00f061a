use std::fs;
use std::path::Path;

use log::debug;

use crate::config::Resources;
use crate::error::{Result, RuntimeError};

use super::controller::Controller;

const CGROUP_MEMORY_MAX: &str = "memory.max";

pub struct MemoryController;

impl Controller for MemoryController {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn set(&self, cgroup_path: &Path, resources: &Resources) -> Result<()> {
        let path = cgroup_path.join(CGROUP_MEMORY_MAX);

        // The user string goes to the kernel untouched; it knows best
        // what "100m" or "max" means.
        fs::write(&path, &resources.memory).map_err(|e| RuntimeError::io(&path, e))?;

        debug!("Set cgroup memory.max: {}", resources.memory);
        Ok(())
    }
}
