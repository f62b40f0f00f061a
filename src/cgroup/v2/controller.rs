use std::path::Path;

use crate::config::Resources;
use crate::error::Result;

use super::{CpuController, MemoryController};

/// A single cgroup v2 controller.
pub trait Controller {
    /// Controller name as listed in cgroup.controllers.
    fn name(&self) -> &'static str;

    /// Write the limits this controller is responsible for.
    fn set(&self, cgroup_path: &Path, resources: &Resources) -> Result<()>;
}

/// Every controller the runtime drives. New ones (pids, io, cpuset)
/// plug in here.
pub fn controllers() -> Vec<Box<dyn Controller>> {
    vec![Box::new(CpuController), Box::new(MemoryController)]
}
