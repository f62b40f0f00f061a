use std::fs;
use std::path::Path;

use log::debug;

use crate::config::Resources;
use crate::error::{Result, RuntimeError};

use super::controller::Controller;

const CGROUP_CPU_MAX: &str = "cpu.max";

pub struct CpuController;

impl Controller for CpuController {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn set(&self, cgroup_path: &Path, resources: &Resources) -> Result<()> {
        let path = cgroup_path.join(CGROUP_CPU_MAX);
        let limit = cpu_max_line(resources);

        fs::write(&path, &limit).map_err(|e| RuntimeError::io(&path, e))?;

        debug!("Set cgroup cpu.max: {}", limit);
        Ok(())
    }
}

/// The cpu.max format is "<quota> <period>"; a zero quota means no cap.
fn cpu_max_line(resources: &Resources) -> String {
    if resources.cpu_quota_us == 0 {
        format!("max {}", resources.cpu_period_us)
    } else {
        format!("{} {}", resources.cpu_quota_us, resources.cpu_period_us)
    }
}
