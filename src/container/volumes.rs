//! Bind mounts from host paths into the container rootfs.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::mount::{mount, umount2, MntFlags, MsFlags};

use crate::config::Config;
use crate::error::{Result, RuntimeError};

/// Bind every configured volume into the rootfs.
pub fn mount_volumes(config: &Config) -> Result<()> {
    for m in &config.mounts {
        let dest = dest_in_host(&config.rootfs, &m.destination);
        mount_volume(Path::new(&m.source), &dest)?;
        debug!("Mounted volume {} -> {:?}", m.source, dest);
    }

    Ok(())
}

/// Unmount every volume. Failures are ignored; the rootfs teardown
/// copes with anything left busy.
pub fn umount_volumes(config: &Config) {
    for m in &config.mounts {
        let dest = dest_in_host(&config.rootfs, &m.destination);
        if let Err(e) = umount2(&dest, MntFlags::MNT_DETACH) {
            warn!("Failed to unmount volume {:?}: {}", dest, e);
        }
    }
}

fn dest_in_host(rootfs: &str, destination: &str) -> PathBuf {
    Path::new(rootfs).join(destination.trim_start_matches('/'))
}

fn mount_volume(source: &Path, dest: &Path) -> Result<()> {
    // Both ends are created on demand.
    ensure_dir(source)?;
    ensure_dir(dest)?;

    mount(
        Some(source),
        dest,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::mount(format!("bind mount {:?} -> {:?} failed", source, dest), e))
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| RuntimeError::io(path, e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))
            .map_err(|e| RuntimeError::io(path, e))?;
    }

    Ok(())
}
