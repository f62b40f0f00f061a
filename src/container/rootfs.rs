//! Overlay rootfs assembly.
//!
//! Layout under /var/lib/m-docker:
//!   images/ubuntu.tar     base image, provided by the operator
//!   layers/ubuntu/        extracted image layer, read-only and shared
//!   layers/<id>/{fs,work} per-container upperdir and workdir
//!   rootfs/<id>/          the merged overlay mount

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, warn};
use nix::mount::{umount, umount2, MntFlags};

use crate::config::Config;
use crate::constant::{OVERLAY_FS_NAME, ROOT_PATH};
use crate::error::{Result, RuntimeError};

fn image_tar_path() -> PathBuf {
    Path::new(ROOT_PATH).join("images").join("ubuntu.tar")
}

fn image_layer_path() -> PathBuf {
    Path::new(ROOT_PATH).join("layers").join("ubuntu")
}

/// Stage the overlay directories and mount the merged view at
/// `config.rootfs`.
pub fn create_rootfs(config: &Config) -> Result<()> {
    unpack_image_layer(&image_tar_path(), &image_layer_path())?;

    let rw_layer = Path::new(&config.rw_layer);
    let rootfs = Path::new(&config.rootfs);
    prepare_overlay_dirs(rw_layer, rootfs)?;

    if let Err(e) = mount_overlay(&[image_layer_path()], rw_layer, rootfs) {
        remove_tree(rw_layer);
        remove_tree(rootfs);
        return Err(e);
    }

    Ok(())
}

/// Unmount the merged view and drop the per-container directories. The
/// shared image layer is never touched.
pub fn delete_rootfs(config: &Config) {
    let rootfs = Path::new(&config.rootfs);

    if rootfs.exists() {
        // A busy mount gets a lazy detach instead.
        if let Err(e) = umount(rootfs) {
            debug!("umount {:?}: {}, retrying detached", rootfs, e);
            if let Err(e) = umount2(rootfs, MntFlags::MNT_DETACH) {
                warn!("Failed to unmount rootfs {:?}: {}", rootfs, e);
            }
        }
    }

    remove_tree(rootfs);
    remove_tree(Path::new(&config.rw_layer));
}

/// Extract the image tar once; a present directory means some earlier
/// run already did the work.
fn unpack_image_layer(image_tar: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        debug!("Image layer already present at {:?}", dest);
        return Ok(());
    }

    fs::create_dir_all(dest).map_err(|e| RuntimeError::io(dest, e))?;

    let status = Command::new("tar")
        .arg("-xf")
        .arg(image_tar)
        .arg("-C")
        .arg(dest)
        .stdout(Stdio::null())
        .status()
        .map_err(|e| RuntimeError::io(image_tar, e))?;

    if !status.success() {
        remove_tree(dest);
        return Err(RuntimeError::io(
            image_tar,
            std::io::Error::other(format!("tar exited with {}", status)),
        ));
    }

    debug!("Unpacked image {:?} to {:?}", image_tar, dest);
    Ok(())
}

fn prepare_overlay_dirs(rw_layer: &Path, rootfs: &Path) -> Result<()> {
    let dirs = [
        rw_layer.to_path_buf(),
        rw_layer.join("fs"),
        rw_layer.join("work"),
        rootfs.to_path_buf(),
    ];

    for dir in &dirs {
        if let Err(e) = fs::create_dir_all(dir) {
            remove_tree(rw_layer);
            return Err(RuntimeError::io(dir, e));
        }
    }

    Ok(())
}

fn mount_overlay(lower_dirs: &[PathBuf], rw_layer: &Path, rootfs: &Path) -> Result<()> {
    let lower = lower_dirs
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(":");
    let options = format!(
        "lowerdir={},upperdir={},workdir={}",
        lower,
        rw_layer.join("fs").display(),
        rw_layer.join("work").display()
    );

    debug!("Mounting overlay at {:?} with options {}", rootfs, options);

    let status = Command::new("mount")
        .arg("-t")
        .arg("overlay")
        .arg(OVERLAY_FS_NAME)
        .arg("-o")
        .arg(&options)
        .arg(rootfs)
        .status()
        .map_err(|e| RuntimeError::io(rootfs, e))?;

    if !status.success() {
        return Err(RuntimeError::mount_msg(format!(
            "overlay mount at {:?} failed",
            rootfs
        )));
    }

    Ok(())
}

fn remove_tree(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}
