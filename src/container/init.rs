//! The in-container half of the runtime: the hidden `init` subcommand.
//!
//! The orchestrator spawns `/proc/self/exe init` either inside a fresh
//! set of namespaces (run) or plain (exec, which joins an existing
//! container via setns). Either way init reads the user command from
//! the inherited pipe on fd 3 and execs into it.

use std::env;
use std::ffi::CString;
use std::fs::{self, File};
use std::io::Read;
use std::os::fd::{BorrowedFd, FromRawFd};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::exit;

use log::debug;
use nix::fcntl::{open, OFlag};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{setns, CloneFlags};
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{chdir, close, execv, fork, getcwd, pivot_root, ForkResult};

use crate::constant::{ENV_NOT_MOUNT_ROOTFS, ENV_SETNS_PID, INIT_PIPE_FD};
use crate::error::{Result, RuntimeError};

use super::{cstring, exit_code};

/// Entry point of the `init` subcommand.
pub fn init_container() -> Result<()> {
    // Re-entry first: joining an existing container replaces the fresh
    // namespace setup wholesale.
    if let Ok(pid) = env::var(ENV_SETNS_PID) {
        let pid: i32 = pid
            .parse()
            .map_err(|_| RuntimeError::config(format!("invalid {}: {}", ENV_SETNS_PID, pid)))?;
        enter_namespaces(pid)?;

        // setns on a pid namespace only applies to children, so the
        // command must run in a fork; the parent just relays its exit
        // status.
        // SAFETY: single-threaded; the child only reads the pipe and
        // execs.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                let status = waitpid(child, None)
                    .map_err(|e| RuntimeError::spawn("waitpid failed", e))?;
                exit(exit_code(status));
            }
            Ok(ForkResult::Child) => {
                // Falls through to the pipe read and exec below.
            }
            Err(e) => {
                return Err(RuntimeError::spawn(
                    "failed to fork into the pid namespace",
                    e,
                ))
            }
        }
    }

    if env::var(ENV_NOT_MOUNT_ROOTFS).as_deref() != Ok("TRUE") {
        setup_rootfs()?;
    }

    // Quiet at default verbosity: stderr may be the captured log file,
    // and `logs` dumps that file raw.
    let command = read_command()?;
    debug!("Ready to run command: {:?}", command);

    do_exec(&command)
}

/// Turn the overlay mount the parent left us in into the root of this
/// mount namespace, then give it a /proc and a /dev.
fn setup_rootfs() -> Result<()> {
    // Detach mount propagation from the host first; pivot_root also
    // refuses to operate on a shared root.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::mount("failed to make / private", e))?;

    let rootfs = getcwd()
        .map_err(|e| RuntimeError::io("cwd", std::io::Error::from_raw_os_error(e as i32)))?;
    switch_root(&rootfs)?;

    mount_proc()?;
    mount_dev()?;

    Ok(())
}

fn switch_root(rootfs: &Path) -> Result<()> {
    debug!("Switching root to {:?}", rootfs);

    // pivot_root requires the new root to be a mount point; bind it
    // onto itself.
    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::mount(format!("failed to bind mount {:?}", rootfs), e))?;

    // The old root is parked here until it can be dropped.
    let put_old = rootfs.join(".put_old");
    if !put_old.exists() {
        fs::DirBuilder::new()
            .mode(0o700)
            .create(&put_old)
            .map_err(|e| RuntimeError::io(&put_old, e))?;
    }

    pivot_root(rootfs, &put_old)
        .map_err(|e| RuntimeError::mount(format!("pivot_root to {:?} failed", rootfs), e))?;

    chdir("/").map_err(|e| RuntimeError::mount("failed to chdir to new root", e))?;

    let put_old = "/.put_old";
    umount2(put_old, MntFlags::MNT_DETACH)
        .map_err(|e| RuntimeError::mount("failed to unmount old root", e))?;
    fs::remove_dir_all(put_old).map_err(|e| RuntimeError::io(put_old, e))?;

    Ok(())
}

fn mount_proc() -> Result<()> {
    if !Path::new("/proc").exists() {
        fs::create_dir("/proc").map_err(|e| RuntimeError::io("/proc", e))?;
    }

    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| RuntimeError::mount("failed to mount /proc", e))
}

fn mount_dev() -> Result<()> {
    if !Path::new("/dev").exists() {
        fs::create_dir("/dev").map_err(|e| RuntimeError::io("/dev", e))?;
    }

    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| RuntimeError::mount("failed to mount /dev", e))
}

/// Join the namespaces of a running container. The mount namespace goes
/// last so /proc/<pid>/ns stays readable while the others attach.
fn enter_namespaces(pid: i32) -> Result<()> {
    for ns in ["ipc", "uts", "net", "pid", "mnt"] {
        let path = format!("/proc/{}/ns/{}", pid, ns);
        let fd = open(path.as_str(), OFlag::O_RDONLY, Mode::empty())
            .map_err(|e| RuntimeError::io(&path, std::io::Error::from_raw_os_error(e as i32)))?;

        // SAFETY: the fd was just opened and stays valid until setns
        // returns.
        let result = setns(unsafe { BorrowedFd::borrow_raw(fd) }, CloneFlags::empty());
        let _ = close(fd);

        result.map_err(|e| RuntimeError::spawn(format!("setns into {} failed", path), e))?;
    }

    Ok(())
}

/// Read the command pipe to EOF. The parent closes its end only after
/// the cgroup assignment and the config record are done, so reaching
/// EOF doubles as the go signal.
fn read_command() -> Result<Vec<String>> {
    // SAFETY: fd 3 is the read end of the command pipe, placed there by
    // the orchestrator before exec.
    let mut pipe = unsafe { File::from_raw_fd(INIT_PIPE_FD) };

    let mut message = String::new();
    pipe.read_to_string(&mut message)
        .map_err(|e| RuntimeError::io("init pipe (fd 3)", e))?;

    Ok(parse_command(&message))
}

fn parse_command(message: &str) -> Vec<String> {
    message
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

fn do_exec(command: &[String]) -> Result<()> {
    let program = command.first().map(String::as_str).unwrap_or_default();
    let resolved = lookup_path(program)?;

    let path = cstring(&resolved.display().to_string())?;
    let argv = command
        .iter()
        .map(|arg| cstring(arg))
        .collect::<Result<Vec<CString>>>()?;

    // On success this never returns; the environment rides through.
    execv(&path, &argv)
        .map_err(|e| RuntimeError::spawn(format!("exec {:?} failed", resolved), e))?;

    Ok(())
}

/// Resolve a command the way the shell would.
fn lookup_path(program: &str) -> Result<PathBuf> {
    if program.is_empty() {
        return Err(RuntimeError::command_not_found(program));
    }

    if program.contains('/') {
        let path = PathBuf::from(program);
        if is_executable(&path) {
            return Ok(path);
        }
        return Err(RuntimeError::command_not_found(program));
    }

    let search = env::var("PATH").unwrap_or_default();
    for dir in search.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(program);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(RuntimeError::command_not_found(program))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
