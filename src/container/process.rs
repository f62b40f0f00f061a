//! Spawning `/proc/self/exe init` as the container process.
//!
//! Namespace membership is fixed at clone time, so the child is created
//! with the namespace flags already set and only then re-execs this
//! binary as the hidden `init` subcommand.

use std::ffi::CString;
use std::fs::{self, File};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use log::{debug, error};
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::libc::SIGCHLD;
use nix::sched::{clone, CloneFlags};
use nix::unistd::{chdir, close, dup2, execve, pipe, write, Pid};

use crate::config::Config;
use crate::constant::{INIT_LOG_FD, INIT_PIPE_FD};
use crate::error::{Result, RuntimeError};

use super::cstring;

const STACK_SIZE: usize = 1024 * 1024;

/// Clone a child that runs `m-docker init`: in fresh namespaces for
/// `run`, in the caller's for `exec`. Returns the child pid and the
/// write end of the command pipe.
pub fn new_container_process(config: &Config, flags: CloneFlags) -> Result<(Pid, OwnedFd)> {
    let (read_fd, write_fd) =
        pipe().map_err(|e| RuntimeError::spawn("failed to create command pipe", e))?;

    // Without a tty, container stdout/stderr go to the log file, which
    // also rides into the child on fd 4.
    let log_file = if config.tty {
        None
    } else {
        Some(create_log_file(config)?)
    };

    let exe = cstring("/proc/self/exe")?;
    let argv = [cstring("m-docker")?, cstring("init")?];
    let env = build_env(&config.env)?;

    let read_raw = read_fd.as_raw_fd();
    let write_raw = write_fd.as_raw_fd();
    let log_raw = log_file.as_ref().map(|file| file.as_raw_fd());
    let rootfs = config.rootfs.clone();

    let mut child_stack: Vec<u8> = vec![0; STACK_SIZE];

    let child_func = || {
        if let Err(e) = setup_child_fds(read_raw, write_raw, log_raw) {
            error!("Container process failed to set up fds: {}", e);
            return -1;
        }

        // Init expects its working directory to be the rootfs.
        if let Err(e) = chdir(Path::new(rootfs.as_str())) {
            error!("Container process failed to enter {}: {}", rootfs, e);
            return -1;
        }

        if let Err(e) = execve(&exe, &argv, &env) {
            error!("Failed to exec init: {}", e);
        }
        -1
    };

    // SAFETY: the closure either execs or exits; it never returns into
    // the parent's stack frames.
    let child = unsafe { clone(Box::new(child_func), &mut child_stack, flags, Some(SIGCHLD)) }
        .map_err(|e| RuntimeError::spawn("clone failed", e))?;

    debug!("Spawned container process {}", child);
    Ok((child, write_fd))
}

/// Send the space-joined command and drop the write end; the resulting
/// EOF is the rendezvous that lets init exec.
pub fn send_init_command(cmd: &[String], write_fd: OwnedFd) -> Result<()> {
    let message = cmd.join(" ");
    debug!("Sending command to init: {}", message);

    write(&write_fd, message.as_bytes()).map_err(|e| {
        RuntimeError::io("init pipe", std::io::Error::from_raw_os_error(e as i32))
    })?;

    Ok(())
}

/// The runtime's own environment plus the per-container KEY=VALUE pairs.
fn build_env(extra: &[String]) -> Result<Vec<CString>> {
    let mut env = Vec::new();
    for (key, value) in std::env::vars() {
        env.push(cstring(&format!("{}={}", key, value))?);
    }
    for kv in extra {
        env.push(cstring(kv)?);
    }

    Ok(env)
}

/// Create (or truncate) the log file. The state dir may not exist yet;
/// the config is only recorded after the spawn.
fn create_log_file(config: &Config) -> Result<File> {
    let state_dir = Path::new(&config.state_dir);
    if !state_dir.exists() {
        fs::create_dir_all(state_dir).map_err(|e| RuntimeError::io(state_dir, e))?;
        fs::set_permissions(state_dir, fs::Permissions::from_mode(0o777))
            .map_err(|e| RuntimeError::io(state_dir, e))?;
    }

    File::create(&config.log_path).map_err(|e| RuntimeError::io(&config.log_path, e))
}

/// Put the inherited descriptors where init expects them: the pipe read
/// end at fd 3, the log file at fd 4 and wired to stdout/stderr.
fn setup_child_fds(read_fd: RawFd, write_fd: RawFd, log_fd: Option<RawFd>) -> nix::Result<()> {
    // A stray copy of the write end would keep fd 3 from ever seeing EOF.
    close(write_fd)?;

    move_fd(read_fd, INIT_PIPE_FD)?;

    if let Some(log_fd) = log_fd {
        dup2(log_fd, nix::libc::STDOUT_FILENO)?;
        dup2(log_fd, nix::libc::STDERR_FILENO)?;
        move_fd(log_fd, INIT_LOG_FD)?;
    }

    Ok(())
}

/// Park `fd` at exactly `target` and make sure it survives the exec.
fn move_fd(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd == target {
        // dup2 would be a no-op that leaves close-on-exec set.
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
    } else {
        dup2(fd, target)?;
        close(fd)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_env_appends_extra_vars() {
        std::env::set_var("M_DOCKER_TEST_MARKER", "1");

        let env = build_env(&["SETNS_PID=42".to_string()]).unwrap();
        let entries: Vec<&str> = env.iter().map(|kv| kv.to_str().unwrap()).collect();

        assert!(entries.contains(&"M_DOCKER_TEST_MARKER=1"));
        assert_eq!(entries.last(), Some(&"SETNS_PID=42"));
    }
}
