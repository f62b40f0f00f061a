//! Container lifecycle orchestration.
//!
//! The host-side state machine: stage the environment, spawn init in
//! its namespaces, feed it the command over the pipe, wait, tear down.

mod exec;
mod init;
mod list;
mod process;
mod rootfs;
mod volumes;

pub use exec::exec_container;
pub use init::init_container;
pub use list::{list_containers, show_logs};

use std::ffi::CString;
use std::os::fd::OwnedFd;
use std::process::exit;

use log::{debug, error, info, warn};
use nix::sched::CloneFlags;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::cgroup::{self, CgroupManager};
use crate::cli::RunArgs;
use crate::config::{Config, ContainerStatus};
use crate::error::{Result, RuntimeError};

/// A container and the host-side resources backing it.
pub struct Container {
    pub config: Config,
    cgroup: Option<Box<dyn CgroupManager>>,
}

/// `run`: create the environment, hand the command to a fresh init and,
/// unless detached, see it through to teardown.
pub fn run_container(args: &RunArgs) -> Result<i32> {
    let config = Config::from_run_args(args)?;
    info!("Running container {} ({})", config.name, config.id);

    let mut container = Container::new(config);
    container.create()?;

    if args.detach {
        // The full ID on stdout is all the caller gets to keep.
        println!("{}", container.config.id);

        // SAFETY: single-threaded here; the shim child takes over the
        // runtime role while the parent returns to the shell.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                debug!("Forked shim {} for container {}", child, container.config.id);
                return Ok(0);
            }
            Ok(ForkResult::Child) => {
                let code = shim_session(&mut container);
                exit(code);
            }
            Err(e) => {
                container.remove();
                return Err(RuntimeError::spawn("failed to fork shim", e));
            }
        }
    }

    let result = container.start(namespace_flags());
    container.remove();

    result
}

/// The detached runtime: start, wait, tear down, exit. The state dir
/// survives so `ps` and `logs` keep working after the container ends.
fn shim_session(container: &mut Container) -> i32 {
    let code = match container.start(namespace_flags()) {
        Ok(code) => code,
        Err(e) => {
            error!(
                "Shim failed to run container {}: {}",
                container.config.id, e
            );
            -1
        }
    };
    container.finish();

    code
}

fn namespace_flags() -> CloneFlags {
    CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWIPC
}

impl Container {
    pub fn new(config: Config) -> Self {
        Container {
            config,
            cgroup: None,
        }
    }

    /// Stage everything the container needs on the host: overlay
    /// rootfs, volumes, cgroup. Finished steps are undone in reverse
    /// order when a later one fails.
    pub fn create(&mut self) -> Result<()> {
        rootfs::create_rootfs(&self.config)?;

        if let Err(e) = volumes::mount_volumes(&self.config) {
            volumes::umount_volumes(&self.config);
            rootfs::delete_rootfs(&self.config);
            return Err(e);
        }

        let manager = match cgroup::new_cgroup_manager(&self.config.cgroup.path) {
            Ok(manager) => manager,
            Err(e) => {
                volumes::umount_volumes(&self.config);
                rootfs::delete_rootfs(&self.config);
                return Err(e);
            }
        };

        if let Err(e) = manager.init() {
            volumes::umount_volumes(&self.config);
            rootfs::delete_rootfs(&self.config);
            return Err(e);
        }

        manager.set(&self.config.cgroup.resources);
        self.cgroup = Some(manager);

        Ok(())
    }

    /// Spawn init, persist the config, wire the cgroup, hand over the
    /// command, and wait. Returns the child's exit code.
    pub fn start(&mut self, flags: CloneFlags) -> Result<i32> {
        let (child, write_fd) = process::new_container_process(&self.config, flags)?;

        self.config.pid = child.as_raw();
        self.config.status = ContainerStatus::Running;

        // Init is parked on the pipe read until the write end closes,
        // so everything up to send_init_command happens-before the user
        // command.
        if let Err(e) = self.config.record() {
            return Err(self.abort_start(child, write_fd, e));
        }

        if let Some(manager) = &self.cgroup {
            if let Err(e) = manager.apply(child.as_raw()) {
                return Err(self.abort_start(child, write_fd, e));
            }
        }

        if let Err(e) = process::send_init_command(&self.config.cmd, write_fd) {
            let _ = waitpid(child, None);
            return Err(e);
        }

        let status = waitpid(child, None).map_err(|e| RuntimeError::spawn("waitpid failed", e))?;
        info!("Container {} exited with {:?}", self.config.id, status);

        Ok(exit_code(status))
    }

    /// Tear down everything `create`/`start` built, state dir included.
    pub fn remove(&mut self) {
        self.config.status = ContainerStatus::Exited;
        self.config.delete_state();

        self.release_resources();
    }

    /// Tear down the kernel-side resources but keep the state dir, so a
    /// finished background container still shows up in `ps` and keeps
    /// its log.
    pub fn finish(&mut self) {
        self.config.status = ContainerStatus::Exited;
        if let Err(e) = self.config.record() {
            warn!(
                "Failed to record final status for {}: {}",
                self.config.id, e
            );
        }

        self.release_resources();
    }

    fn release_resources(&mut self) {
        if let Some(manager) = &self.cgroup {
            manager.destroy();
        }

        volumes::umount_volumes(&self.config);
        rootfs::delete_rootfs(&self.config);
    }

    /// Closing the pipe unwritten leaves init with an empty command; it
    /// errors out on its own and only has to be reaped.
    fn abort_start(&self, child: Pid, write_fd: OwnedFd, cause: RuntimeError) -> RuntimeError {
        drop(write_fd);
        let _ = waitpid(child, None);

        cause
    }
}

fn exit_code(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => signal as i32,
        _ => -1,
    }
}

pub(crate) fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| RuntimeError::config(format!("NUL byte in \"{}\"", s)))
}
