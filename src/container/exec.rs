//! Re-entering a running container.

use std::process::exit;

use log::{debug, error};
use nix::sched::CloneFlags;
use nix::unistd::{fork, ForkResult};

use crate::cli::ExecArgs;
use crate::config::Config;
use crate::constant::{ENV_NOT_MOUNT_ROOTFS, ENV_SETNS_PID, LOG_NAME, TMP_PATH};
use crate::error::{Result, RuntimeError};

use super::Container;

/// `exec`: run a command inside an existing container's namespaces.
pub fn exec_container(args: &ExecArgs) -> Result<i32> {
    if args.tty && args.detach {
        return Err(RuntimeError::config(
            "--it and --detach cannot be used together",
        ));
    }

    let id = Config::resolve_id(&args.container)?;
    let mut config = Config::load_from_id(&id)?;

    if config.pid <= 0 || !config.status.is_running() {
        return Err(RuntimeError::config(format!(
            "container {} is not running",
            args.container
        )));
    }

    // Only transient fields change; the container's own state dir is
    // never touched.
    let target_pid = config.pid;
    config.tty = args.tty;
    config.cmd = args.command.clone();
    config.state_dir = format!("{}/{}", TMP_PATH, config.id);
    config.log_path = format!("{}/{}", config.state_dir, LOG_NAME);
    config.env.push(format!("{}={}", ENV_SETNS_PID, target_pid));
    config.env.push(format!("{}=TRUE", ENV_NOT_MOUNT_ROOTFS));

    debug!("Exec into container {} (pid {})", config.id, target_pid);

    if args.detach {
        // SAFETY: same shim pattern as a detached run.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                debug!("Forked exec shim {}", child);
                return Ok(0);
            }
            Ok(ForkResult::Child) => {
                let code = exec_session(config).unwrap_or_else(|e| {
                    error!("Exec session failed: {}", e);
                    -1
                });
                exit(code);
            }
            Err(e) => return Err(RuntimeError::spawn("failed to fork shim", e)),
        }
    }

    exec_session(config)
}

/// The container environment already exists, so there is no create and
/// no remove; only the transient state dir is cleaned up afterwards.
fn exec_session(config: Config) -> Result<i32> {
    let mut container = Container::new(config);
    let result = container.start(CloneFlags::empty());
    container.config.delete_state();

    result
}
