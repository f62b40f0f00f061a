//! Canonical filesystem locations and environment variable names.

/// Root of all container data (images, layers, overlay mounts).
pub const ROOT_PATH: &str = "/var/lib/m-docker";

/// Root of per-container runtime state (config, log).
pub const STATE_PATH: &str = "/run/m-docker";

/// Transient state dirs for exec sessions.
pub const TMP_PATH: &str = "/tmp/m-docker";

/// The slice every container scope lives under.
pub const CGROUP_ROOT_PATH: &str = "/sys/fs/cgroup/m-docker.slice";

/// Mount point of the cgroup v2 unified hierarchy.
pub const CGROUP_V2_UNIFIED_MOUNT_POINT: &str = "/sys/fs/cgroup";

/// Per-container config file name.
pub const CONFIG_NAME: &str = "config.json";

/// Per-container log file name.
pub const LOG_NAME: &str = "log.json";

/// Target PID for the setns re-entry path.
pub const ENV_SETNS_PID: &str = "SETNS_PID";

/// When "TRUE", init skips the rootfs setup.
pub const ENV_NOT_MOUNT_ROOTFS: &str = "NOT_MOUNT_ROOTFS";

/// Source label of the overlay mount.
pub const OVERLAY_FS_NAME: &str = "m-docker-overlay";

/// The command pipe is inherited by init at this descriptor.
pub const INIT_PIPE_FD: i32 = 3;

/// The log file is inherited by init at this descriptor when no tty is
/// attached.
pub const INIT_LOG_FD: i32 = 4;
