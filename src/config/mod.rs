//! The container configuration record.
//!
//! A `Config` is the single source of truth for a container: it is built
//! from the CLI arguments, persisted as `config.json` under the state
//! root once init is spawned, and read back by `ps`, `logs` and `exec`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::Local;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cgroup::DEFAULT_CPU_PERIOD_US;
use crate::cli::RunArgs;
use crate::constant::{CGROUP_ROOT_PATH, CONFIG_NAME, LOG_NAME, ROOT_PATH, STATE_PATH};
use crate::error::{Result, RuntimeError};

mod name;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

/// A bind mount from a host path into the container rootfs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub destination: String,
}

/// Resource limits, written to the cgroup controllers verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    /// Contents of memory.max, "max" meaning unlimited.
    pub memory: String,

    /// Scheduling period for the CPU hard cap, in microseconds.
    pub cpu_period_us: u64,

    /// CPU time allowed per period, in microseconds. 0 means unlimited.
    pub cpu_quota_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CgroupConfig {
    pub name: String,

    /// Absolute path of the cgroup directory.
    pub path: String,

    pub resources: Resources,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// SHA-256 of name and creation time, as 64 hex chars.
    pub id: String,

    pub name: String,

    /// Host PID of the init process, 0 until it is spawned.
    pub pid: i32,

    pub status: ContainerStatus,

    pub tty: bool,

    /// The command run inside the container.
    pub cmd: Vec<String>,

    /// Extra KEY=VALUE pairs passed to init on top of the runtime's env.
    pub env: Vec<String>,

    /// Mount point of the merged overlay view.
    pub rootfs: String,

    /// Per-container writable layer (upperdir and workdir live below it).
    pub rw_layer: String,

    /// Where config.json and log.json live.
    pub state_dir: String,

    pub log_path: String,

    pub mounts: Vec<Mount>,

    pub cgroup: CgroupConfig,

    pub created_time: String,
}

impl Config {
    /// Build a fresh `Config` from the `run` arguments.
    pub fn from_run_args(args: &RunArgs) -> Result<Config> {
        if args.tty && args.detach {
            return Err(RuntimeError::config(
                "--it and --detach cannot be used together",
            ));
        }

        let created_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let name = match &args.name {
            Some(name) => name.clone(),
            None => name::generate_unique(Path::new(STATE_PATH)),
        };

        let id = container_id(&name, &created_time);

        let cmd = if args.command.is_empty() {
            warn!("Missing container command, filling with '/bin/bash'");
            vec!["/bin/bash".to_string()]
        } else {
            args.command.clone()
        };

        let mounts = args
            .volumes
            .iter()
            .map(|v| parse_volume(v))
            .collect::<Result<Vec<_>>>()?;

        let cpu_quota_us = match args.cpu {
            Some(fraction) => (fraction * DEFAULT_CPU_PERIOD_US as f64).round() as u64,
            None => 0,
        };
        let resources = Resources {
            memory: args.mem.clone().unwrap_or_else(|| "max".to_string()),
            cpu_period_us: DEFAULT_CPU_PERIOD_US,
            cpu_quota_us,
        };

        let cgroup_name = format!("m-docker-{}.scope", id);
        let state_dir = format!("{}/{}", STATE_PATH, id);

        Ok(Config {
            name,
            pid: 0,
            status: ContainerStatus::Created,
            tty: args.tty,
            cmd,
            env: Vec::new(),
            rootfs: format!("{}/rootfs/{}", ROOT_PATH, id),
            rw_layer: format!("{}/layers/{}", ROOT_PATH, id),
            log_path: format!("{}/{}", state_dir, LOG_NAME),
            state_dir,
            mounts,
            cgroup: CgroupConfig {
                path: format!("{}/{}", CGROUP_ROOT_PATH, cgroup_name),
                name: cgroup_name,
                resources,
            },
            created_time,
            id,
        })
    }

    /// Persist the config as `config.json` under the state dir, creating
    /// the directory if needed.
    pub fn record(&self) -> Result<()> {
        let state_dir = Path::new(&self.state_dir);
        if !state_dir.exists() {
            fs::create_dir_all(state_dir).map_err(|e| RuntimeError::io(state_dir, e))?;
            fs::set_permissions(state_dir, fs::Permissions::from_mode(0o777))
                .map_err(|e| RuntimeError::io(state_dir, e))?;
        }

        let path = state_dir.join(CONFIG_NAME);
        let content =
            serde_json::to_string_pretty(self).map_err(|e| RuntimeError::io(&path, e.into()))?;
        fs::write(&path, content).map_err(|e| RuntimeError::io(&path, e))?;

        Ok(())
    }

    /// Drop the state dir and everything in it.
    pub fn delete_state(&self) {
        if let Err(e) = fs::remove_dir_all(&self.state_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove state dir {}: {}", self.state_dir, e);
            }
        }
    }

    pub fn load_from_state_dir(dir: &Path) -> Result<Config> {
        let path = dir.join(CONFIG_NAME);
        let content = fs::read_to_string(&path).map_err(|e| RuntimeError::io(&path, e))?;
        let config =
            serde_json::from_str(&content).map_err(|e| RuntimeError::io(&path, e.into()))?;

        Ok(config)
    }

    pub fn load_from_id(id: &str) -> Result<Config> {
        Self::load_from_state_dir(&Path::new(STATE_PATH).join(id))
    }

    /// Resolve a container reference to a full ID.
    pub fn resolve_id(name_or_prefix: &str) -> Result<String> {
        Self::resolve_id_in(Path::new(STATE_PATH), name_or_prefix)
    }

    /// Resolve against a specific state root. An exact name match wins;
    /// otherwise the reference must be a unique ID prefix.
    pub fn resolve_id_in(state_root: &Path, name_or_prefix: &str) -> Result<String> {
        let ids = state_entries(state_root);

        for id in &ids {
            if let Ok(config) = Self::load_from_state_dir(&state_root.join(id)) {
                if config.name == name_or_prefix {
                    return Ok(config.id);
                }
            }
        }

        let mut matches = ids.iter().filter(|id| id.starts_with(name_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            _ => Err(RuntimeError::not_found(name_or_prefix)),
        }
    }

    /// Load every readable config under the default state root.
    pub fn load_all() -> Vec<Config> {
        Self::load_all_in(Path::new(STATE_PATH))
    }

    /// Load every readable config under a state root. Unreadable entries
    /// are skipped with a warning so one broken container cannot hide
    /// the rest.
    pub fn load_all_in(state_root: &Path) -> Vec<Config> {
        let mut configs = Vec::new();
        for id in state_entries(state_root) {
            match Self::load_from_state_dir(&state_root.join(&id)) {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Skipping state entry {}: {}", id, e),
            }
        }

        configs
    }
}

fn state_entries(state_root: &Path) -> Vec<String> {
    match fs::read_dir(state_root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// The container ID is the SHA-256 of name and creation time.
fn container_id(name: &str, created_time: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(created_time.as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Parse a volume spec of the form "SRC:DEST", both parts non-empty.
pub fn parse_volume(spec: &str) -> Result<Mount> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(RuntimeError::config(format!(
            "invalid volume \"{}\", expected SRC:DEST",
            spec
        )));
    }

    Ok(Mount {
        source: parts[0].to_string(),
        destination: parts[1].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_container_id_is_deterministic() {
        let a = container_id("brave_bell", "2026-08-01 12:00:00");
        let b = container_id("brave_bell", "2026-08-01 12:00:00");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_container_id_depends_on_inputs() {
        let a = container_id("brave_bell", "2026-08-01 12:00:00");
        let b = container_id("brave_bell", "2026-08-01 12:00:01");
        let c = container_id("brave_benz", "2026-08-01 12:00:00");

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[rstest]
    #[case("/tmp/hostdir:/data", "/tmp/hostdir", "/data")]
    #[case("a:b", "a", "b")]
    fn test_parse_volume_ok(#[case] spec: &str, #[case] source: &str, #[case] destination: &str) {
        let mount = parse_volume(spec).unwrap();
        assert_eq!(mount.source, source);
        assert_eq!(mount.destination, destination);
    }

    #[rstest]
    #[case("a")]
    #[case(":b")]
    #[case("a:")]
    #[case("a:b:c")]
    #[case("")]
    #[case(":")]
    fn test_parse_volume_invalid(#[case] spec: &str) {
        assert!(matches!(
            parse_volume(spec),
            Err(RuntimeError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_from_run_args_rejects_tty_with_detach() {
        let args = RunArgs {
            tty: true,
            detach: true,
            command: vec!["/bin/true".to_string()],
            ..Default::default()
        };

        assert!(matches!(
            Config::from_run_args(&args),
            Err(RuntimeError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_from_run_args_defaults() {
        let args = RunArgs {
            name: Some("t0".to_string()),
            ..Default::default()
        };
        let config = Config::from_run_args(&args).unwrap();

        assert_eq!(config.cmd, vec!["/bin/bash"]);
        assert_eq!(config.status, ContainerStatus::Created);
        assert_eq!(config.pid, 0);
        assert_eq!(config.cgroup.resources.memory, "max");
        assert_eq!(config.cgroup.resources.cpu_period_us, 100_000);
        assert_eq!(config.cgroup.resources.cpu_quota_us, 0);
        assert_eq!(config.id, container_id("t0", &config.created_time));
        assert_eq!(config.cgroup.name, format!("m-docker-{}.scope", config.id));
        assert!(config.rootfs.ends_with(&config.id));
        assert!(config.log_path.starts_with(&config.state_dir));
    }

    #[test]
    fn test_from_run_args_cpu_quota_rounding() {
        let args = RunArgs {
            name: Some("t1".to_string()),
            cpu: Some(0.5),
            mem: Some("100m".to_string()),
            command: vec!["sleep".to_string(), "60".to_string()],
            ..Default::default()
        };
        let config = Config::from_run_args(&args).unwrap();

        assert_eq!(config.cgroup.resources.cpu_quota_us, 50_000);
        assert_eq!(config.cgroup.resources.memory, "100m");
    }

    #[test]
    fn test_record_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();

        let args = RunArgs {
            name: Some("round_trip".to_string()),
            volumes: vec!["/tmp/a:/a".to_string()],
            command: vec!["/bin/echo".to_string(), "hi".to_string()],
            ..Default::default()
        };
        let mut config = Config::from_run_args(&args).unwrap();
        config.state_dir = tmp.path().join(&config.id).display().to_string();

        config.record().unwrap();
        let loaded = Config::load_from_state_dir(Path::new(&config.state_dir)).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_record_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();

        let args = RunArgs {
            name: Some("twice".to_string()),
            ..Default::default()
        };
        let mut config = Config::from_run_args(&args).unwrap();
        config.state_dir = tmp.path().join(&config.id).display().to_string();

        config.record().unwrap();
        config.record().unwrap();
    }

    #[test]
    fn test_load_tolerates_unknown_fields() {
        let tmp = tempfile::tempdir().unwrap();

        let args = RunArgs {
            name: Some("fwd_compat".to_string()),
            ..Default::default()
        };
        let mut config = Config::from_run_args(&args).unwrap();
        config.state_dir = tmp.path().display().to_string();
        config.record().unwrap();

        // A newer runtime may have written fields this one does not know.
        let path = tmp.path().join(CONFIG_NAME);
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["some_future_field"] = serde_json::json!(42);
        fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

        let loaded = Config::load_from_state_dir(tmp.path()).unwrap();
        assert_eq!(loaded.name, "fwd_compat");
    }

    fn record_fake(state_root: &Path, name: &str, id_seed: &str) -> String {
        let args = RunArgs {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let mut config = Config::from_run_args(&args).unwrap();
        config.id = container_id(id_seed, "");
        config.state_dir = state_root.join(&config.id).display().to_string();
        config.record().unwrap();

        config.id
    }

    #[test]
    fn test_resolve_id_by_exact_name() {
        let tmp = tempfile::tempdir().unwrap();
        let id = record_fake(tmp.path(), "web", "seed-a");
        record_fake(tmp.path(), "db", "seed-b");

        assert_eq!(Config::resolve_id_in(tmp.path(), "web").unwrap(), id);
    }

    #[test]
    fn test_resolve_id_by_unique_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let id = record_fake(tmp.path(), "web", "seed-a");

        assert_eq!(Config::resolve_id_in(tmp.path(), &id[..12]).unwrap(), id);
        assert_eq!(Config::resolve_id_in(tmp.path(), &id).unwrap(), id);
    }

    #[test]
    fn test_resolve_id_ambiguous_prefix_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        record_fake(tmp.path(), "web", "seed-a");
        record_fake(tmp.path(), "db", "seed-b");

        // Every hex ID matches the empty prefix.
        assert!(matches!(
            Config::resolve_id_in(tmp.path(), ""),
            Err(RuntimeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_id_unknown_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        record_fake(tmp.path(), "web", "seed-a");

        assert!(matches!(
            Config::resolve_id_in(tmp.path(), "nope"),
            Err(RuntimeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_all_skips_broken_entries() {
        let tmp = tempfile::tempdir().unwrap();
        record_fake(tmp.path(), "ok", "seed-a");

        let broken = tmp.path().join("deadbeef");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(CONFIG_NAME), "not json").unwrap();

        let configs = Config::load_all_in(tmp.path());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "ok");
    }
}
