//! Integration tests over the library surface. Everything here runs
//! unprivileged against temp directories; the kernel-facing paths are
//! exercised on a real host.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use m_docker::cgroup::v2::controllers;
use m_docker::cli::RunArgs;
use m_docker::config::{Config, ContainerStatus, Resources};
use m_docker::error::RuntimeError;

fn run_args(name: &str) -> RunArgs {
    RunArgs {
        name: Some(name.to_string()),
        command: vec!["/bin/echo".to_string(), "hello".to_string()],
        ..Default::default()
    }
}

/// Point a fresh config's state dir into a temp root and persist it.
fn record_under(state_root: &Path, args: &RunArgs) -> Config {
    let mut config = Config::from_run_args(args).unwrap();
    config.state_dir = state_root.join(&config.id).display().to_string();
    config.record().unwrap();

    config
}

#[test]
fn config_round_trips_through_json() {
    let root = TempDir::new().unwrap();

    let mut args = run_args("round_trip");
    args.volumes = vec!["/tmp/hostdir:/data".to_string()];
    args.mem = Some("100m".to_string());
    args.cpu = Some(0.25);

    let config = record_under(root.path(), &args);
    let loaded = Config::load_from_state_dir(Path::new(&config.state_dir)).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.cgroup.resources.cpu_quota_us, 25_000);
}

#[test]
fn conflicting_tty_and_detach_is_a_config_error() {
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
fn malformed_volume_is_a_config_error() {
    for spec in ["a", ":b", "a:", "a:b:c"] {
        let mut args = run_args("vols");
        args.volumes = vec![spec.to_string()];

        assert!(
            matches!(
                Config::from_run_args(&args),
                Err(RuntimeError::ConfigError { .. })
            ),
            "volume spec {:?} should be rejected",
            spec
        );
    }
}

#[test]
fn identical_inputs_produce_identical_ids() {
    let a = Config::from_run_args(&run_args("same")).unwrap();
    let b = Config::from_run_args(&run_args("same")).unwrap();

    // The id hashes name and creation time and nothing else.
    if a.created_time == b.created_time {
        assert_eq!(a.id, b.id);
    } else {
        assert_ne!(a.id, b.id);
    }

    assert_eq!(a.id.len(), 64);
    assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn resolution_prefers_names_then_unique_prefixes() {
    let root = TempDir::new().unwrap();

    let web = record_under(root.path(), &run_args("web"));
    let db = record_under(root.path(), &run_args("db"));

    assert_eq!(
        Config::resolve_id_in(root.path(), "web").unwrap(),
        web.id
    );
    assert_eq!(
        Config::resolve_id_in(root.path(), &db.id[..16]).unwrap(),
        db.id
    );
    assert!(matches!(
        Config::resolve_id_in(root.path(), "missing"),
        Err(RuntimeError::NotFound { .. })
    ));
}

#[test]
fn deleting_state_forgets_the_container() {
    let root = TempDir::new().unwrap();

    let config = record_under(root.path(), &run_args("ephemeral"));
    assert!(Path::new(&config.state_dir).exists());

    config.delete_state();
    assert!(!Path::new(&config.state_dir).exists());
    assert!(matches!(
        Config::resolve_id_in(root.path(), "ephemeral"),
        Err(RuntimeError::NotFound { .. })
    ));
}

#[test]
fn exec_style_overrides_leave_the_recorded_config_alone() {
    let root = TempDir::new().unwrap();

    let config = record_under(root.path(), &run_args("target"));
    let on_disk_before = fs::read(Path::new(&config.state_dir).join("config.json")).unwrap();

    // What exec does: load, rewrite transient fields, never record.
    let mut session = Config::load_from_state_dir(Path::new(&config.state_dir)).unwrap();
    session.cmd = vec!["/bin/echo".to_string(), "inside".to_string()];
    session.state_dir = "/tmp/m-docker/does-not-matter".to_string();
    session.env.push("SETNS_PID=1234".to_string());

    let on_disk_after = fs::read(Path::new(&config.state_dir).join("config.json")).unwrap();
    assert_eq!(on_disk_before, on_disk_after);
}

#[test]
fn new_configs_start_created_with_no_pid() {
    let config = Config::from_run_args(&run_args("fresh")).unwrap();

    assert_eq!(config.status, ContainerStatus::Created);
    assert_eq!(config.pid, 0);
    assert!(!config.status.is_running());
}

#[test]
fn controllers_write_the_documented_file_formats() {
    let scope = TempDir::new().unwrap();

    let limited = Resources {
        memory: "100m".to_string(),
        cpu_period_us: 100_000,
        cpu_quota_us: 50_000,
    };
    for controller in controllers() {
        controller.set(scope.path(), &limited).unwrap();
    }
    assert_eq!(
        fs::read_to_string(scope.path().join("cpu.max")).unwrap(),
        "50000 100000"
    );
    assert_eq!(
        fs::read_to_string(scope.path().join("memory.max")).unwrap(),
        "100m"
    );

    let unlimited = Resources {
        memory: "max".to_string(),
        cpu_period_us: 100_000,
        cpu_quota_us: 0,
    };
    for controller in controllers() {
        controller.set(scope.path(), &unlimited).unwrap();
    }
    assert_eq!(
        fs::read_to_string(scope.path().join("cpu.max")).unwrap(),
        "max 100000"
    );
    assert_eq!(
        fs::read_to_string(scope.path().join("memory.max")).unwrap(),
        "max"
    );
}
