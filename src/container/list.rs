//! `ps` and `logs`.

use std::fs;
use std::io::Write;

use log::debug;
use tabwriter::TabWriter;

use crate::config::Config;
use crate::error::{Result, RuntimeError};

/// Print one row per container known to the state root.
pub fn list_containers() -> Result<()> {
    let configs = Config::load_all();
    debug!("Listing {} containers", configs.len());

    let mut tw = TabWriter::new(vec![]);
    let _ = tw.write_all(b"CONTAINER ID\tPID\tCOMMAND\tCREATED\tSTATUS\tNAME\n");

    for config in &configs {
        let _ = writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{:?}\t{}",
            config.id.get(..12).unwrap_or(&config.id),
            config.pid,
            config.cmd.join(" "),
            config.created_time,
            config.status,
            config.name,
        );
    }

    let _ = tw.flush();

    let output = String::from_utf8(tw.into_inner().unwrap()).unwrap();
    print!("{}", output);

    Ok(())
}

/// Dump a container's captured stdout/stderr as-is.
pub fn show_logs(container: &str) -> Result<()> {
    let id = Config::resolve_id(container)?;
    let config = Config::load_from_id(&id)?;

    let logs =
        fs::read_to_string(&config.log_path).map_err(|e| RuntimeError::io(&config.log_path, e))?;
    print!("{}", logs);

    Ok(())
}
