use std::process::exit;

use anyhow::Context;
use clap::Parser;
use log::error;

use m_docker::cli::{Commands, CLI};
use m_docker::container;

fn main() {
    let cli = CLI::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result: anyhow::Result<i32> = match &cli.command {
        Commands::Run(args) => container::run_container(args).context("failed to run container"),
        Commands::Exec(args) => {
            container::exec_container(args).context("failed to exec in container")
        }
        Commands::PS => container::list_containers()
            .map(|_| 0)
            .context("failed to list containers"),
        Commands::Logs(args) => container::show_logs(&args.container)
            .map(|_| 0)
            .context("failed to fetch logs"),
        Commands::Init => container::init_container()
            .map(|_| 0)
            .context("failed to init container"),
    };

    match result {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{:#}", e);
            exit(-1);
        }
    }
}
