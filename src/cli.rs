use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "m-docker")]
#[command(about = "m-docker is a minimal container runtime implemented in Rust.")]
pub struct CLI {
    /// Enable verbose logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and run a container from the base image.
    Run(RunArgs),
    /// Run a command inside a running container.
    Exec(ExecArgs),
    /// List containers.
    PS,
    /// Fetch the logs of a container.
    Logs(LogsArgs),
    /// Container init process, do not call it from outside.
    #[command(hide = true)]
    Init,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Attach the container to the terminal (combines -i and -t).
    #[arg(long = "it")]
    pub tty: bool,

    /// Run the container in the background.
    #[arg(short, long)]
    pub detach: bool,

    /// Memory limit, written verbatim to memory.max (e.g. "100m").
    #[arg(long)]
    pub mem: Option<String>,

    /// CPU fraction, e.g. 0.5 for half a core.
    #[arg(long)]
    pub cpu: Option<f64>,

    /// Name of the container.
    #[arg(long)]
    pub name: Option<String>,

    /// Bind mount a host path into the container (SRC:DEST, repeatable).
    #[arg(short = 'v', long = "volume")]
    pub volumes: Vec<String>,

    /// Command to run in the container.
    #[arg(allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Attach the session to the terminal (combines -i and -t).
    #[arg(long = "it")]
    pub tty: bool,

    /// Run the command in the background.
    #[arg(short, long)]
    pub detach: bool,

    /// Container name, full ID, or unique ID prefix.
    #[arg(required = true)]
    pub container: String,

    /// Command to run inside the container.
    #[arg(allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Container name, full ID, or unique ID prefix.
    #[arg(required = true)]
    pub container: String,
}
