use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod exercise;
pub mod ops;
pub mod version;

/// Largest payload `exercise` will push through the demo server.
pub const MAX_EXERCISE_SIZE: usize = remoteio::demo::MAX_FILE_SIZE;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write, seek and read back a file on the in-process demo server.
    Exercise(ExerciseArgs),
    /// List protocol op codes.
    Ops(OpsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Exercise(args) => exercise::run(args, format),
        Command::Ops(args) => ops::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ExerciseArgs {
    /// Bytes to write and read back.
    #[arg(long, default_value_t = 20_480)]
    pub size: usize,
    /// Open in describe mode instead of pipelining.
    #[arg(long)]
    pub describe: bool,
    /// File name on the demo server.
    #[arg(long, default_value = "exercise.bin")]
    pub path: String,
}

#[derive(Args, Debug, Default)]
pub struct OpsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
