use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Lists the files of an ISO9660 image
    Inspect {
        image: PathBuf,
        /// First sector of the session to read
        #[clap(long, default_value_t = 0)]
        session_start: u64,
        /// Read the Joliet names when the image has them
        #[clap(long)]
        joliet: bool,
    },
    /// Resolves a data project described in YAML against the filesystem
    Project {
        file: PathBuf,
        /// Where to save the resolved project
        #[clap(long)]
        save: Option<PathBuf>,
        /// Keep following filesystem changes for this many seconds
        #[clap(long, value_name = "SECONDS")]
        watch: Option<u64>,
        /// Image of a previous session to append to
        #[clap(long)]
        import: Option<PathBuf>,
    },
    /// Loads a saved project and resolves it against the filesystem
    Load { snapshot: PathBuf },
}
