use std::path::PathBuf;
use std::time::Duration;

use discgraft::iso9660::ReadOptions;

use crate::cli::{Cli, Command};

/// What one run of the application does.
#[derive(Debug, Clone)]
pub enum RuntimeConfig {
    Inspect {
        image: PathBuf,
        options: ReadOptions,
    },
    Project {
        file: PathBuf,
        save: Option<PathBuf>,
        watch: Option<Duration>,
        import: Option<PathBuf>,
    },
    Load {
        snapshot: PathBuf,
    },
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        match cli.command {
            Command::Inspect {
                image,
                session_start,
                joliet,
            } => RuntimeConfig::Inspect {
                image,
                options: ReadOptions {
                    session_start,
                    joliet,
                },
            },
            Command::Project {
                file,
                save,
                watch,
                import,
            } => RuntimeConfig::Project {
                file,
                save,
                watch: watch.map(Duration::from_secs),
                import,
            },
            Command::Load { snapshot } => RuntimeConfig::Load { snapshot },
        }
    }
}
