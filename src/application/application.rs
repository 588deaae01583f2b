use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use compio::dispatcher::DispatcherBuilder;
use discgraft::config::{ConfigError, ProjectConfig};
use discgraft::disc::{DataDisc, DiscError, DiscTrait, SessionParams};
use discgraft::ext::BestEffortPathExt;
use discgraft::iso9660::{ReadOptions, Volume, VolumeError, read_volume};
use discgraft::project::{DataProject, FilterConfig, ProjectSnapshot, SnapshotError};
use discgraft::vfs::{LocalVfs, Monitor, NotifyMonitor, NullMonitor, VfsError, drive, inputs};
use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::application::RuntimeConfig;
use crate::application::report;

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        debug!("Running {:?}", app_config);
        report::setup_colors();

        match app_config {
            RuntimeConfig::Inspect { image, options } => {
                let volume = read_image(image, options).await?;
                report::print(report::volume_lines(&volume));
            }
            RuntimeConfig::Project {
                file,
                save,
                watch,
                import,
            } => {
                let config = ProjectConfig::from_path(&file).await.context(ConfigSnafu)?;
                let previous = match import {
                    Some(image) => Some(read_image(image, ReadOptions::default()).await?),
                    None => None,
                };
                let disc = resolve(&config.to_snapshot(), config.filters, watch, previous).await?;
                if let Some(path) = save {
                    save_project(&disc, &config.label, &path).await?;
                }
            }
            RuntimeConfig::Load { snapshot } => {
                let snapshot = ProjectSnapshot::read(&snapshot)
                    .await
                    .context(SnapshotSnafu)?;
                resolve(&snapshot, FilterConfig::default(), None, None).await?;
            }
        }
        Ok(())
    }
}

/// Reads the volume of an image on a worker thread.
async fn read_image(image: PathBuf, options: ReadOptions) -> Result<Volume, ApplicationError> {
    let dispatcher = DispatcherBuilder::new()
        .worker_threads(NonZeroUsize::MIN)
        .build()
        .context(DispatcherSnafu)?;

    let path = image.best_effort_path_display();
    let receiver = dispatcher
        .dispatch(move || async move {
            let file = File::open(&image).context(OpenImageSnafu {
                path: image.best_effort_path_display(),
            })?;
            read_volume(&mut BufReader::new(file), options).context(VolumeSnafu {
                path: image.best_effort_path_display(),
            })
        })
        .map_err(|e| ApplicationError::DispatchError {
            path: path.clone(),
            error: e.to_string(),
        })?;

    let volume = receiver.await.context(CanceledSnafu { path })??;
    info!("Read volume '{}'", volume.label);
    Ok(volume)
}

/// Loads `snapshot` into a fresh data disc and resolves it against the
/// filesystem, printing what got filtered and the resulting track.
async fn resolve(
    snapshot: &ProjectSnapshot,
    filters: FilterConfig,
    watch: Option<Duration>,
    previous: Option<Volume>,
) -> Result<DataDisc, ApplicationError> {
    let (monitor, events): (Box<dyn Monitor>, _) = match watch {
        Some(_) => {
            let (monitor, events) = NotifyMonitor::new().context(VfsSnafu)?;
            (Box::new(monitor), Some(events))
        }
        None => (Box::new(NullMonitor), None),
    };

    let mut disc = DataDisc::new(DataProject::new(filters, monitor));
    disc.set_session_params(SessionParams {
        label: snapshot.label.clone(),
        multisession: previous.is_some(),
        ..SessionParams::default()
    });
    disc.project_mut().load_snapshot(snapshot);
    if let Some(volume) = &previous {
        disc.project_mut().import_session(&volume.root);
    }

    let (vfs, replies) = LocalVfs::new().context(VfsSnafu)?;
    let mut inputs = inputs(replies, events);
    let watch_until = watch.map(|duration| Instant::now() + duration);
    drive(disc.project_mut(), &vfs, &mut inputs, watch_until)
        .await
        .context(VfsSnafu)?;

    report::print(report::notice_lines(&disc.project_mut().take_notices()));
    let track = disc.get_track().context(DiscSnafu)?;
    report::print(report::track_lines(&track));
    Ok(disc)
}

async fn save_project(disc: &DataDisc, label: &str, path: &Path) -> Result<(), ApplicationError> {
    disc.project()
        .snapshot(label)
        .write(path)
        .await
        .context(SnapshotSnafu)?;
    info!("Saved project to {}", path.best_effort_path_display());
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while reading the project file"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Critical failure encountered while saving or loading the project"))]
    SnapshotError { source: SnapshotError },
    #[snafu(display("Critical failure encountered in the filesystem backend"))]
    VfsError { source: VfsError },
    #[snafu(display("The project can't be turned into a track"))]
    DiscError { source: DiscError },
    #[snafu(display("Failed to create the image reader"))]
    DispatcherError { source: std::io::Error },
    #[snafu(display("Failed to dispatch the read of {}: {}", path, error))]
    DispatchError { path: String, error: String },
    #[snafu(display("The read of {} got cancelled", path))]
    CanceledError {
        path: String,
        source: futures_channel::oneshot::Canceled,
    },
    #[snafu(display("Failed to open image {}", path))]
    OpenImageError {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read the volume of {}", path))]
    VolumeError { path: String, source: VolumeError },
}
