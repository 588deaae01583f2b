use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum VfsError {
    #[snafu(display("Failed to create filesystem worker pool"))]
    DispatcherError { source: std::io::Error },
    #[snafu(display("Failed to dispatch filesystem request {}: {}", request, error))]
    DispatchError { request: String, error: String },
    #[snafu(display("Failed to start filesystem watcher"))]
    WatcherError { source: notify::Error },
    #[snafu(display("Filesystem replies stopped while the project still waits for some"))]
    RepliesEnded,
}
