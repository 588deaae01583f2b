mod driver;
mod error;
mod local;
mod monitor;
mod types;

#[cfg(test)]
pub mod memory;

pub use driver::{VfsInput, drive, inputs};
pub use error::VfsError;
pub use local::LocalVfs;
pub use monitor::{Monitor, NotifyMonitor, NullMonitor};
pub use types::*;
