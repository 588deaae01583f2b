mod descriptor;
mod directory;
mod error;
mod vol_file;
mod volume;

pub use descriptor::{
    PrimaryDescriptor, RECOGNIZED_TAGS, VolumeDescriptor, read_primary_volume_descriptor,
    read_volume_descriptor,
};
pub use error::VolumeError;
pub use vol_file::VolFile;
pub use volume::{ReadOptions, Volume, read_volume};
