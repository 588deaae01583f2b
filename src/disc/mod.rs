mod audio_disc;
mod data_disc;
mod disc;
mod track;

pub use audio_disc::AudioDisc;
pub use data_disc::DataDisc;
pub use disc::{Disc, DiscError, DiscTrait};
pub use track::{AudioTrack, DataTrack, SessionParams, Track};
