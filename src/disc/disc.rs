use snafu::Snafu;

use crate::disc::{AudioDisc, DataDisc, SessionParams, Track};
use crate::project::ProjectError;

/// Operations shared by every kind of disc project.
pub trait DiscTrait {
    /// Adds the object at `uri`. `position` is a virtual directory for data
    /// discs and the source to insert after for audio discs.
    fn add_source(&mut self, uri: &str, position: Option<&str>) -> Result<(), DiscError>;
    fn delete_selected(&mut self, selection: &[String]) -> Result<(), DiscError>;
    fn get_track(&self) -> Result<Track, DiscError>;
    fn set_session_params(&mut self, params: SessionParams);
    fn is_empty(&self) -> bool;
}

pub enum Disc {
    Data(DataDisc),
    Audio(AudioDisc),
}

impl DiscTrait for Disc {
    fn add_source(&mut self, uri: &str, position: Option<&str>) -> Result<(), DiscError> {
        match self {
            Disc::Data(disc) => disc.add_source(uri, position),
            Disc::Audio(disc) => disc.add_source(uri, position),
        }
    }

    fn delete_selected(&mut self, selection: &[String]) -> Result<(), DiscError> {
        match self {
            Disc::Data(disc) => disc.delete_selected(selection),
            Disc::Audio(disc) => disc.delete_selected(selection),
        }
    }

    fn get_track(&self) -> Result<Track, DiscError> {
        match self {
            Disc::Data(disc) => disc.get_track(),
            Disc::Audio(disc) => disc.get_track(),
        }
    }

    fn set_session_params(&mut self, params: SessionParams) {
        match self {
            Disc::Data(disc) => disc.set_session_params(params),
            Disc::Audio(disc) => disc.set_session_params(params),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Disc::Data(disc) => disc.is_empty(),
            Disc::Audio(disc) => disc.is_empty(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum DiscError {
    #[snafu(display("Failed to edit the data project"))]
    ProjectError { source: ProjectError },
    #[snafu(display("The project is empty"))]
    EmptyProject,
    #[snafu(display("The project is still waiting for the filesystem"))]
    NotReady,
    #[snafu(display("{uri} is not a local file"))]
    UnsupportedSource { uri: String },
    #[snafu(display("{uri} is already part of the project"))]
    DuplicateSource { uri: String },
    #[snafu(display("{uri} is not part of the project"))]
    UnknownSource { uri: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::NullMonitor;
    use rstest::rstest;

    fn data() -> Disc {
        Disc::Data(DataDisc::new(
            crate::project::DataProject::new(Default::default(), Box::new(NullMonitor)),
        ))
    }

    fn audio() -> Disc {
        Disc::Audio(AudioDisc::default())
    }

    #[rstest]
    #[case(data())]
    #[case(audio())]
    fn new_discs_have_no_track(#[case] disc: Disc) {
        assert!(disc.is_empty());
        assert!(matches!(disc.get_track(), Err(DiscError::EmptyProject)));
    }
}
