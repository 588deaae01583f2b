use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::disc::disc::{
    DuplicateSourceSnafu, EmptyProjectSnafu, UnknownSourceSnafu, UnsupportedSourceSnafu,
};
use crate::disc::{AudioTrack, DiscError, DiscTrait, SessionParams, Track};
use crate::project::uri::FILE_SCHEME;

/// An ordered list of local audio files.
#[derive(Debug, Default)]
pub struct AudioDisc {
    sources: Vec<String>,
    params: SessionParams,
}

impl AudioDisc {
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    fn index_of(&self, uri: &str) -> Option<usize> {
        self.sources.iter().position(|source| source == uri)
    }
}

impl DiscTrait for AudioDisc {
    fn add_source(&mut self, uri: &str, position: Option<&str>) -> Result<(), DiscError> {
        ensure!(uri.starts_with(FILE_SCHEME), UnsupportedSourceSnafu { uri });
        ensure!(self.index_of(uri).is_none(), DuplicateSourceSnafu { uri });

        let index = match position {
            Some(after) => self.index_of(after).context(UnknownSourceSnafu { uri: after })? + 1,
            None => self.sources.len(),
        };
        debug!("Adding audio source {} at position {}", uri, index);
        self.sources.insert(index, uri.to_string());
        Ok(())
    }

    fn delete_selected(&mut self, selection: &[String]) -> Result<(), DiscError> {
        for uri in selection {
            let index = self.index_of(uri).context(UnknownSourceSnafu { uri })?;
            self.sources.remove(index);
        }
        Ok(())
    }

    fn get_track(&self) -> Result<Track, DiscError> {
        ensure!(!self.is_empty(), EmptyProjectSnafu);
        Ok(Track::Audio(AudioTrack {
            title: self.params.label.clone(),
            sources: self.sources.clone(),
        }))
    }

    fn set_session_params(&mut self, params: SessionParams) {
        self.params = params;
    }

    fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_keep_their_order() {
        let mut disc = AudioDisc::default();
        disc.add_source("file:///m/1.flac", None).expect("add should succeed");
        disc.add_source("file:///m/3.flac", None).expect("add should succeed");
        disc.add_source("file:///m/2.flac", Some("file:///m/1.flac"))
            .expect("add should succeed");
        assert_eq!(
            disc.sources(),
            ["file:///m/1.flac", "file:///m/2.flac", "file:///m/3.flac"]
        );

        disc.delete_selected(&["file:///m/1.flac".to_string()])
            .expect("delete should succeed");
        let Ok(Track::Audio(track)) = disc.get_track() else {
            panic!("expected an audio track");
        };
        assert_eq!(track.sources, ["file:///m/2.flac", "file:///m/3.flac"]);
    }

    #[test]
    fn bad_sources_are_rejected() {
        let mut disc = AudioDisc::default();
        disc.add_source("file:///m/1.flac", None).expect("add should succeed");
        assert!(matches!(
            disc.add_source("file:///m/1.flac", None),
            Err(DiscError::DuplicateSource { .. })
        ));
        assert!(matches!(
            disc.add_source("http://host/2.flac", None),
            Err(DiscError::UnsupportedSource { .. })
        ));
        assert!(matches!(
            disc.add_source("file:///m/2.flac", Some("file:///m/none.flac")),
            Err(DiscError::UnknownSource { .. })
        ));
        assert!(matches!(
            disc.delete_selected(&["file:///m/none.flac".to_string()]),
            Err(DiscError::UnknownSource { .. })
        ));
    }
}
