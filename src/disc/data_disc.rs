use snafu::{ResultExt, ensure};
use tracing::info;

use crate::disc::disc::{EmptyProjectSnafu, NotReadySnafu, ProjectSnafu};
use crate::disc::{DataTrack, DiscError, DiscTrait, SessionParams, Track};
use crate::project::DataProject;

/// A data disc built over the overlay project.
pub struct DataDisc {
    project: DataProject,
    params: SessionParams,
}

impl DataDisc {
    pub fn new(project: DataProject) -> Self {
        Self {
            project,
            params: SessionParams::default(),
        }
    }

    pub fn project(&self) -> &DataProject {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut DataProject {
        &mut self.project
    }
}

impl DiscTrait for DataDisc {
    fn add_source(&mut self, uri: &str, position: Option<&str>) -> Result<(), DiscError> {
        self.project
            .add_uri(uri, position.unwrap_or("/"))
            .context(ProjectSnafu)?;
        Ok(())
    }

    fn delete_selected(&mut self, selection: &[String]) -> Result<(), DiscError> {
        for path in selection {
            self.project.remove_path(path).context(ProjectSnafu)?;
        }
        Ok(())
    }

    fn get_track(&self) -> Result<Track, DiscError> {
        ensure!(!self.is_empty(), EmptyProjectSnafu);
        ensure!(!self.project.has_pending_work(), NotReadySnafu);

        Ok(Track::Data(DataTrack {
            label: self.params.label.clone(),
            grafts: self.project.graft_list(),
            excluded: self.project.excluded_list(),
            joliet_names: if self.params.joliet {
                self.project.joliet_names()
            } else {
                Vec::new()
            },
            sectors: self.project.sectors(),
            imported_sectors: self.project.imported_sectors(),
            joliet: self.params.joliet,
        }))
    }

    fn set_session_params(&mut self, params: SessionParams) {
        if !params.multisession && self.params.multisession {
            info!("Dropping the previous sessions from the project");
            self.project.clear_imported();
        }
        self.params = params;
    }

    fn is_empty(&self) -> bool {
        self.project.is_empty()
    }
}
