use crate::project::GraftPoint;

/// Session-wide settings chosen before burning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub label: String,
    /// Keep the previous sessions of an appendable disc.
    pub multisession: bool,
    pub joliet: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            label: String::new(),
            multisession: false,
            joliet: true,
        }
    }
}

/// Everything the image builder needs to lay out a data track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTrack {
    pub label: String,
    pub grafts: Vec<GraftPoint>,
    pub excluded: Vec<String>,
    /// Full virtual path to its Joliet-compatible rendition.
    pub joliet_names: Vec<(String, String)>,
    pub sectors: i64,
    /// Sectors of the previous sessions kept on the disc.
    pub imported_sectors: i64,
    pub joliet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub title: String,
    /// Source URIs in playing order.
    pub sources: Vec<String>,
}

/// What a disc project hands to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Track {
    Data(DataTrack),
    Audio(AudioTrack),
}
