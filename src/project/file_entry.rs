use std::collections::HashMap;

use crate::vfs::WatchHandle;

/// Exploration state of a tracked directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirState {
    #[default]
    New,
    NotExplored,
    Exploring,
    Explored,
    /// Explored and shown unfolded by the presentation layer.
    Expanded,
}

impl DirState {
    pub fn is_explored(self) -> bool {
        matches!(self, DirState::Explored | DirState::Expanded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    File,
    Directory,
}

/// An ordinary listing entry of an explored directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child {
    pub kind: ChildKind,
    pub sectors: i64,
}

/// A filesystem object known to the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub uri: String,
    /// Size in sectors; negative for a dummy directory that only holds a watch.
    pub sectors: i64,
    /// Graft points whose targets live directly in this directory.
    pub refs: u32,
    pub monitor: Option<WatchHandle>,
    pub is_dir: bool,
    pub state: DirState,
    /// Escaped name → ordinary child, filled once explored.
    pub children: HashMap<String, Child>,
    pub expand_on_explore: bool,
}

impl FileEntry {
    pub fn file(uri: impl Into<String>, sectors: i64) -> Self {
        Self {
            uri: uri.into(),
            sectors,
            refs: 0,
            monitor: None,
            is_dir: false,
            state: DirState::New,
            children: HashMap::new(),
            expand_on_explore: false,
        }
    }

    pub fn directory(uri: impl Into<String>, sectors: i64) -> Self {
        Self {
            is_dir: true,
            state: DirState::NotExplored,
            ..Self::file(uri, sectors)
        }
    }

    pub fn dummy(uri: impl Into<String>) -> Self {
        Self {
            is_dir: true,
            ..Self::file(uri, -1)
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.sectors < 0
    }

    /// Turns a dummy into real content, or content back into a dummy.
    pub fn set_content(&mut self, sectors: Option<i64>) {
        match sectors {
            Some(sectors) => {
                self.sectors = sectors;
                if self.state == DirState::New {
                    self.state = DirState::NotExplored;
                }
            }
            None => {
                self.sectors = -1;
                self.state = DirState::New;
                self.children.clear();
                self.expand_on_explore = false;
            }
        }
    }

    pub fn children_sectors(&self) -> i64 {
        self.children.values().map(|child| child.sectors).sum()
    }
}
