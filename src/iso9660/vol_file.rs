use crate::vfs::bytes_to_sectors;

/// A node of the file tree of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolFile {
    File {
        name: String,
        size_bytes: u64,
        start_sector: u32,
    },
    Directory {
        name: String,
        children: Vec<VolFile>,
    },
}

impl VolFile {
    pub fn name(&self) -> &str {
        match self {
            VolFile::File { name, .. } | VolFile::Directory { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, VolFile::Directory { .. })
    }

    pub fn children(&self) -> &[VolFile] {
        match self {
            VolFile::Directory { children, .. } => children,
            VolFile::File { .. } => &[],
        }
    }

    /// Sectors taken by the content, each file rounded up on its own.
    pub fn sectors(&self) -> i64 {
        match self {
            VolFile::File { size_bytes, .. } => bytes_to_sectors(*size_bytes),
            VolFile::Directory { children, .. } => children.iter().map(VolFile::sectors).sum(),
        }
    }

    /// Finds a descendant by its slash-separated path relative to `self`.
    pub fn find(&self, path: &str) -> Option<&VolFile> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |current, segment| {
                current.children().iter().find(|child| child.name() == segment)
            })
    }

    /// Every node below `self` with its path, parents before children.
    pub fn walk(&self) -> Vec<(String, &VolFile)> {
        let mut found = Vec::new();
        let mut pending = vec![(String::new(), self)];
        while let Some((path, node)) = pending.pop() {
            for child in node.children().iter().rev() {
                pending.push((format!("{}/{}", path, child.name()), child));
            }
            if !path.is_empty() {
                found.push((path, node));
            }
        }
        found
    }
}
