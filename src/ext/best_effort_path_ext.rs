use std::path::{Component, Path, PathBuf};

use crate::project::uri;

/// Display form for log lines and error messages: the canonical path when
/// it exists, the lexically normalized absolute path otherwise.
pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl BestEffortPathExt for Path {
    fn best_effort_path_display(&self) -> String {
        if let Ok(canonical) = self.canonicalize() {
            return canonical.display().to_string();
        }
        let absolute = std::path::absolute(self).unwrap_or_else(|_| self.to_path_buf());
        normalize(&absolute).display().to_string()
    }
}

impl BestEffortPathExt for PathBuf {
    fn best_effort_path_display(&self) -> String {
        self.as_path().best_effort_path_display()
    }
}

/// File URIs are shown as the path they stand for.
impl BestEffortPathExt for str {
    fn best_effort_path_display(&self) -> String {
        if self.starts_with(uri::FILE_SCHEME) {
            uri::to_path(self).display().to_string()
        } else {
            Path::new(self).best_effort_path_display()
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
