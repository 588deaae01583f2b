//! What the project hands to the session builder and to project files.

use tracing::{debug, info, warn};

use crate::iso9660::VolFile;
use crate::project::data_project::{DataProject, ImportedEntry};
use crate::project::filter::FilterStatus;
use crate::project::graft::{GraftPoint, GraftTarget};
use crate::project::snapshot::ProjectSnapshot;
use crate::project::uri;

impl DataProject {
    /// Graft points in the order they were made.
    pub fn graft_list(&self) -> Vec<GraftPoint> {
        self.grafts
            .iter()
            .map(|(path, target)| GraftPoint {
                path: path.to_string(),
                target: target.clone(),
            })
            .collect()
    }

    /// URIs kept off the disc: exclusions plus filtered objects that were
    /// not restored, sorted.
    pub fn excluded_list(&self) -> Vec<String> {
        let mut excluded = self
            .exclusions
            .uris()
            .chain(self.filters.unreadable().map(|(uri, _)| uri))
            .map(str::to_string)
            .collect::<Vec<_>>();
        excluded.sort();
        excluded.dedup();
        excluded
    }

    pub fn restored_list(&self) -> Vec<(String, FilterStatus)> {
        let mut restored = self
            .filters
            .restored()
            .map(|(uri, status)| (uri.to_string(), status))
            .collect::<Vec<_>>();
        restored.sort();
        restored
    }

    /// Full virtual path → Joliet-compatible virtual path for every name
    /// longer than the Joliet limit. Shortened names stay clear of the
    /// siblings already in the project.
    pub fn joliet_names(&self) -> Vec<(String, String)> {
        self.joliet.disambiguate(|path| self.lookup(path).is_some())
    }

    /// Grafts the top-level entries of a previous session. Returns how many
    /// were imported; names already taken are skipped.
    pub fn import_session(&mut self, root: &VolFile) -> usize {
        let mut imported = 0;
        for file in root.children() {
            let path = uri::join("/", file.name());
            if self.lookup(&path).is_some() {
                warn!("Skipping imported {}, the name is already taken", path);
                continue;
            }
            self.add_graft(GraftTarget::Imported, &path);
            self.imported.insert(
                path,
                ImportedEntry {
                    sectors: file.sectors(),
                    is_dir: file.is_dir(),
                },
            );
            imported += 1;
        }
        info!("Imported {} entries from the previous session", imported);
        imported
    }

    pub fn imported_sectors(&self) -> i64 {
        self.imported.values().map(|imported| imported.sectors).sum()
    }

    pub fn clear_imported(&mut self) {
        let paths = self.imported.keys().cloned().collect::<Vec<_>>();
        for path in paths {
            self.remove_graft(&path);
        }
    }

    pub fn snapshot(&self, label: &str) -> ProjectSnapshot {
        ProjectSnapshot {
            label: label.to_string(),
            grafts: self.graft_list(),
            excluded: self.excluded_list(),
            restored: self.restored_list(),
        }
    }

    /// Replaces the project with a saved one. Filesystem grafts are
    /// completed as their metadata arrives; imported entries need the
    /// session again and are skipped.
    pub fn load_snapshot(&mut self, snapshot: &ProjectSnapshot) {
        self.reset();
        for graft in &snapshot.grafts {
            match &graft.target {
                GraftTarget::Filesystem(uri) => {
                    if self.add_graft(graft.target.clone(), &graft.path) {
                        self.stat_graft(uri, &graft.path);
                    }
                }
                GraftTarget::Created => {
                    self.add_graft(GraftTarget::Created, &graft.path);
                }
                GraftTarget::Imported => {
                    warn!("Skipping {}, it belongs to a previous session", graft.path)
                }
            }
        }

        for excluded in &snapshot.excluded {
            let grafts = self
                .grafts
                .iter()
                .filter(|(_, target)| {
                    target
                        .uri()
                        .is_some_and(|base| uri::is_strict_ancestor(base, excluded))
                })
                .map(|(path, _)| path.to_string())
                .collect::<Vec<_>>();
            let mut applied = false;
            for graft in grafts {
                applied |= self.exclusions.exclude(&graft, excluded);
            }
            if applied {
                self.measure_excluded(excluded);
            }
        }
        for (uri, status) in &snapshot.restored {
            self.filters.mark_restored(uri, *status);
        }
        debug!(
            "Loaded project '{}' with {} grafts",
            snapshot.label,
            snapshot.grafts.len()
        );
    }
}
