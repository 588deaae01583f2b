use std::borrow::Cow;
use std::path::{Path, PathBuf};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

use crate::ext::BestEffortPathExt;
use crate::project::{FilterConfig, GraftPoint, GraftTarget, ProjectSnapshot, uri};

const CREATED: &str = "created";

/// What a graft of the project file points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraftSource {
    Path(PathBuf),
    Created,
}

/// A data project described in YAML:
///
/// ```yaml
/// label: Holidays
/// filters:
///   hidden: true
///   broken_symlinks: true
///   notify: false
/// grafts:
///   /photos: /home/user/photos
///   /empty: created
/// excluded:
///   - /home/user/photos/raw
/// ```
///
/// Relative filesystem paths are taken from the directory of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub label: String,
    pub filters: FilterConfig,
    pub grafts: Vec<(String, GraftSource)>,
    pub excluded: Vec<PathBuf>,
}

fn key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

/// Absolute directory holding the project file at `path`.
fn base_dir(path: &Path) -> std::io::Result<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::path::absolute(parent),
        _ => std::env::current_dir(),
    }
}

impl ProjectConfig {
    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading project file: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;

        let config: ProjectConfig = contents.as_str().try_into()?;
        let base = base_dir(path).context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        Ok(config.relative_to(&base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        for (_, source) in &mut self.grafts {
            if let GraftSource::Path(path) = source {
                *path = base.join(&*path);
            }
        }
        for path in &mut self.excluded {
            *path = base.join(&*path);
        }
        self
    }

    /// The project as a snapshot, ready to be loaded into a project.
    pub fn to_snapshot(&self) -> ProjectSnapshot {
        let grafts = self
            .grafts
            .iter()
            .map(|(path, source)| GraftPoint {
                path: path.clone(),
                target: match source {
                    GraftSource::Path(file) => GraftTarget::Filesystem(uri::from_path(file)),
                    GraftSource::Created => GraftTarget::Created,
                },
            })
            .collect();
        ProjectSnapshot {
            label: self.label.clone(),
            grafts,
            excluded: self.excluded.iter().map(|path| uri::from_path(path)).collect(),
            restored: Vec::new(),
        }
    }

    fn parse_filters(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<FilterConfig, ConfigError> {
        let mut filters = FilterConfig::default();
        let Some(section) = top_level.get(&key("filters")) else {
            return Ok(filters);
        };
        let section = section
            .as_mapping()
            .context(InvalidSectionSnafu { section: "filters" })?;

        for (name, value) in section {
            let name = name.as_str().unwrap_or_default();
            let value = value
                .as_bool()
                .context(InvalidFilterSnafu { name })?;
            match name {
                "hidden" => filters.hidden = value,
                "broken_symlinks" => filters.broken_symlinks = value,
                "notify" => filters.notify = value,
                _ => return InvalidFilterSnafu { name }.fail(),
            }
        }
        Ok(filters)
    }

    fn parse_grafts(
        top_level: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Vec<(String, GraftSource)>, ConfigError> {
        let Some(section) = top_level.get(&key("grafts")) else {
            return Ok(Vec::new());
        };
        section
            .as_mapping()
            .context(InvalidSectionSnafu { section: "grafts" })?
            .iter()
            .map(|(path, target)| {
                let path = path.as_str().context(InvalidGraftSnafu {
                    path: format!("{path:?}"),
                })?;
                ensure!(
                    path.starts_with('/') && !uri::is_root(path),
                    InvalidGraftSnafu { path }
                );
                let source = match target.as_str() {
                    Some(CREATED) => GraftSource::Created,
                    Some(file) => GraftSource::Path(PathBuf::from(file)),
                    None => return InvalidGraftSnafu { path }.fail(),
                };
                Ok((path.trim_end_matches('/').to_string(), source))
            })
            .collect()
    }

    fn parse_excluded(top_level: &LinkedHashMap<Yaml, Yaml>) -> Result<Vec<PathBuf>, ConfigError> {
        let Some(section) = top_level.get(&key("excluded")) else {
            return Ok(Vec::new());
        };
        Ok(section
            .as_sequence()
            .context(InvalidSectionSnafu { section: "excluded" })?
            .iter()
            .filter_map(|item| match item.as_str() {
                Some(path) => Some(PathBuf::from(path)),
                None => {
                    debug!("Skipping invalid excluded entry: {:?}", item);
                    None
                }
            })
            .collect())
    }
}

impl TryFrom<&str> for ProjectConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedConfigSnafu)?;
        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        let label = top_level
            .get(&key("label"))
            .and_then(|label| label.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(ProjectConfig {
            label,
            filters: Self::parse_filters(top_level)?,
            grafts: Self::parse_grafts(top_level)?,
            excluded: Self::parse_excluded(top_level)?,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the project file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("The project file is not UTF-8: {}", file_path))]
    EncodingError {
        file_path: String,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the project file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted project file"))]
    MalformedConfig,
    #[snafu(display("Top level of the project file should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Section '{}' has the wrong shape", section))]
    InvalidSection { section: String },
    #[snafu(display("Unknown or non-boolean filter '{}'", name))]
    InvalidFilter { name: String },
    #[snafu(display("Graft '{}' needs an absolute disc path and a file path or 'created'", path))]
    InvalidGraft { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
label: Holidays
filters:
  hidden: false
  notify: false
grafts:
  /photos: /home/u/photos
  /pictures/best/: /home/u/best
  /empty: created
excluded:
  - /home/u/photos/raw
"#;

    #[test]
    fn projects_are_parsed() {
        let config: ProjectConfig = PROJECT.try_into().expect("project should parse");
        assert_eq!(config.label, "Holidays");
        assert_eq!(
            config.filters,
            FilterConfig {
                hidden: false,
                broken_symlinks: true,
                notify: false,
            }
        );
        assert_eq!(
            config.grafts,
            vec![
                ("/photos".into(), GraftSource::Path("/home/u/photos".into())),
                ("/pictures/best".into(), GraftSource::Path("/home/u/best".into())),
                ("/empty".into(), GraftSource::Created),
            ]
        );
        assert_eq!(config.excluded, vec![PathBuf::from("/home/u/photos/raw")]);
    }

    #[test]
    fn snapshots_carry_uris() {
        let config: ProjectConfig = PROJECT.try_into().expect("project should parse");
        let snapshot = config.to_snapshot();
        assert_eq!(snapshot.label, "Holidays");
        assert_eq!(
            snapshot.grafts[0].target,
            GraftTarget::Filesystem("file:///home/u/photos".into())
        );
        assert_eq!(snapshot.excluded, vec!["file:///home/u/photos/raw"]);
    }

    #[test]
    fn missing_sections_default() {
        let config: ProjectConfig = "label: Empty".try_into().expect("project should parse");
        assert_eq!(config.filters, FilterConfig::default());
        assert!(config.grafts.is_empty());
        assert!(config.excluded.is_empty());
    }

    #[rstest]
    #[case("", "MalformedConfig")]
    #[case("- item1\n- item2", "TopLevelNotMap")]
    #[case("just a string", "TopLevelNotMap")]
    #[case("invalid: yaml: content: [unclosed", "ParseError")]
    #[case("grafts:\n  - /a", "InvalidSection")]
    #[case("filters:\n  colour: true", "InvalidFilter")]
    #[case("filters:\n  hidden: maybe", "InvalidFilter")]
    #[case("grafts:\n  relative: /home/u", "InvalidGraft")]
    #[case("grafts:\n  /: /home/u", "InvalidGraft")]
    #[case("grafts:\n  /a: 3", "InvalidGraft")]
    fn bad_projects_are_rejected(#[case] contents: &str, #[case] expected: &str) {
        let result: Result<ProjectConfig, _> = contents.try_into();
        let error = result.expect_err("project should be rejected");
        assert!(
            format!("{error:?}").starts_with(expected),
            "{error:?} is not {expected}"
        );
    }

    #[compio::test]
    async fn relative_paths_follow_the_project_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("project.yaml");
        std::fs::write(&path, "grafts:\n  /docs: docs\nexcluded:\n  - docs/old\n")
            .expect("Failed to write project file");

        let config = ProjectConfig::from_path(&path)
            .await
            .expect("project should load");
        assert_eq!(
            config.grafts,
            vec![("/docs".into(), GraftSource::Path(dir.path().join("docs")))]
        );
        assert_eq!(config.excluded, vec![dir.path().join("docs/old")]);
    }

    #[test]
    fn bare_file_names_resolve_from_the_working_directory() {
        let cwd = std::env::current_dir().expect("working directory should exist");
        let base = base_dir(Path::new("holidays.yaml")).expect("base should resolve");
        assert_eq!(base, cwd);

        let config: ProjectConfig = "grafts:\n  /photos: photos\n"
            .try_into()
            .expect("project should parse");
        let snapshot = config.relative_to(&base).to_snapshot();
        assert_eq!(
            snapshot.grafts[0].target,
            GraftTarget::Filesystem(uri::from_path(&cwd.join("photos")))
        );
        assert_ne!(
            snapshot.grafts[0].target,
            GraftTarget::Filesystem("file:///photos".into())
        );
    }

    #[compio::test]
    async fn missing_files_fail_to_read() {
        let result = ProjectConfig::from_path(Path::new("nonexistent.yaml")).await;
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
