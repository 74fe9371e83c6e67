//! Writes file-kind artifacts into the session working directory.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::core::env_format::{is_env_filename, normalize_env};
use crate::core::filename::contain_path;
use crate::core::types::{Artifact, FileOutcome, FileStatus, IssueKind};
use crate::io::files::write_file;

/// Places artifacts relative to a working directory inside a project root.
#[derive(Debug, Clone)]
pub struct FileMaterializer<'a> {
    project_root: &'a Path,
    workdir: &'a Path,
}

impl<'a> FileMaterializer<'a> {
    pub fn new(project_root: &'a Path, workdir: &'a Path) -> Self {
        Self {
            project_root,
            workdir,
        }
    }

    /// Absolute target for `requested`, contained in the working directory.
    pub fn target_path(&self, requested: &str) -> PathBuf {
        self.workdir.join(self.contain(requested))
    }

    fn contain(&self, requested: &str) -> PathBuf {
        let prefix = self.workdir.strip_prefix(self.project_root).ok();
        let contained = contain_path(requested, prefix);
        if let Some(violation) = &contained.violation {
            warn!(requested, issue = ?IssueKind::PathContainmentViolation, "{violation}");
        }
        contained.relative
    }

    /// Write `artifact` under its inferred name.
    ///
    /// Env files are normalized to `KEY=VALUE` lines first. Write errors are
    /// reported in the outcome, never returned.
    #[instrument(skip_all, fields(filename = %filename))]
    pub fn materialize(&self, artifact: &Artifact, filename: &str) -> FileOutcome {
        let relative = self.contain(filename);
        let path = self.workdir.join(&relative);
        let shown = relative.to_string_lossy().into_owned();

        let content = if is_env_filename(&shown) {
            normalize_env(&artifact.content)
        } else {
            artifact.content.clone()
        };

        match write_file(&path, &content) {
            Ok(status) => {
                info!(path = %shown, ?status, "file written");
                FileOutcome {
                    path: shown,
                    status,
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    path = %shown,
                    err = %format!("{e:#}"),
                    issue = ?IssueKind::FileWriteFailed,
                    "file write failed"
                );
                FileOutcome {
                    path: shown,
                    status: FileStatus::Failed,
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }
}
