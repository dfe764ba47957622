//! Guarded file mutations.
//!
//! Operations are staged first: staging runs the guard and the blacklist and
//! records the resolved target. Nothing touches the disk until
//! [`FileWriter::apply`]. Each applied operation is atomic on its own; creates
//! and updates go through a sibling temp file and a rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::blacklist::Blacklist;
use crate::core::path::display_relative;
use crate::core::sandbox::{Guard, Violation, WriteKind};
use crate::tools::ToolFailure;

/// A requested change, with a root-relative or absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub path: PathBuf,
    pub kind: WriteKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    Created,
    Updated,
    Deleted,
    /// Delete of a file that was already gone.
    Skipped,
    /// Dry run: would have been applied.
    Planned,
}

/// What happened to one staged operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub kind: WriteKind,
    pub outcome: ChangeOutcome,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Denied(#[from] Violation),
    #[error("{path} is blacklisted")]
    Blacklisted { path: String },
    #[error("cannot update {path}: file does not exist")]
    Missing { path: String },
    #[error("{path} is not a regular file")]
    NotAFile { path: String },
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl From<WriteError> for ToolFailure {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Denied(violation) => violation.into(),
            WriteError::Blacklisted { path } => ToolFailure::Blacklisted { path },
            WriteError::Missing { path } => ToolFailure::NotFound { path },
            WriteError::NotAFile { path } => ToolFailure::NotAFile { path },
            WriteError::Io { path, source } => ToolFailure::Io {
                path,
                message: source.to_string(),
            },
        }
    }
}

#[derive(Debug)]
struct Staged {
    target: PathBuf,
    relative: String,
    kind: WriteKind,
    content: String,
}

pub struct FileWriter<'a> {
    guard: &'a Guard,
    blacklist: &'a Blacklist,
    staged: Vec<Staged>,
}

impl<'a> FileWriter<'a> {
    pub fn new(guard: &'a Guard, blacklist: &'a Blacklist) -> Self {
        Self {
            guard,
            blacklist,
            staged: Vec::new(),
        }
    }

    /// Authorize `op` and queue it.
    pub fn stage(&mut self, op: FileOperation) -> Result<(), WriteError> {
        let target = self.guard.admit_write(&op.path, &op.content, op.kind)?;
        let relative = display_relative(self.guard.root(), &target);
        if self.blacklist.is_blocked(Path::new(&relative)) {
            return Err(WriteError::Blacklisted { path: relative });
        }
        debug!(path = %relative, kind = %op.kind, "staged file operation");
        self.staged.push(Staged {
            target,
            relative,
            kind: op.kind,
            content: op.content,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// One line per staged operation, e.g. `CREATE tests/test_app.py (120 bytes)`.
    pub fn preview(&self) -> String {
        self.staged
            .iter()
            .map(|op| match op.kind {
                WriteKind::Delete => format!("DELETE {}", op.relative),
                kind => format!(
                    "{} {} ({} bytes)",
                    kind.as_str().to_uppercase(),
                    op.relative,
                    op.content.len()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Apply staged operations in order, stopping at the first failure.
    ///
    /// With `dry_run` every operation is reported as [`ChangeOutcome::Planned`].
    pub fn apply(&mut self, dry_run: bool) -> Result<Vec<FileChange>, WriteError> {
        let mut changes = Vec::with_capacity(self.staged.len());
        for op in self.staged.drain(..) {
            let outcome = if dry_run {
                ChangeOutcome::Planned
            } else {
                apply_one(&op)?
            };
            info!(path = %op.relative, kind = %op.kind, ?outcome, "file operation");
            changes.push(FileChange {
                path: op.relative,
                kind: op.kind,
                outcome,
            });
        }
        Ok(changes)
    }
}

fn apply_one(op: &Staged) -> Result<ChangeOutcome, WriteError> {
    let io_err = |source: io::Error| WriteError::Io {
        path: op.relative.clone(),
        source,
    };
    let existing = match fs::symlink_metadata(&op.target) {
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(io_err(err)),
    };
    if existing.as_ref().is_some_and(|meta| !meta.is_file()) {
        return Err(WriteError::NotAFile {
            path: op.relative.clone(),
        });
    }

    match op.kind {
        WriteKind::Create => {
            if let Some(parent) = op.target.parent() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
            write_atomic(&op.target, &op.content).map_err(io_err)?;
            Ok(if existing.is_some() {
                ChangeOutcome::Updated
            } else {
                ChangeOutcome::Created
            })
        }
        WriteKind::Update => {
            if existing.is_none() {
                return Err(WriteError::Missing {
                    path: op.relative.clone(),
                });
            }
            write_atomic(&op.target, &op.content).map_err(io_err)?;
            Ok(ChangeOutcome::Updated)
        }
        WriteKind::Delete => {
            if existing.is_none() {
                return Ok(ChangeOutcome::Skipped);
            }
            fs::remove_file(&op.target).map_err(io_err)?;
            Ok(ChangeOutcome::Deleted)
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{name}.agentbox.tmp"));
    if let Err(err) = fs::write(&tmp_path, contents) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::{DenyReason, Policy, SandboxMode};

    fn guard(root: &Path, consent: bool) -> Guard {
        Guard::new(Policy::new(SandboxMode::Limited, root, true, consent).expect("policy"))
    }

    fn op(path: &str, kind: WriteKind, content: &str) -> FileOperation {
        FileOperation {
            path: PathBuf::from(path),
            kind,
            content: content.to_string(),
        }
    }

    #[test]
    fn create_update_delete_lifecycle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = guard(temp.path(), true);
        let blacklist = Blacklist::builtin().expect("builtin blacklist");
        let mut writer = FileWriter::new(&guard, &blacklist);

        writer.stage(op("pkg/a.txt", WriteKind::Create, "one")).expect("stage");
        writer.stage(op("pkg/a.txt", WriteKind::Update, "two")).expect("stage");
        writer.stage(op("gone.txt", WriteKind::Delete, "")).expect("stage");
        assert_eq!(
            writer.preview(),
            "CREATE pkg/a.txt (3 bytes)\nUPDATE pkg/a.txt (3 bytes)\nDELETE gone.txt"
        );

        let changes = writer.apply(false).expect("apply");
        let outcomes: Vec<ChangeOutcome> = changes.iter().map(|c| c.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                ChangeOutcome::Created,
                ChangeOutcome::Updated,
                ChangeOutcome::Skipped
            ]
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("pkg/a.txt")).expect("read"),
            "two"
        );
        assert!(writer.is_empty());

        writer.stage(op("pkg/a.txt", WriteKind::Delete, "")).expect("stage");
        let changes = writer.apply(false).expect("apply");
        assert_eq!(changes[0].outcome, ChangeOutcome::Deleted);
        assert!(!temp.path().join("pkg/a.txt").exists());
    }

    #[test]
    fn update_of_missing_file_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = guard(temp.path(), true);
        let blacklist = Blacklist::builtin().expect("builtin blacklist");
        let mut writer = FileWriter::new(&guard, &blacklist);

        writer.stage(op("nope.txt", WriteKind::Update, "x")).expect("stage");
        let err = writer.apply(false).expect_err("missing");
        assert!(matches!(err, WriteError::Missing { .. }));
    }

    #[test]
    fn staging_is_guarded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let no_consent = guard(temp.path(), false);
        let blacklist = Blacklist::builtin().expect("builtin blacklist");
        let mut writer = FileWriter::new(&no_consent, &blacklist);

        let err = writer
            .stage(op("a.txt", WriteKind::Create, "x"))
            .expect_err("denied");
        match err {
            WriteError::Denied(violation) => {
                assert_eq!(violation.reason, DenyReason::ConsentMissing);
            }
            other => panic!("expected denial, got {other:?}"),
        }

        let consenting = guard(temp.path(), true);
        let mut writer = FileWriter::new(&consenting, &blacklist);
        assert!(matches!(
            writer.stage(op(".env", WriteKind::Create, "K=V")),
            Err(WriteError::Blacklisted { .. })
        ));
        assert!(matches!(
            writer.stage(op("../escape.txt", WriteKind::Create, "x")),
            Err(WriteError::Denied(_))
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn dry_run_leaves_disk_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = guard(temp.path(), true);
        let blacklist = Blacklist::builtin().expect("builtin blacklist");
        let mut writer = FileWriter::new(&guard, &blacklist);

        writer.stage(op("a.txt", WriteKind::Create, "x")).expect("stage");
        let changes = writer.apply(true).expect("apply");
        assert_eq!(changes[0].outcome, ChangeOutcome::Planned);
        assert!(!temp.path().join("a.txt").exists());
    }
}
