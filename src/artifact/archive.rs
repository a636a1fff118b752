//! Uncompressed archive creation.
//!
//! The archiver is handed the staged file list explicitly and must not
//! traverse the tree on its own: the sorted list is what makes the archive
//! reproducible. Owners and inode numbers are normalized through the tool's
//! own flags. tar also pins mtimes with `--mtime`. cpio has no such flag and
//! relies on the stager resetting the timestamps of everything it creates.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::process::{Cmd, ToolRunner};

/// On-disk archive format of the uncompressed image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// GNU tar.
    #[default]
    Tar,
    /// cpio in `newc` format.
    #[serde(alias = "newc")]
    Cpio,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Tar => write!(f, "tar"),
            ArchiveFormat::Cpio => write!(f, "cpio"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tar" => Ok(ArchiveFormat::Tar),
            "cpio" | "newc" => Ok(ArchiveFormat::Cpio),
            other => Err(format!(
                "unsupported archive format '{other}' (expected 'tar' or 'cpio')"
            )),
        }
    }
}

/// Build the invocation that archives `file_list` (relative to `root`)
/// into `output`.
pub fn archive_command(
    format: ArchiveFormat,
    program: &str,
    root: &Path,
    file_list: &[String],
    output: &Path,
) -> Cmd {
    match format {
        ArchiveFormat::Tar => Cmd::new(program)
            .arg("--create")
            .arg("--file")
            .arg_path(output)
            .arg("--directory")
            .arg_path(root)
            .args([
                "--format=gnu",
                "--mtime=@0",
                "--owner=0",
                "--group=0",
                "--numeric-owner",
                "--no-recursion",
                "--",
            ])
            .args(file_list),
        ArchiveFormat::Cpio => {
            let mut list = file_list.join("\n");
            list.push('\n');
            Cmd::new(program)
                .args(["--create", "--format=newc", "--reproducible", "--quiet"])
                .arg("--directory")
                .arg_path(root)
                .arg("--file")
                .arg_path(output)
                .stdin(list)
        }
    }
}

/// Archive the staged tree at `root` into `output`.
///
/// On failure any partially written `output` is removed.
pub fn create_archive(
    format: ArchiveFormat,
    program: &str,
    root: &Path,
    file_list: &[String],
    output: &Path,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let cmd = archive_command(format, program, root, file_list, output);
    if let Err(e) = cmd.run(runner) {
        remove_partial(output);
        return Err(e);
    }
    tracing::info!(
        format = %format,
        entries = file_list.len(),
        output = %output.display(),
        "created archive"
    );
    Ok(())
}

/// Best effort: the original error is what gets reported.
pub(crate) fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove partial artifact"),
    }
}
