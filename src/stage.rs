//! Materialize a [`Manifest`] into a temporary staging tree.
//!
//! Entries are processed strictly in sorted path order:
//! - `Directory` → `mkdir` (parents are NOT created)
//! - `SourceFile` without strip → hard link from the host source
//! - `SourceFile` with strip → `strip -o <dest> <source>`
//!
//! The first failing entry aborts the pass. The staging tree is owned by a
//! [`StagingDir`] and removed when it is dropped, whatever the outcome.
//!
//! Directories and stripped files are created fresh on every run, so their
//! timestamps are reset to [`STAGED_MTIME`] once the pass completes.
//! Hard-linked files share their inode with the host source and keep the
//! source's timestamps.

use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};
use crate::manifest::{Manifest, ManifestEntry};
use crate::process::{Cmd, ToolRunner};

/// Prefix of every staging directory name.
pub const STAGING_PREFIX: &str = "initrd-";

/// Access and modification time of every entry the builder creates.
pub const STAGED_MTIME: SystemTime = UNIX_EPOCH;

/// A freshly created, uniquely named staging directory.
///
/// Removed recursively on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Create `<work_root>/initrd-XXXXXX`.
    ///
    /// It lives under the working root so hard links from sources beside it
    /// stay on one filesystem.
    pub fn create(work_root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(work_root)
            .map_err(|source| BuildError::StagingCreate {
                root: work_root.to_path_buf(),
                source,
            })?;
        debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the tree now and report failures instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// A populated staging tree plus the archive order of its entries.
#[derive(Debug)]
pub struct StagedTree {
    pub dir: StagingDir,
    /// Destination paths in the order they were staged.
    pub file_list: Vec<String>,
}

impl StagedTree {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Stage every manifest entry under a new directory in `work_root`.
///
/// `strip_tool` is the program used for entries with the strip flag.
pub fn stage_manifest(
    manifest: &Manifest,
    work_root: &Path,
    strip_tool: &str,
    runner: &dyn ToolRunner,
) -> Result<StagedTree> {
    let dir = StagingDir::create(work_root)?;

    let missing = manifest.missing_ancestors();
    if !missing.is_empty() {
        warn!(?missing, "manifest does not register every ancestor directory");
    }

    let mut file_list = Vec::with_capacity(manifest.len());
    for (rel_path, entry) in manifest {
        stage_entry(dir.path(), rel_path, entry, strip_tool, runner)?;
        file_list.push(rel_path.clone());
    }

    // Children first: nothing below a directory is created after its reset.
    for (rel_path, entry) in manifest.iter().rev() {
        let owned = match entry {
            ManifestEntry::Directory => true,
            ManifestEntry::SourceFile { strip, .. } => *strip,
        };
        if owned {
            reset_mtime(&dir.path().join(rel_path)).map_err(|source| BuildError::Stage {
                dest: rel_path.clone(),
                source,
            })?;
        }
    }

    info!(
        root = %dir.path().display(),
        entries = file_list.len(),
        "staged manifest"
    );
    Ok(StagedTree { dir, file_list })
}

fn stage_entry(
    root: &Path,
    rel_path: &str,
    entry: &ManifestEntry,
    strip_tool: &str,
    runner: &dyn ToolRunner,
) -> Result<()> {
    let dest = staged_path(root, rel_path)?;
    debug!(path = rel_path, kind = entry.kind(), "staging entry");

    match entry {
        ManifestEntry::Directory => fs::create_dir(&dest).map_err(|source| BuildError::Stage {
            dest: rel_path.to_string(),
            source,
        }),
        ManifestEntry::SourceFile { source, strip } => {
            require_source(rel_path, source)?;
            if *strip {
                Cmd::new(strip_tool)
                    .arg("-o")
                    .arg_path(&dest)
                    .arg_path(source)
                    .run(runner)?;
                Ok(())
            } else {
                hard_link(rel_path, source, &dest)
            }
        }
    }
}

/// Resolve a manifest key below `root`, rejecting anything that could
/// land outside of it.
fn staged_path(root: &Path, rel_path: &str) -> Result<PathBuf> {
    let rel = Path::new(rel_path);
    let valid = !rel_path.is_empty()
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(BuildError::InvalidDestination(rel_path.to_string()));
    }
    Ok(root.join(rel))
}

fn require_source(rel_path: &str, source: &Path) -> Result<()> {
    match fs::metadata(source) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BuildError::MissingSource {
            dest: rel_path.to_string(),
            source_path: source.to_path_buf(),
        }),
        Err(source_err) => Err(BuildError::Stage {
            dest: rel_path.to_string(),
            source: source_err,
        }),
    }
}

fn hard_link(rel_path: &str, source: &Path, dest: &Path) -> Result<()> {
    fs::hard_link(source, dest).map_err(|e| link_error(rel_path, source, e))
}

fn link_error(rel_path: &str, source: &Path, err: io::Error) -> BuildError {
    if err.raw_os_error() == Some(libc::EXDEV) {
        BuildError::CrossDeviceLink {
            source_path: source.to_path_buf(),
        }
    } else {
        BuildError::Stage {
            dest: rel_path.to_string(),
            source: err,
        }
    }
}

/// Set both timestamps of `path` (file or directory) to [`STAGED_MTIME`].
pub(crate) fn reset_mtime(path: &Path) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(STAGED_MTIME)
        .set_modified(STAGED_MTIME);
    File::open(path)?.set_times(times)
}
