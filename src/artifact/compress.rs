//! In-place gzip compression of the archive.
//!
//! `gzip -S <suffix>` replaces `<archive>` with `<archive><suffix>`.
//! `-n` keeps the original name and timestamp out of the gzip header so the
//! output depends on content only; `-f` lets a rebuild replace an existing
//! artifact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::artifact::archive::remove_partial;
use crate::error::Result;
use crate::process::{Cmd, ToolRunner};

/// Path gzip produces for `archive` with `suffix`.
pub fn compressed_path(archive: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Build the gzip invocation. `level` is 1..=9, gzip's default when `None`.
pub fn compress_command(program: &str, archive: &Path, suffix: &str, level: Option<u8>) -> Cmd {
    let mut cmd = Cmd::new(program).args(["-S", suffix, "-n", "-f", "--quiet"]);
    if let Some(level) = level {
        cmd = cmd.arg(format!("-{level}"));
    }
    cmd.arg_path(archive)
}

/// Compress `archive` in place, returning the compressed artifact path.
///
/// On failure both the archive and any partial artifact are removed.
pub fn compress_in_place(
    program: &str,
    archive: &Path,
    suffix: &str,
    level: Option<u8>,
    runner: &dyn ToolRunner,
) -> Result<PathBuf> {
    let output = compressed_path(archive, suffix);
    if let Err(e) = compress_command(program, archive, suffix, level).run(runner) {
        remove_partial(&output);
        remove_partial(archive);
        return Err(e);
    }
    tracing::info!(output = %output.display(), "compressed archive");
    Ok(output)
}
