//! The image build pipeline: stage → archive → compress → cleanup.
//!
//! Every step blocks until it finishes. The first failure aborts the rest.
//! The staging tree is removed on every exit path because it is owned by a
//! [`StagingDir`](crate::stage::StagingDir) that drops when this function
//! returns.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::artifact::compress::compressed_path;
use crate::artifact::{self, ArchiveFormat};
use crate::error::{BuildError, Result};
use crate::manifest::Manifest;
use crate::process::ToolRunner;
use crate::stage::stage_manifest;

/// Default name of the uncompressed archive.
pub const DEFAULT_OUTPUT: &str = "initrd";

/// Default suffix the compressor appends.
pub const DEFAULT_SUFFIX: &str = ".img";

/// Programs used for the external steps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolNames {
    pub strip: String,
    pub tar: String,
    pub cpio: String,
    pub gzip: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            strip: "strip".to_string(),
            tar: "tar".to_string(),
            cpio: "cpio".to_string(),
            gzip: "gzip".to_string(),
        }
    }
}

impl ToolNames {
    /// Archiver program for `format`.
    pub fn archiver(&self, format: ArchiveFormat) -> &str {
        match format {
            ArchiveFormat::Tar => &self.tar,
            ArchiveFormat::Cpio => &self.cpio,
        }
    }
}

/// Where and how the image is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Parent of the staging tree and directory the artifacts land in.
    pub work_dir: PathBuf,
    pub output: String,
    pub suffix: String,
    pub format: ArchiveFormat,
    pub gzip_level: Option<u8>,
    pub tools: ToolNames,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            output: DEFAULT_OUTPUT.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            format: ArchiveFormat::default(),
            gzip_level: None,
            tools: ToolNames::default(),
        }
    }
}

/// One staged entry as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub path: String,
    pub kind: &'static str,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub artifact: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub format: String,
    /// Entries in archive order.
    pub entries: Vec<ReportEntry>,
    pub finished_at_utc: String,
}

/// Build the compressed image described by `manifest`.
///
/// The manifest is consumed: it describes exactly one build.
pub fn build_image(
    manifest: Manifest,
    options: &ImageOptions,
    runner: &dyn ToolRunner,
) -> Result<BuildReport> {
    let work_dir = fs::canonicalize(&options.work_dir).map_err(|source| {
        BuildError::StagingCreate {
            root: options.work_dir.clone(),
            source,
        }
    })?;
    let archive_path = work_dir.join(&options.output);
    remove_previous_artifact(&compressed_path(&archive_path, &options.suffix))?;

    info!(
        work_dir = %work_dir.display(),
        entries = manifest.len(),
        format = %options.format,
        "building initrd"
    );

    let staged = stage_manifest(&manifest, &work_dir, &options.tools.strip, runner)?;

    let result = archive_and_compress(
        staged.root(),
        &staged.file_list,
        &archive_path,
        options,
        runner,
    );

    let staging_root = staged.root().to_path_buf();
    let file_list = staged.file_list;
    if let Err(e) = staged.dir.close() {
        warn!(path = %staging_root.display(), error = %e, "failed to remove staging directory");
    }

    let artifact = result?;
    let (sha256, size_bytes) = artifact::sha256_file(&artifact)?;
    let entries = file_list
        .into_iter()
        .map(|path| {
            let kind = manifest.get(&path).map_or("dir", |e| e.kind());
            ReportEntry { path, kind }
        })
        .collect();

    info!(artifact = %artifact.display(), %sha256, size_bytes, "initrd ready");
    Ok(BuildReport {
        artifact,
        sha256,
        size_bytes,
        format: options.format.to_string(),
        entries,
        finished_at_utc: now_utc_compact(),
    })
}

fn archive_and_compress(
    root: &Path,
    file_list: &[String],
    archive_path: &Path,
    options: &ImageOptions,
    runner: &dyn ToolRunner,
) -> Result<PathBuf> {
    artifact::create_archive(
        options.format,
        options.tools.archiver(options.format),
        root,
        file_list,
        archive_path,
        runner,
    )?;
    artifact::compress_in_place(
        &options.tools.gzip,
        archive_path,
        &options.suffix,
        options.gzip_level,
        runner,
    )
}

/// An image left by an earlier build must not survive a failed one.
fn remove_previous_artifact(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed previous image");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Output {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
