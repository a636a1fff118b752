//! Generated source files.
//!
//! Content that does not exist on disk yet (such as the kernel command
//! line) is written to a generated-output location first and then
//! registered like any other source file. No special manifest entry kind
//! exists for generated content.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::stage::reset_mtime;

use super::Manifest;

/// Default kernel command line shipped in the image.
pub const DEFAULT_CMDLINE: &str = "maxsink=2,nopcid";

/// Host directory generated files are written to.
pub const GENERATED_DIR: &str = "build/gen";

/// File name of the generated command line.
pub const CMDLINE_FILENAME: &str = "cmdline";

/// Image directory the command line is placed in.
pub const CMDLINE_DEST_DIR: &str = "boot";

/// The kernel copies the command line into a 4096 byte buffer and needs
/// two bytes for the double NUL terminator.
pub const CMDLINE_MAX_LEN: usize = 4094;

/// A file whose content is produced by the builder itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Host directory the file is written into.
    pub source_dir: PathBuf,
    /// Image directory the file appears in.
    pub dest_dir: String,
    pub filename: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        dest_dir: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Host path the content is written to.
    pub fn host_path(&self) -> PathBuf {
        self.source_dir.join(&self.filename)
    }

    /// Write the content exactly as given, without a trailing newline.
    ///
    /// Missing parent directories are created. The file is stamped with
    /// [`STAGED_MTIME`](crate::stage::STAGED_MTIME) so its hard link in the
    /// staging tree carries the same timestamp on every run.
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.host_path();
        fs::create_dir_all(&self.source_dir)
            .and_then(|()| fs::write(&path, &self.content))
            .and_then(|()| reset_mtime(&path))
            .map_err(|source| BuildError::Generate {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Kernel command line as the kernel will tokenize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(String);

impl CommandLine {
    pub fn new(content: impl Into<String>) -> std::result::Result<Self, String> {
        let content = content.into();
        if content.len() > CMDLINE_MAX_LEN {
            return Err(format!(
                "command line is {} bytes, the kernel accepts at most {}",
                content.len(),
                CMDLINE_MAX_LEN
            ));
        }
        if content.contains('\0') {
            return Err("command line must not contain NUL bytes".to_string());
        }
        Ok(Self(content))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Options split on whitespace into `(key, value)`; a bare key has no
    /// value. Only the first `=` separates key from value.
    pub fn options(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.0
            .split_whitespace()
            .map(|option| match option.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (option, None),
            })
    }

    /// Value of `key`, `Some("")` for a bare key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.unwrap_or(""))
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        Self(DEFAULT_CMDLINE.to_string())
    }
}

impl Manifest {
    /// Write `file` to disk and register it as an unstripped source file.
    pub fn add_generated(&mut self, file: &GeneratedFile) -> Result<()> {
        let path = file.write()?;
        tracing::debug!(path = %path.display(), bytes = file.content.len(), "wrote generated file");
        self.add_file(&file.source_dir, &file.dest_dir, &file.filename, None, false);
        Ok(())
    }

    /// Write the default command line under `root/build/gen/cmdline` and
    /// register it as `boot/cmdline`.
    pub fn materialize_command_line_file(&mut self, root: &Path) -> Result<()> {
        self.add_generated(&command_line_file(root, &CommandLine::default()))
    }
}

/// Generated-file description for a command line rooted at `root`.
pub fn command_line_file(root: &Path, cmdline: &CommandLine) -> GeneratedFile {
    GeneratedFile::new(
        root.join(GENERATED_DIR),
        CMDLINE_DEST_DIR,
        CMDLINE_FILENAME,
        cmdline.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use crate::stage::STAGED_MTIME;
    use tempfile::TempDir;

    #[test]
    fn materialize_writes_exact_content_and_registers() {
        let temp = TempDir::new().unwrap();
        let mut manifest = Manifest::new();

        manifest.materialize_command_line_file(temp.path()).unwrap();

        let host = temp.path().join("build/gen/cmdline");
        assert_eq!(fs::read_to_string(&host).unwrap(), "maxsink=2,nopcid");
        assert_eq!(
            manifest.get("boot/cmdline"),
            Some(&ManifestEntry::SourceFile {
                source: host,
                strip: false,
            })
        );
    }

    #[test]
    fn generated_file_has_fixed_timestamp() {
        let temp = TempDir::new().unwrap();
        let path = GeneratedFile::new(temp.path(), "boot", "cmdline", DEFAULT_CMDLINE)
            .write()
            .unwrap();
        let modified = fs::metadata(path).unwrap().modified().unwrap();
        assert_eq!(modified, STAGED_MTIME);
    }

    #[test]
    fn generated_file_overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let file = GeneratedFile::new(temp.path(), "etc", "hostname", "ninex");
        fs::write(temp.path().join("hostname"), "stale content that is longer").unwrap();

        let path = file.write().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "ninex");
    }

    #[test]
    fn generate_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("build");
        fs::write(&blocker, "not a directory").unwrap();

        let mut manifest = Manifest::new();
        let err = manifest
            .materialize_command_line_file(temp.path())
            .unwrap_err();
        assert!(matches!(err, BuildError::Generate { .. }));
        assert!(manifest.is_empty());
    }

    #[test]
    fn command_line_options_follow_kernel_tokenizing() {
        let cmdline = CommandLine::new("maxsink=2,nopcid  quiet\tlog=a=b").unwrap();
        let options: Vec<_> = cmdline.options().collect();
        assert_eq!(
            options,
            [
                ("maxsink", Some("2,nopcid")),
                ("quiet", None),
                ("log", Some("a=b")),
            ]
        );
        assert_eq!(cmdline.get("maxsink"), Some("2,nopcid"));
        assert_eq!(cmdline.get("quiet"), Some(""));
        assert_eq!(cmdline.get("nopcid"), None);
    }

    #[test]
    fn command_line_rejects_oversized_and_nul() {
        assert!(CommandLine::new("a".repeat(CMDLINE_MAX_LEN)).is_ok());
        assert!(CommandLine::new("a".repeat(CMDLINE_MAX_LEN + 1)).is_err());
        assert!(CommandLine::new("a\0b").is_err());
    }

    #[test]
    fn default_command_line() {
        assert_eq!(CommandLine::default().as_str(), DEFAULT_CMDLINE);
    }
}
