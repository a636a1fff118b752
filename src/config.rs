//! Image layout configuration.
//!
//! The layout can be described in a TOML file (`initrd.toml` by default).
//! Without one, [`ImageConfig::default`] reproduces the stock ninex image:
//!
//! ```text
//! boot/                      directory
//! boot/cmdline               generated, "maxsink=2,nopcid"
//! boot/kernel/               directory
//! boot/kernel/ninex-kernel   build/9x.elf, stripped
//! ```

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::artifact::ArchiveFormat;
use crate::error::{BuildError, Result};
use crate::manifest::generated::{
    CommandLine, CMDLINE_DEST_DIR, CMDLINE_FILENAME, DEFAULT_CMDLINE, GENERATED_DIR,
};
use crate::manifest::{GeneratedFile, Manifest};
use crate::pipeline::{ImageOptions, ToolNames, DEFAULT_OUTPUT, DEFAULT_SUFFIX};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "initrd.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default)]
    pub format: ArchiveFormat,
    pub gzip_level: Option<u8>,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            output: default_output(),
            suffix: default_suffix(),
            format: ArchiveFormat::default(),
            gzip_level: None,
        }
    }
}

/// A host file copied (hard-linked) or stripped into the image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSection {
    pub source_dir: PathBuf,
    pub dest_dir: String,
    pub filename: String,
    pub rename_to: Option<String>,
    #[serde(default)]
    pub strip: bool,
}

/// A file whose content comes from the config itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedSection {
    pub source_dir: PathBuf,
    pub dest_dir: String,
    pub filename: String,
    pub content: String,
}

/// Whole image description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub tools: ToolNames,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileSection>,
    #[serde(default)]
    pub generated: Vec<GeneratedSection>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            image: ImageSection::default(),
            tools: ToolNames::default(),
            directories: vec!["boot".to_string(), "boot/kernel".to_string()],
            files: vec![FileSection {
                source_dir: PathBuf::from("build"),
                dest_dir: "boot/kernel".to_string(),
                filename: "9x.elf".to_string(),
                rename_to: Some("ninex-kernel".to_string()),
                strip: true,
            }],
            generated: vec![GeneratedSection {
                source_dir: PathBuf::from(GENERATED_DIR),
                dest_dir: CMDLINE_DEST_DIR.to_string(),
                filename: CMDLINE_FILENAME.to_string(),
                content: DEFAULT_CMDLINE.to_string(),
            }],
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

impl ImageConfig {
    /// Parse and validate TOML text. `path` is only used in messages.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        let config: ImageConfig = toml::from_str(text).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Load `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text, path)
    }

    /// Load `path` if given, else `initrd.toml` in the current directory if
    /// it exists, else the built-in layout.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        match fs::metadata(fallback) {
            Ok(_) => Self::load(fallback),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BuildError::Config {
                path: fallback.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: String| BuildError::Config {
            path: path.to_path_buf(),
            reason,
        };

        if self.image.output.trim().is_empty() {
            return Err(invalid("image.output must not be empty".to_string()));
        }
        if self.image.suffix.is_empty() {
            return Err(invalid("image.suffix must not be empty".to_string()));
        }
        if self.image.output.contains('/') {
            return Err(invalid(format!(
                "image.output must be a file name, got '{}'",
                self.image.output
            )));
        }
        if let Some(level) = self.image.gzip_level {
            if !(1..=9).contains(&level) {
                return Err(invalid(format!(
                    "image.gzip_level must be within 1..=9, got {level}"
                )));
            }
        }
        for generated in &self.generated {
            if generated.dest_dir == CMDLINE_DEST_DIR && generated.filename == CMDLINE_FILENAME {
                CommandLine::new(generated.content.as_str()).map_err(&invalid)?;
            }
        }
        Ok(())
    }

    pub fn options(&self) -> ImageOptions {
        ImageOptions {
            work_dir: self.image.work_dir.clone(),
            output: self.image.output.clone(),
            suffix: self.image.suffix.clone(),
            format: self.image.format,
            gzip_level: self.image.gzip_level,
            tools: self.tools.clone(),
        }
    }

    fn generated_files(&self) -> impl Iterator<Item = GeneratedFile> + '_ {
        self.generated.iter().map(|g| {
            GeneratedFile::new(&g.source_dir, &g.dest_dir, &g.filename, &g.content)
        })
    }

    /// Register every entry without touching the filesystem.
    ///
    /// Generated files are registered at their host path but not written;
    /// use this for listings only.
    pub fn plan_manifest(&self) -> Manifest {
        let mut manifest = Manifest::new();
        self.register_static(&mut manifest);
        for file in self.generated_files() {
            manifest.add_file(&file.source_dir, &file.dest_dir, &file.filename, None, false);
        }
        manifest
    }

    /// Register every entry, writing generated files to disk first.
    ///
    /// Registration order matches the config file; duplicates resolve
    /// last-write-wins with generated files registered last.
    pub fn build_manifest(&self) -> Result<Manifest> {
        let mut manifest = Manifest::new();
        self.register_static(&mut manifest);
        for file in self.generated_files() {
            manifest.add_generated(&file)?;
        }
        Ok(manifest)
    }

    fn register_static(&self, manifest: &mut Manifest) {
        for dir in &self.directories {
            manifest.add_dir(dir);
        }
        for file in &self.files {
            manifest.add_file(
                &file.source_dir,
                &file.dest_dir,
                &file.filename,
                file.rename_to.as_deref(),
                file.strip,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use tempfile::TempDir;

    #[test]
    fn default_layout_matches_stock_image() {
        let manifest = ImageConfig::default().plan_manifest();
        let paths: Vec<_> = manifest.paths().collect();
        assert_eq!(
            paths,
            ["boot", "boot/cmdline", "boot/kernel", "boot/kernel/ninex-kernel"]
        );
        assert_eq!(
            manifest.get("boot/kernel/ninex-kernel"),
            Some(&ManifestEntry::SourceFile {
                source: PathBuf::from("build/9x.elf"),
                strip: true,
            })
        );
        assert_eq!(
            manifest.get("boot/cmdline"),
            Some(&ManifestEntry::SourceFile {
                source: PathBuf::from("build/gen/cmdline"),
                strip: false,
            })
        );
    }

    #[test]
    fn empty_toml_is_default_image_section_without_entries() {
        let config = ImageConfig::from_toml("", Path::new("initrd.toml")).unwrap();
        assert_eq!(config.image, ImageSection::default());
        assert_eq!(config.tools, ToolNames::default());
        assert!(config.plan_manifest().is_empty());
    }

    #[test]
    fn parses_full_config() {
        let text = r#"
directories = ["boot", "boot/kernel", "etc"]

[image]
work_dir = "out"
output = "ninex"
suffix = ".gz"
format = "cpio"
gzip_level = 9

[tools]
strip = "x86_64-elf-strip"

[[files]]
source_dir = "build"
dest_dir = "boot/kernel"
filename = "9x.elf"
rename_to = "ninex-kernel"
strip = true

[[files]]
source_dir = "assets"
dest_dir = "etc"
filename = "motd"

[[generated]]
source_dir = "build/gen"
dest_dir = "boot"
filename = "cmdline"
content = "quiet"
"#;
        let config = ImageConfig::from_toml(text, Path::new("initrd.toml")).unwrap();
        let options = config.options();
        assert_eq!(options.work_dir, PathBuf::from("out"));
        assert_eq!(options.output, "ninex");
        assert_eq!(options.suffix, ".gz");
        assert_eq!(options.format, ArchiveFormat::Cpio);
        assert_eq!(options.gzip_level, Some(9));
        assert_eq!(options.tools.strip, "x86_64-elf-strip");
        assert_eq!(options.tools.gzip, "gzip");

        let manifest = config.plan_manifest();
        assert_eq!(manifest.len(), 6);
        assert_eq!(
            manifest.get("etc/motd"),
            Some(&ManifestEntry::SourceFile {
                source: PathBuf::from("assets/motd"),
                strip: false,
            })
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let path = Path::new("initrd.toml");
        for text in [
            "[image]\ncompression = \"xz\"\n",
            "[image]\nformat = \"zip\"\n",
            "[image]\ngzip_level = 0\n",
            "[image]\noutput = \"\"\n",
            "[image]\noutput = \"out/initrd\"\n",
        ] {
            let err = ImageConfig::from_toml(text, path).unwrap_err();
            assert!(matches!(err, BuildError::Config { .. }), "accepted: {text}");
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn rejects_oversized_command_line() {
        let text = format!(
            "[[generated]]\nsource_dir = \"build/gen\"\ndest_dir = \"boot\"\nfilename = \"cmdline\"\ncontent = \"{}\"\n",
            "a".repeat(5000)
        );
        let err = ImageConfig::from_toml(&text, Path::new("initrd.toml")).unwrap_err();
        assert!(err.to_string().contains("at most 4094"));
    }

    #[test]
    fn build_manifest_writes_generated_files() {
        let temp = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        config.generated[0].source_dir = temp.path().join("gen");

        let manifest = config.build_manifest().unwrap();

        let host = temp.path().join("gen/cmdline");
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
    fn load_reports_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ImageConfig::load(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("initrd.toml");
        fs::write(&path, "directories = [\"boot\"]\n").unwrap();

        let config = ImageConfig::load(&path).unwrap();
        assert_eq!(config.directories, ["boot"]);
    }
}
