//! Manifest-driven initrd builder for the ninex kernel.
//!
//! An image is described declaratively, materialized into a throwaway
//! staging tree, archived in sorted path order and compressed:
//!
//! - **Manifest** - Destination path → directory or host source file
//! - **Stager** - Builds the staging tree (mkdir, hard link, or strip)
//! - **Artifact** - External archiver and compressor wrappers
//! - **Pipeline** - Runs the steps and always removes the staging tree
//! - **Config** - TOML description of the layout, defaults to the stock image
//!
//! # Architecture
//!
//! ```text
//! ImageConfig ──► Manifest ──► stage_manifest ──► create_archive ──► compress_in_place
//!  (initrd.toml)   (sorted)     (initrd-XXXXXX/)    (initrd)           (initrd.img)
//!                                    │
//!                                    └── removed on every exit path
//! ```
//!
//! External tools (`strip`, `tar`/`cpio`, `gzip`) are only reached through
//! [`process::ToolRunner`], so the whole pipeline runs against a fake
//! runner in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use ninex_initrd::{build_image, ImageOptions, Manifest, SystemRunner};
//! use std::path::Path;
//!
//! let mut manifest = Manifest::new();
//! manifest.add_dir("boot");
//! manifest.add_dir("boot/kernel");
//! manifest.add_file("build", "boot/kernel", "9x.elf", Some("ninex-kernel"), true);
//! manifest.materialize_command_line_file(Path::new("."))?;
//!
//! let report = build_image(manifest, &ImageOptions::default(), &SystemRunner)?;
//! println!("{} ({})", report.artifact.display(), report.sha256);
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod report;
pub mod stage;

pub use config::ImageConfig;
pub use error::{BuildError, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use pipeline::{build_image, BuildReport, ImageOptions};
pub use process::{Cmd, CommandResult, SystemRunner, ToolRunner};
