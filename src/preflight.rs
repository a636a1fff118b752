//! Preflight checks for build validation.
//!
//! Validates that the host has every external tool the build will invoke
//! before any staging starts, so a missing tool is reported up front
//! instead of halfway through a build.
//!
//! # Example
//!
//! ```rust
//! use ninex_initrd::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("cpio") {
//!     println!("cpio not installed");
//! }
//!
//! let tools = &[("tar", "tar"), ("gzip", "gzip")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::error::{BuildError, Result};
use crate::manifest::Manifest;
use crate::pipeline::ImageOptions;

/// Check if a command can be resolved the way a spawn would resolve it.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host package providing each default tool.
fn package_for(tool: &str) -> &str {
    match tool {
        "strip" => "binutils",
        other => other,
    }
}

/// Tools (command, package) a build of `manifest` with `options` invokes.
///
/// `strip` is only required when some entry asks for it.
pub fn required_tools<'a>(options: &'a ImageOptions, manifest: &Manifest) -> Vec<(&'a str, &'a str)> {
    let mut tools = Vec::with_capacity(3);
    if manifest.needs_strip() {
        tools.push(options.tools.strip.as_str());
    }
    tools.push(options.tools.archiver(options.format));
    tools.push(options.tools.gzip.as_str());
    tools.into_iter().map(|t| (t, package_for(t))).collect()
}

/// Check that specific tools are available.
///
/// Every missing tool is reported, not just the first.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        return Err(BuildError::MissingTools(missing));
    }
    Ok(())
}

/// Check every tool a build of `manifest` needs.
pub fn check_host_tools(options: &ImageOptions, manifest: &Manifest) -> Result<()> {
    check_required_tools(&required_tools(options, manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArchiveFormat;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("sh", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_reports_all_missing() {
        let tools = &[
            ("nonexistent_command_xyz", "fake-package"),
            ("sh", "coreutils"),
            ("another_missing_tool_abc", "other-package"),
        ];
        match check_required_tools(tools).unwrap_err() {
            BuildError::MissingTools(missing) => {
                assert_eq!(missing.len(), 2);
                assert!(missing[0].contains("fake-package"));
                assert!(missing[1].contains("another_missing_tool_abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strip_only_required_when_needed() {
        let options = ImageOptions::default();
        let mut manifest = Manifest::new();
        manifest.add_dir("boot");
        assert_eq!(
            required_tools(&options, &manifest),
            [("tar", "tar"), ("gzip", "gzip")]
        );

        manifest.add_file("build", "boot", "9x.elf", None, true);
        assert_eq!(
            required_tools(&options, &manifest),
            [("strip", "binutils"), ("tar", "tar"), ("gzip", "gzip")]
        );
    }

    #[test]
    fn archiver_follows_format() {
        let options = ImageOptions {
            format: ArchiveFormat::Cpio,
            ..Default::default()
        };
        let tools = required_tools(&options, &Manifest::new());
        assert_eq!(tools[0], ("cpio", "cpio"));
    }
}
