//! Error taxonomy for image builds.
//!
//! Every failure is fatal: nothing here is retried. Each variant maps to a
//! distinct process exit code so callers can tell which step aborted.

use std::io;
use std::path::PathBuf;

/// Result type alias for image build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that abort an image build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    // =========================================================================
    // Configuration
    // =========================================================================
    /// Configuration file could not be read, parsed or validated.
    #[error("invalid configuration '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // Staging
    // =========================================================================
    /// The temporary staging directory could not be created.
    #[error("failed to create staging directory under '{root}': {source}")]
    StagingCreate {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A manifest entry references a host path that does not exist.
    #[error("source for '{dest}' does not exist: {source_path}")]
    MissingSource { dest: String, source_path: PathBuf },

    /// Hard link requested between different filesystems.
    #[error("cannot hard-link '{source_path}' into staging tree: source is on a different filesystem")]
    CrossDeviceLink { source_path: PathBuf },

    /// Destination key is empty, absolute or escapes the staging root.
    #[error("invalid destination path '{0}'")]
    InvalidDestination(String),

    /// Any other filesystem failure while materializing an entry.
    #[error("failed to stage '{dest}': {source}")]
    Stage {
        dest: String,
        #[source]
        source: io::Error,
    },

    /// Writing a generated source file failed.
    #[error("failed to write generated file '{path}': {source}")]
    Generate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // =========================================================================
    // External tools
    // =========================================================================
    /// An external tool exited unsuccessfully.
    #[error("{tool} failed ({status}){}", format_stderr(.stderr))]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// An external tool could not be started at all.
    #[error("failed to run {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// Preflight found required host tools missing.
    #[error("missing required host tools:\n{}", .0.join("\n"))]
    MissingTools(Vec<String>),

    // =========================================================================
    // Output
    // =========================================================================
    /// I/O on the archive or final artifact failed.
    #[error("output artifact '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl BuildError {
    /// Process exit code for this failure class. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Config { .. } => 2,
            BuildError::StagingCreate { .. } => 3,
            BuildError::MissingSource { .. } => 4,
            BuildError::CrossDeviceLink { .. }
            | BuildError::InvalidDestination(_)
            | BuildError::Stage { .. }
            | BuildError::Generate { .. } => 5,
            BuildError::ExternalTool { .. }
            | BuildError::ToolSpawn { .. }
            | BuildError::MissingTools(_) => 6,
            BuildError::Output { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_nonzero_and_distinguish_classes() {
        let missing = BuildError::MissingSource {
            dest: "boot/cmdline".into(),
            source_path: PathBuf::from("build/gen/cmdline"),
        };
        let tool = BuildError::ExternalTool {
            tool: "tar".into(),
            status: "exit status: 2".into(),
            stderr: String::new(),
        };
        let create = BuildError::StagingCreate {
            root: PathBuf::from("."),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        assert_ne!(missing.exit_code(), 0);
        assert_ne!(missing.exit_code(), tool.exit_code());
        assert_ne!(create.exit_code(), tool.exit_code());
        assert_ne!(create.exit_code(), missing.exit_code());
    }

    #[test]
    fn external_tool_message_includes_stderr() {
        let err = BuildError::ExternalTool {
            tool: "strip".into(),
            status: "exit status: 1".into(),
            stderr: "strip: 'build/9x.elf': No such file\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("strip failed (exit status: 1)"));
        assert!(msg.ends_with("No such file"));
    }

    #[test]
    fn external_tool_message_without_stderr() {
        let err = BuildError::ExternalTool {
            tool: "gzip".into(),
            status: "exit status: 1".into(),
            stderr: "  \n".into(),
        };
        assert_eq!(err.to_string(), "gzip failed (exit status: 1)");
    }

    #[test]
    fn missing_tools_lists_each_tool() {
        let err = BuildError::MissingTools(vec![
            "  cpio (install: cpio)".into(),
            "  gzip (install: gzip)".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("cpio (install: cpio)"));
        assert!(msg.contains("gzip (install: gzip)"));
    }
}
