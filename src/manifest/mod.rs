//! Declarative description of an image's contents.
//!
//! A [`Manifest`] maps destination paths (relative to the image root,
//! `/`-separated) to what should appear there. Registering entries never
//! touches the host filesystem; every existence check is deferred to
//! staging.
//!
//! Keys are kept in a sorted map, so iteration is always in lexicographic
//! path order regardless of insertion history. A directory therefore comes
//! before anything inside it, provided each ancestor is registered.
//!
//! # Example
//!
//! ```rust
//! use ninex_initrd::manifest::{Manifest, ManifestEntry};
//!
//! let mut manifest = Manifest::new();
//! manifest.add_dir("boot");
//! manifest.add_dir("boot/kernel");
//! manifest.add_file("build", "boot/kernel", "9x.elf", Some("ninex-kernel"), true);
//!
//! let paths: Vec<&str> = manifest.paths().collect();
//! assert_eq!(paths, ["boot", "boot/kernel", "boot/kernel/ninex-kernel"]);
//! assert!(matches!(
//!     manifest.get("boot/kernel/ninex-kernel"),
//!     Some(ManifestEntry::SourceFile { strip: true, .. })
//! ));
//! ```

pub mod generated;

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub use generated::{CommandLine, GeneratedFile};

/// What a destination path should become in the staging tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// An empty directory.
    Directory,
    /// A regular file taken from the host, optionally symbol-stripped.
    SourceFile { source: PathBuf, strip: bool },
}

impl ManifestEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self, ManifestEntry::Directory)
    }

    /// Short label used in listings and build reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ManifestEntry::Directory => "dir",
            ManifestEntry::SourceFile { strip: true, .. } => "strip",
            ManifestEntry::SourceFile { strip: false, .. } => "link",
        }
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestEntry::Directory => write!(f, "directory"),
            ManifestEntry::SourceFile { source, strip } => {
                write!(f, "{}", source.display())?;
                if *strip {
                    write!(f, " (stripped)")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered mapping from destination path to [`ManifestEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directory at `rel_path`.
    ///
    /// A later registration under the same path replaces this one.
    pub fn add_dir(&mut self, rel_path: &str) {
        self.insert(normalize_key(rel_path), ManifestEntry::Directory);
    }

    /// Register `source_dir/filename` to appear at
    /// `dest_dir/(rename_to or filename)`.
    ///
    /// The source is not checked here; a missing source fails staging.
    pub fn add_file(
        &mut self,
        source_dir: impl AsRef<Path>,
        dest_dir: &str,
        filename: &str,
        rename_to: Option<&str>,
        strip: bool,
    ) {
        let source = source_dir.as_ref().join(filename);
        let dest = join_key(dest_dir, rename_to.unwrap_or(filename));
        self.insert(dest, ManifestEntry::SourceFile { source, strip });
    }

    fn insert(&mut self, key: String, entry: ManifestEntry) {
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            tracing::debug!(path = %key, replaced = %previous, "manifest entry overwritten");
        }
    }

    pub fn get(&self, rel_path: &str) -> Option<&ManifestEntry> {
        self.entries.get(&normalize_key(rel_path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destination paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in lexicographic path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ManifestEntry> {
        self.entries.iter()
    }

    /// True if any file entry asks for stripping.
    pub fn needs_strip(&self) -> bool {
        self.entries
            .values()
            .any(|e| matches!(e, ManifestEntry::SourceFile { strip: true, .. }))
    }

    /// Ancestor directories implied by registered paths but not registered
    /// as [`ManifestEntry::Directory`].
    ///
    /// Staging does not create these; they are reported for diagnostics.
    pub fn missing_ancestors(&self) -> Vec<String> {
        let mut missing = BTreeSet::new();
        for key in self.entries.keys() {
            let mut end = key.len();
            while let Some(pos) = key[..end].rfind('/') {
                let ancestor = &key[..pos];
                if !ancestor.is_empty()
                    && !matches!(self.entries.get(ancestor), Some(ManifestEntry::Directory))
                {
                    missing.insert(ancestor.to_string());
                }
                end = pos;
            }
        }
        missing.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a ManifestEntry);
    type IntoIter = btree_map::Iter<'a, String, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// `boot/`, `./boot` and `boot` name the same directory.
///
/// Empty and `.` segments are dropped. A leading `/` and `..` segments are
/// kept so staging can reject them.
fn normalize_key(rel_path: &str) -> String {
    let segments: Vec<&str> = rel_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let key = segments.join("/");
    if rel_path.starts_with('/') {
        format!("/{key}")
    } else {
        key
    }
}

fn join_key(dir: &str, name: &str) -> String {
    if normalize_key(dir).is_empty() {
        normalize_key(name)
    } else {
        normalize_key(&format!("{dir}/{name}"))
    }
}
