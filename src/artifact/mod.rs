//! Artifact builders for the initrd image.
//!
//! - [`archive`] - Uncompressed tar or cpio archive from a staged tree
//! - [`compress`] - In-place gzip compression of the archive
//! - [`checksum`] - SHA-256 of the final artifact
//!
//! Archive formats and compression are never implemented here: both steps
//! shell out through [`crate::process::ToolRunner`].

pub mod archive;
pub mod checksum;
pub mod compress;

pub use archive::{create_archive, ArchiveFormat};
pub use checksum::sha256_file;
pub use compress::compress_in_place;
