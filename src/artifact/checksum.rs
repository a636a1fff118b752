//! Artifact checksums.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{BuildError, Result};

/// SHA-256 (lowercase hex) and size in bytes of the file at `path`.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let output_err = |source: std::io::Error| BuildError::Output {
        path: path.to_path_buf(),
        source,
    };

    let f = File::open(path).map_err(output_err)?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = r.read(&mut buf).map_err(output_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
