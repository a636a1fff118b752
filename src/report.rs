//! Build report persistence.

use std::fs;
use std::path::Path;

use crate::error::{BuildError, Result};
use crate::pipeline::BuildReport;

/// Write `report` as pretty JSON to `path`.
///
/// The file is written beside its destination and renamed into place so a
/// reader never sees a half-written report.
pub fn write_report(path: &Path, report: &BuildReport) -> Result<()> {
    let output_err = |source: std::io::Error| BuildError::Output {
        path: path.to_path_buf(),
        source,
    };

    let payload = serde_json::to_vec_pretty(report).map_err(|e| output_err(e.into()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_err)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    fs::write(&tmp, payload).map_err(output_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        output_err(e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReportEntry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample() -> BuildReport {
        BuildReport {
            artifact: PathBuf::from("/work/initrd.img"),
            sha256: "ab".repeat(32),
            size_bytes: 4096,
            format: "tar".to_string(),
            entries: vec![
                ReportEntry {
                    path: "boot".to_string(),
                    kind: "dir",
                },
                ReportEntry {
                    path: "boot/cmdline".to_string(),
                    kind: "link",
                },
            ],
            finished_at_utc: "20261018T120000Z".to_string(),
        }
    }

    #[test]
    fn writes_json_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reports/initrd.json");

        write_report(&path, &sample()).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["size_bytes"], 4096);
        assert_eq!(value["entries"][1]["path"], "boot/cmdline");
        assert_eq!(value["entries"][1]["kind"], "link");
        assert_eq!(fs::read_dir(temp.path().join("reports")).unwrap().count(), 1);
    }

    #[test]
    fn overwrites_existing_report() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("initrd.json");
        fs::write(&path, "old").unwrap();

        write_report(&path, &sample()).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("initrd.img"));
    }
}
