//! Per-run diagnostic log of target area and confidence.
//!
//! Truncated when the run starts; one `"<area> <confidence>"` line is
//! appended for every frame with exactly one detection. Nothing reads it
//! back; it exists for tuning the grab area and detection threshold.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_AREA_LOG_PATH: &str = "area.txt";

pub struct AreaLog {
    path: PathBuf,
    file: File,
    entries: u64,
}

impl AreaLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create area log {}", path.display()))?;
        Ok(Self {
            path,
            file,
            entries: 0,
        })
    }

    pub fn record(&mut self, area: f32, confidence: f32) -> Result<()> {
        writeln!(self.file, "{} {}", area.round() as i64, confidence)
            .and_then(|_| self.file.flush())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_truncates_and_record_appends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("area.txt");
        std::fs::write(&path, "stale contents\n")?;

        let mut log = AreaLog::create(&path)?;
        log.record(790_972.4, 0.973)?;
        log.record(1200.0, 0.5)?;
        assert_eq!(log.entries(), 2);

        let contents = std::fs::read_to_string(&path)?;
        assert_eq!(contents, "790972 0.973\n1200 0.5\n");
        Ok(())
    }
}
