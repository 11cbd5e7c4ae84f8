//! Local persistence for batches the collector did not accept
//!
//! Each failed batch lands in its own file and is never replayed.

use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;
use wiretap_core::{Result, FALLBACK_FILE_PREFIX};
use wiretap_utils::write_json_atomic;

#[derive(Debug, Clone)]
pub struct FallbackWriter {
    dir: PathBuf,
}

impl FallbackWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `events` as a JSON array, returning the file path
    pub fn write_batch(&self, events: &[Value]) -> Result<PathBuf> {
        let path = self.dir.join(file_name());
        write_json_atomic(&path, events)?;
        warn!(
            path = %path.display(),
            count = events.len(),
            "events written to local fallback"
        );
        Ok(path)
    }
}

fn file_name() -> String {
    format!(
        "{FALLBACK_FILE_PREFIX}-{}-{}.json",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_batches_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = FallbackWriter::new(temp_dir.path().join("dumps"));

        let first = writer.write_batch(&[json!({"id": 1})]).unwrap();
        let second = writer.write_batch(&[json!({"id": 2})]).unwrap();

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("wiretap-"));
        assert!(name.ends_with(".json"));

        let stored: Vec<Value> = serde_json::from_slice(&std::fs::read(&second).unwrap()).unwrap();
        assert_eq!(stored, vec![json!({"id": 2})]);
    }
}
