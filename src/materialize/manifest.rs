//! Durable intermediate manifest
//!
//! `_manifest.json` is the authoritative descriptor of a durable result
//! directory. The leading underscore keeps the catalog from treating it as
//! data when the directory is reopened.
//!
//! Format:
//! ```json
//! {
//!   "id": "6f1c2b9e-8a1d-4c55-9a63-0f9c8d1b2e47",
//!   "created_at": "2026-10-19T11:30:00Z",
//!   "schema": [{ "name": "region", "type": "utf8" }],
//!   "partitions": ["part-00000.scol"],
//!   "row_count": 42,
//!   "format_version": 1
//! }
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::RawSchemaSpec;

use super::errors::{MaterializeError, MaterializeResult};

/// File name of the manifest inside a durable result directory
pub const MANIFEST_FILE: &str = "_manifest.json";

const MANIFEST_FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurableManifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub schema: RawSchemaSpec,
    /// Partition file names relative to the result directory, in order
    pub partitions: Vec<String>,
    pub row_count: u64,
    pub format_version: u8,
}

impl DurableManifest {
    pub fn new(schema: RawSchemaSpec, partitions: Vec<String>, row_count: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            schema,
            partitions,
            row_count,
            format_version: MANIFEST_FORMAT_VERSION,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Writes the manifest into `dir` with fsync.
    ///
    /// The file is written under a temporary name and renamed, so a
    /// manifest is either complete or absent.
    pub fn write_to_dir(&self, dir: &Path) -> MaterializeResult<()> {
        let path = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MaterializeError::manifest(&path, e.to_string()))?;

        let mut file = File::create(&tmp).map_err(|e| MaterializeError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| MaterializeError::io(&tmp, e))?;
        file.sync_all().map_err(|e| MaterializeError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| MaterializeError::io(&path, e))?;
        Ok(())
    }

    /// Reads and checks the manifest of `dir`
    pub fn read_from_dir(dir: &Path) -> MaterializeResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| MaterializeError::io(&path, e))?;
        let manifest: DurableManifest = serde_json::from_str(&content)
            .map_err(|e| MaterializeError::manifest(&path, e.to_string()))?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(MaterializeError::manifest(
                &path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = DurableManifest::new(
            RawSchemaSpec::new().column("region", "utf8"),
            vec!["part-00000.scol".into()],
            7,
        );
        manifest.write_to_dir(dir.path()).unwrap();
        assert!(!dir.path().join("_manifest.json.tmp").exists());
        assert_eq!(DurableManifest::read_from_dir(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = DurableManifest::new(RawSchemaSpec::new(), Vec::new(), 0);
        manifest.format_version = 9;
        manifest.write_to_dir(dir.path()).unwrap();
        let err = DurableManifest::read_from_dir(dir.path()).unwrap_err();
        assert_eq!(err.code(), "STRATA_MATERIALIZE_MANIFEST");
    }

    #[test]
    fn test_missing_manifest_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = DurableManifest::read_from_dir(dir.path()).unwrap_err();
        assert_eq!(err.code(), "STRATA_MATERIALIZE_IO");
    }
}
