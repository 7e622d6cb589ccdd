//! Content-addressed snapshot storage.
//!
//! Grounded on the original `create_snapshot`: a single archive per
//! `(workflow_id, version_tag, snapshot_id)` containing `metadata.json`,
//! each artifact under `artifacts/`, and an optional
//! `state_checkpoint.json`. Written with `zip` the way the original writes
//! a `zipfile.ZipFile`, under a directory tree keyed the same way.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: Uuid,
    pub workflow_id: String,
    pub version_tag: String,
    pub artifact_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: Uuid,
    pub workflow_id: String,
    pub version_tag: String,
    pub storage_path: PathBuf,
    pub metadata: SnapshotMetadata,
}

/// Writes snapshot archives under `root/<workflow_id>/<version_tag>/`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn create_snapshot(
        &self,
        workflow_id: &str,
        version_tag: &str,
        artifacts: &BTreeMap<String, Vec<u8>>,
        state_checkpoint: Option<&serde_json::Value>,
    ) -> std::io::Result<Snapshot> {
        let snapshot_id = Uuid::new_v4();
        let metadata = SnapshotMetadata {
            snapshot_id,
            workflow_id: workflow_id.to_string(),
            version_tag: version_tag.to_string(),
            artifact_names: artifacts.keys().cloned().collect(),
        };

        let dir = self.root.join(workflow_id).join(version_tag);
        std::fs::create_dir_all(&dir)?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let zip_path = dir.join(format!("{}_{}.zip", timestamp, snapshot_id));
        write_archive(&zip_path, &metadata, artifacts, state_checkpoint)?;

        Ok(Snapshot {
            snapshot_id,
            workflow_id: workflow_id.to_string(),
            version_tag: version_tag.to_string(),
            storage_path: zip_path,
            metadata,
        })
    }
}

fn write_archive(
    path: &Path,
    metadata: &SnapshotMetadata,
    artifacts: &BTreeMap<String, Vec<u8>>,
    state_checkpoint: Option<&serde_json::Value>,
) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<()> = FileOptions::default();

    zip.start_file("metadata.json", options)?;
    zip.write_all(serde_json::to_string_pretty(metadata)?.as_bytes())?;

    for (name, content) in artifacts {
        zip.start_file(format!("artifacts/{}", name), options)?;
        zip.write_all(content)?;
    }

    if let Some(checkpoint) = state_checkpoint {
        zip.start_file("state_checkpoint.json", options)?;
        zip.write_all(serde_json::to_string_pretty(checkpoint)?.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}
