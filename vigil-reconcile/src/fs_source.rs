//! Source of truth backed by snapshot files.
//!
//! Each `<home>/.vigil/source/<collection>.json` holds a flat object mapping
//! member ids to their current attribute (or `null`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{io_err, json_err, ReconcileError};
use crate::store::{CollectionId, Member, MemberId, SourceOfTruth};

/// `~/.vigil/source/`
pub fn source_dir_at(home: &Path) -> PathBuf {
    vigil_core::config::vigil_root(home).join("source")
}

#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn open_at(home: &Path) -> Self {
        Self::new(source_dir_at(home))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SourceOfTruth for DirectorySource {
    fn list_collections(&self) -> Result<Vec<CollectionId>, ReconcileError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(CollectionId::from(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn list_members(&self, collection: &CollectionId) -> Result<Vec<Member>, ReconcileError> {
        let path = self.dir.join(format!("{collection}.json"));
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let snapshot: BTreeMap<String, Option<String>> =
            serde_json::from_str(&contents).map_err(|e| json_err(&path, e))?;
        Ok(snapshot
            .into_iter()
            .map(|(id, value)| Member {
                id: MemberId(id),
                value,
            })
            .collect())
    }
}
