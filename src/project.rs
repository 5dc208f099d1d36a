//! Project records keyed by the canonical path of their root map.
//!
//! The store is a plain JSON file in a caller-chosen folder; nothing is kept
//! process-wide. At most one project exists per canonical map path.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::reconcile::write_atomic;

const STORE_FILE: &str = "projects.json";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("a project already exists for {0}")]
    AlreadyExists(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: u64,
    pub name: String,
    /// Canonical path of the root map.
    pub map_path: PathBuf,
    pub source_lang: String,
    pub target_langs: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    projects: Vec<ProjectRecord>,
}

pub struct ProjectStore {
    path: PathBuf,
    data: StoreFile,
}

fn canonical_map(map: &Path) -> anyhow::Result<PathBuf> {
    map.canonicalize()
        .with_context(|| format!("map not found: {}", map.display()))
}

impl ProjectStore {
    /// Opens (or starts) the store in `dir`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(STORE_FILE);
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?
        } else {
            StoreFile {
                next_id: 1,
                projects: Vec::new(),
            }
        };
        Ok(Self { path, data })
    }

    fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(&self.data).context("serialize projects")?;
        write_atomic(&self.path, &json)
    }

    pub fn create(
        &mut self,
        map: &Path,
        source_lang: &str,
        target_langs: &[String],
    ) -> anyhow::Result<ProjectRecord> {
        let map_path = canonical_map(map)?;
        if self.data.projects.iter().any(|p| p.map_path == map_path) {
            return Err(ProjectError::AlreadyExists(map_path).into());
        }
        let name = map_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project")
            .to_string();
        let record = ProjectRecord {
            id: self.data.next_id.max(1),
            name,
            map_path,
            source_lang: source_lang.to_string(),
            target_langs: target_langs.to_vec(),
        };
        self.data.next_id = record.id + 1;
        self.data.projects.push(record.clone());
        self.save()?;
        log::info!("created project {} for {}", record.id, record.map_path.display());
        Ok(record)
    }

    pub fn find_by_map(&self, map: &Path) -> anyhow::Result<Option<&ProjectRecord>> {
        let map_path = canonical_map(map)?;
        Ok(self.data.projects.iter().find(|p| p.map_path == map_path))
    }

    pub fn get(&self, id: u64) -> Option<&ProjectRecord> {
        self.data.projects.iter().find(|p| p.id == id)
    }

    pub fn list(&self) -> &[ProjectRecord] {
        &self.data.projects
    }

    pub fn get_or_create(
        &mut self,
        map: &Path,
        source_lang: &str,
        target_langs: &[String],
    ) -> anyhow::Result<ProjectRecord> {
        if let Some(p) = self.find_by_map(map)? {
            return Ok(p.clone());
        }
        self.create(map, source_lang, target_langs)
    }
}
