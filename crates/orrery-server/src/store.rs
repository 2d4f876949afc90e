//! On-disk notebook persistence.
//!
//! Each notebook lives in `<dir>/<id>.json` as `{"cells": [...]}` next to
//! an `index.json` carrying metadata for all notebooks. A legacy
//! single-notebook `default.json` is migrated once on startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ServerResult;
use crate::protocol::Cell;

/// Metadata entry in the notebook index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookMeta {
    pub id: String,
    pub name: String,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    /// RFC 3339 UTC timestamp, bumped on every save.
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    notebooks: Vec<NotebookMeta>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NotebookFile {
    cells: Vec<Cell>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn generate_notebook_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("nb-{}", &hex[..8])
}

/// File-backed notebook store.
pub struct NotebookStore {
    dir: PathBuf,
    index: HashMap<String, NotebookMeta>,
}

impl NotebookStore {
    /// Open (or initialize) a store in `dir`, loading the index and
    /// migrating a legacy `default.json` if present.
    pub fn open(dir: impl AsRef<Path>) -> ServerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut store = Self {
            dir,
            index: HashMap::new(),
        };
        store.load_index();
        store.migrate_default()?;
        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn notebook_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn load_index(&mut self) {
        let path = self.index_path();
        if !path.exists() {
            return;
        }
        match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<IndexFile>(&text).map_err(|e| e.to_string()))
        {
            Ok(file) => {
                for meta in file.notebooks {
                    self.index.insert(meta.id.clone(), meta);
                }
            }
            Err(e) => tracing::warn!("failed to load notebook index: {e}"),
        }
    }

    fn save_index(&self) -> ServerResult<()> {
        let mut notebooks: Vec<NotebookMeta> = self.index.values().cloned().collect();
        notebooks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let file = IndexFile { notebooks };
        fs::write(self.index_path(), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// All notebooks, most recently updated first.
    pub fn list(&self) -> Vec<NotebookMeta> {
        let mut notebooks: Vec<NotebookMeta> = self.index.values().cloned().collect();
        notebooks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notebooks
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn meta(&self, id: &str) -> Option<&NotebookMeta> {
        self.index.get(id)
    }

    /// Create a new empty notebook.
    pub fn create(&mut self, name: &str) -> ServerResult<NotebookMeta> {
        let id = generate_notebook_id();
        let stamp = now();
        let meta = NotebookMeta {
            id: id.clone(),
            name: name.to_string(),
            created_at: stamp.clone(),
            updated_at: stamp,
        };

        fs::write(
            self.notebook_path(&id),
            serde_json::to_string_pretty(&NotebookFile::default())?,
        )?;

        self.index.insert(id, meta.clone());
        self.save_index()?;
        Ok(meta)
    }

    /// Delete a notebook file and its index entry. Returns whether it
    /// existed.
    pub fn delete(&mut self, id: &str) -> ServerResult<bool> {
        if self.index.remove(id).is_none() {
            return Ok(false);
        }
        let path = self.notebook_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        self.save_index()?;
        Ok(true)
    }

    /// Rename a notebook. Returns the updated metadata if it existed.
    pub fn rename(&mut self, id: &str, name: &str) -> ServerResult<Option<NotebookMeta>> {
        let Some(meta) = self.index.get_mut(id) else {
            return Ok(None);
        };
        meta.name = name.to_string();
        meta.updated_at = now();
        let updated = meta.clone();
        self.save_index()?;
        Ok(Some(updated))
    }

    /// Load a notebook's cells. Missing or corrupt files load as empty.
    pub fn load_cells(&self, id: &str) -> Vec<Cell> {
        let path = self.notebook_path(id);
        if !path.exists() {
            return Vec::new();
        }
        match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<NotebookFile>(&text).map_err(|e| e.to_string()))
        {
            Ok(file) => file.cells,
            Err(e) => {
                tracing::warn!("failed to load notebook {id}: {e}");
                Vec::new()
            }
        }
    }

    /// Save a notebook's cells and bump its updated_at.
    pub fn save_cells(&mut self, id: &str, cells: &[Cell]) -> ServerResult<()> {
        let file = NotebookFile {
            cells: cells.to_vec(),
        };
        fs::write(self.notebook_path(id), serde_json::to_string_pretty(&file)?)?;

        if let Some(meta) = self.index.get_mut(id) {
            meta.updated_at = now();
            self.save_index()?;
        }
        Ok(())
    }

    /// One-time migration of the legacy single-notebook `default.json`:
    /// its cells become a notebook named "Default Notebook" and the
    /// original file is kept with a `.backup` suffix.
    fn migrate_default(&mut self) -> ServerResult<()> {
        let default_path = self.dir.join("default.json");
        if !default_path.exists() || !self.index.is_empty() {
            return Ok(());
        }

        let data = fs::read_to_string(&default_path)?;
        let id = generate_notebook_id();
        let stamp = now();
        let meta = NotebookMeta {
            id: id.clone(),
            name: "Default Notebook".to_string(),
            created_at: stamp.clone(),
            updated_at: stamp,
        };

        fs::write(self.notebook_path(&id), data)?;
        fs::rename(&default_path, self.dir.join("default.json.backup"))?;

        self.index.insert(id.clone(), meta);
        self.save_index()?;
        tracing::info!("migrated default.json to notebook '{id}'");
        Ok(())
    }
}
