//! Seams between the pipelines and the stages they drive.
//!
//! The pipelines in [`crate::pipeline`] only see these traits, so a host can swap the grid
//! layout, the scene dialect or where markup comes from without touching the pipeline code.

use crate::{Error, Result};
use cjm_core::{GraphModel, Markup, parse_markup};
use cjm_layout::{LayoutConfig, LayoutPlan};
use cjm_render::{Imported, RenderOptions, SceneFormat, build_scene, import_document};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub trait LayoutPort {
    fn layout(&self, model: &GraphModel) -> LayoutPlan;
}

pub trait SceneSerializer {
    /// Name of the produced dialect (`excalidraw`, `unidraw`).
    fn format_name(&self) -> &str;

    fn serialize(&self, model: &GraphModel, plan: &LayoutPlan) -> Value;
}

pub trait SceneImporter {
    fn import(&self, document: &Value) -> Result<Imported>;
}

/// Source of markup documents, addressed by key.
pub trait MarkupRepository {
    /// Every key, in the order documents should be merged.
    fn keys(&self) -> Result<Vec<String>>;

    fn load(&self, key: &str) -> Result<Markup>;

    fn load_all(&self) -> Result<Vec<Markup>> {
        self.keys()?.iter().map(|key| self.load(key)).collect()
    }
}

/// [`cjm_layout::layout`] with a fixed configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridLayout {
    pub config: LayoutConfig,
}

impl GridLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }
}

impl LayoutPort for GridLayout {
    fn layout(&self, model: &GraphModel) -> LayoutPlan {
        cjm_layout::layout(model, &self.config)
    }
}

/// Builds the neutral scene and encodes it with one [`SceneFormat`].
#[derive(Clone)]
pub struct FormatSerializer {
    pub format: &'static dyn SceneFormat,
    pub options: RenderOptions,
}

impl FormatSerializer {
    pub fn new(format: &'static dyn SceneFormat, options: RenderOptions) -> Self {
        Self { format, options }
    }
}

impl SceneSerializer for FormatSerializer {
    fn format_name(&self) -> &str {
        self.format.name()
    }

    fn serialize(&self, model: &GraphModel, plan: &LayoutPlan) -> Value {
        self.format.encode(&build_scene(model, plan, &self.options))
    }
}

/// Imports any supported dialect, detected per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentImporter;

impl SceneImporter for DocumentImporter {
    fn import(&self, document: &Value) -> Result<Imported> {
        Ok(import_document(document)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryRepository {
    documents: IndexMap<String, Markup>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys each document by its `team::service` key.
    pub fn from_markups(markups: impl IntoIterator<Item = Markup>) -> Self {
        let mut repository = Self::new();
        for markup in markups {
            repository.insert(markup.service_key(), markup);
        }
        repository
    }

    pub fn insert(&mut self, key: impl Into<String>, markup: Markup) -> Option<Markup> {
        self.documents.insert(key.into(), markup)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl MarkupRepository for InMemoryRepository {
    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }

    fn load(&self, key: &str) -> Result<Markup> {
        self.documents
            .get(key)
            .cloned()
            .ok_or_else(|| Error::MissingMarkup {
                key: key.to_string(),
            })
    }
}

/// `*.json` markup files of one directory, keyed by file stem in name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRepository {
    root: PathBuf,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl MarkupRepository for DirectoryRepository {
    fn keys(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| Error::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut keys: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn load(&self, key: &str) -> Result<Markup> {
        let path = self.path_of(key);
        if !path.is_file() {
            return Err(Error::MissingMarkup {
                key: key.to_string(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        Ok(parse_markup(&text)?)
    }
}
