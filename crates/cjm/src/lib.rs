#![forbid(unsafe_code)]

//! `cjm` converts customer journey markup into Excalidraw/Unidraw scenes and back, and merges
//! several markup documents into one annotated procedure graph.
//!
//! The model types of `cjm-core` are re-exported at the crate root. [`Error`] and [`Result`]
//! at the root are the facade's own and wrap every stage's error; the core ones stay
//! reachable as `cjm_core::Error`.
//!
//! ```no_run
//! let converter = cjm::Converter::default();
//! let scene = converter.convert_str(r#"{"markup_type": "service", "procedures": []}"#)?;
//! let back = converter.import(&scene)?;
//! assert!(back.report.is_clean());
//! # Ok::<(), cjm::Error>(())
//! ```

pub use cjm_core::*;

pub mod pipeline;
pub mod ports;

pub mod layout {
    pub use cjm_layout::{LayoutConfig, LayoutPlan, layout};
}

pub mod render {
    pub use cjm_render::{
        Excalidraw, ImportReport, ImportWarning, Imported, RenderOptions, Scene, SceneFormat,
        Unidraw, WarningKind, build_scene, format_for_document, format_named, import_document,
    };
}

use cjm_layout::LayoutConfig;
use cjm_render::{Excalidraw, Imported, RenderOptions, SceneFormat, format_named};
use pipeline::MergedScene;
use ports::{DocumentImporter, FormatSerializer, GridLayout, MarkupRepository};
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cjm_core::Error),
    #[error(transparent)]
    Render(#[from] cjm_render::Error),
    #[error("no markup document `{key}`")]
    MissingMarkup { key: String },
    #[error("failed to read `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Every stage's options in one place, read once from a [`CjmConfig`].
///
/// All work is synchronous and CPU-bound; a converter can be shared freely between threads.
#[derive(Clone)]
pub struct Converter {
    pub model: ModelOptions,
    pub layout: LayoutConfig,
    pub render: RenderOptions,
    pub merge: MergeOptions,
    pub format: &'static dyn SceneFormat,
}

static DEFAULT_FORMAT: Excalidraw = Excalidraw;

impl Default for Converter {
    fn default() -> Self {
        Self {
            model: ModelOptions::default(),
            layout: LayoutConfig::default(),
            render: RenderOptions::default(),
            merge: MergeOptions::default(),
            format: &DEFAULT_FORMAT,
        }
    }
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `model.*`, `layout.*`, `render.*` and `merge.*`; `render.format` picks the scene
    /// dialect. Bad values fail here, before any document is touched.
    pub fn from_config(config: &CjmConfig) -> Result<Self> {
        let format = match config.get_str("render.format") {
            Some(name) => format_named(name)?,
            None => &DEFAULT_FORMAT,
        };
        Ok(Self {
            model: ModelOptions::from_config(config),
            layout: LayoutConfig::from_config(config)?,
            render: RenderOptions::from_config(config)?,
            merge: MergeOptions::from_config(config)?,
            format,
        })
    }

    pub fn with_format(mut self, format: &'static dyn SceneFormat) -> Self {
        self.format = format;
        self
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout::new(self.layout)
    }

    pub fn serializer(&self) -> FormatSerializer {
        FormatSerializer::new(self.format, self.render.clone())
    }

    pub fn convert(&self, markup: &Markup) -> Result<serde_json::Value> {
        pipeline::forward(markup, &self.model, &self.grid_layout(), &self.serializer())
    }

    /// Parses markup text (JSON with `//` comments) and converts it.
    pub fn convert_str(&self, text: &str) -> Result<serde_json::Value> {
        self.convert(&parse_markup(text)?)
    }

    pub fn import(&self, document: &serde_json::Value) -> Result<Imported> {
        pipeline::reverse(document, &DocumentImporter)
    }

    pub fn merge(
        &self,
        repository: &dyn MarkupRepository,
        selection: &MergeSelection,
    ) -> Result<MergedScene> {
        pipeline::merge(
            repository,
            selection,
            self.merge,
            &self.model,
            &self.grid_layout(),
            &self.serializer(),
        )
    }
}
