#![forbid(unsafe_code)]

//! Scene serializers and importer for customer journey markup.
//!
//! Forward: [`build::build_scene`] turns a laid-out model into a neutral [`Scene`], and a
//! [`SceneFormat`] ([`Excalidraw`], [`Unidraw`]) encodes it. Reverse: the same format decodes
//! a document into raw elements and [`import::import_elements`] rebuilds the markup.

pub mod build;
pub mod excalidraw;
pub mod format;
pub mod import;
pub mod links;
pub mod meta;
pub mod scene;
pub mod text;
pub mod unidraw;

pub use build::build_scene;
pub use excalidraw::Excalidraw;
pub use format::{SceneFormat, format_for_document, format_named};
pub use import::{ImportReport, ImportWarning, Imported, WarningKind, import_document};
pub use links::LinkTemplates;
pub use meta::{DocumentMeta, ElementMeta, Role};
pub use scene::{RawElement, RawKind, Scene, SceneElement};
pub use unidraw::Unidraw;

use crate::text::{DeterministicTextMeasurer, MIN_FONT_SIZE, TextMeasurer};
use cjm_core::CjmConfig;
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value of the `source` field of every produced document.
pub const SOURCE: &str = "cjm-ui-convertor";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cjm_core::Error),
    #[error("scene JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid scene document: {message}")]
    InvalidScene { message: String },
    #[error("unsupported scene format `{name}`")]
    UnsupportedFormat { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct RenderOptions {
    pub text_measurer: Arc<dyn TextMeasurer + Send + Sync>,
    /// Largest caption size for block labels; captions shrink down to `min_font_size`.
    pub block_font_size: f64,
    pub marker_font_size: f64,
    pub min_font_size: f64,
    /// Emit the `[markup_type] service` title panel above the diagram.
    pub title: bool,
    /// Move the scene so the first frame's centre sits at the origin.
    pub recenter: bool,
    pub links: LinkTemplates,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            text_measurer: Arc::new(DeterministicTextMeasurer::default()),
            block_font_size: 20.0,
            marker_font_size: 20.0,
            min_font_size: MIN_FONT_SIZE,
            title: true,
            recenter: true,
            links: LinkTemplates::default(),
        }
    }
}

impl RenderOptions {
    /// Reads `render.*` overrides; missing keys keep their defaults.
    pub fn from_config(config: &CjmConfig) -> cjm_core::Result<Self> {
        let d = Self::default();
        let size = |key: &str, default: f64| -> cjm_core::Result<f64> {
            match config.get(key) {
                None => Ok(default),
                Some(raw) => raw
                    .as_f64()
                    .filter(|v| v.is_finite() && *v >= 1.0)
                    .ok_or_else(|| cjm_core::Error::InvalidConfig {
                        key: key.to_string(),
                        message: "expected a font size of at least 1".to_string(),
                    }),
            }
        };
        let options = Self {
            block_font_size: size("render.block_font_size", d.block_font_size)?,
            marker_font_size: size("render.marker_font_size", d.marker_font_size)?,
            min_font_size: size("render.min_font_size", d.min_font_size)?,
            title: config.get_bool("render.title").unwrap_or(d.title),
            recenter: config.get_bool("render.recenter").unwrap_or(d.recenter),
            links: LinkTemplates {
                procedure: config.get_str("render.links.procedure").map(str::to_string),
                block: config.get_str("render.links.block").map(str::to_string),
            },
            ..d
        };
        if options.min_font_size > options.block_font_size.min(options.marker_font_size) {
            return Err(cjm_core::Error::InvalidConfig {
                key: "render.min_font_size".to_string(),
                message: "must not exceed the block and marker font sizes".to_string(),
            });
        }
        Ok(options)
    }
}
