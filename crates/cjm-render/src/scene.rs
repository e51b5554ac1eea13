//! Format-neutral scene graph.
//!
//! [`crate::build::build_scene`] produces a [`Scene`]; every [`crate::SceneFormat`] encodes
//! the same scene into its own JSON dialect, and decodes its dialect back into
//! [`RawElement`]s for the importer.

use crate::meta::ElementMeta;
use cjm_core::geom::{Point, Rect, Vector, vector};
use cjm_core::StableId;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeStyle {
    Solid,
    Dashed,
}

impl StrokeStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStyle {
    Solid,
    Hachure,
}

impl FillStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Hachure => "hachure",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub stroke_color: String,
    pub background_color: String,
    pub fill_style: FillStyle,
    pub stroke_width: f64,
    pub stroke_style: StrokeStyle,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke_color: palette::STROKE.to_string(),
            background_color: palette::TRANSPARENT.to_string(),
            fill_style: FillStyle::Solid,
            stroke_width: 1.0,
            stroke_style: StrokeStyle::Solid,
        }
    }
}

pub mod palette {
    use cjm_core::EndType;

    pub const STROKE: &str = "#1e1e1e";
    pub const TRANSPARENT: &str = "transparent";
    pub const BLOCK: &str = "#cce5ff";
    pub const START_BLOCK: &str = "#d3f9d8";
    pub const INTERMEDIATE_BLOCK: &str = "#ffe8cc";
    pub const START_MARKER: &str = "#d1ffd6";
    pub const CYCLE: &str = "#d32f2f";
    pub const BACKGROUND: &str = "#ffffff";
    pub const TITLE_PANEL: &str = "#eef3ff";
    pub const TITLE_STROKE: &str = "#34445b";
    pub const SEPARATOR: &str = "#9e9e9e";
    pub const SCENARIO_PANEL: &str = "#f7f3ea";
    pub const SCENARIO_STROKE: &str = "#c7bba3";
    pub const PROCEDURES_PANEL: &str = "#e9f0fb";
    pub const PROCEDURES_STROKE: &str = "#7a8aa8";

    pub fn end_marker(end_type: EndType) -> &'static str {
        match end_type {
            EndType::End => "#d1ffd6",
            EndType::Exit => "#ffd8a8",
            EndType::All => "#ffc9c9",
            EndType::Intermediate => "#fff3bf",
            EndType::Postpone => "#e5dbff",
            EndType::TurnOut => "#ffec99",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Center,
    Left,
}

impl TextAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Left => "left",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextContent {
    pub text: String,
    pub font_size: f64,
    pub container_id: Option<StableId>,
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    /// Route relative to the element origin; the bounding box of the points starts at zero.
    pub points: Vec<Vector>,
    pub start_binding: Option<StableId>,
    pub end_binding: Option<StableId>,
    pub label: String,
    /// Whether the label is drawn on the connector.
    pub show_label: bool,
    /// Smooth curve through the points rather than rounded corners.
    pub curved: bool,
}

impl Connector {
    pub fn first_point(&self) -> Vector {
        self.points.first().copied().unwrap_or_else(|| vector(0.0, 0.0))
    }

    pub fn last_point(&self) -> Vector {
        self.points.last().copied().unwrap_or_else(|| vector(0.0, 0.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Frame { name: String },
    Shape(ShapeKind),
    Text(TextContent),
    Connector(Connector),
    /// Unbound polyline; points are relative to the element origin like a connector's.
    Line { points: Vec<Vector> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Arrow,
    Text,
}

impl BoundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arrow => "arrow",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneElement {
    pub id: StableId,
    pub kind: ElementKind,
    pub bounds: Rect,
    pub style: Style,
    pub frame_id: Option<StableId>,
    pub group_ids: Vec<StableId>,
    /// Connectors and texts attached to this element.
    pub bound_elements: Vec<(StableId, BoundKind)>,
    /// Hyperlink opened from the element.
    pub link: Option<String>,
    pub meta: ElementMeta,
}

impl SceneElement {
    pub fn is_connector(&self) -> bool {
        matches!(self.kind, ElementKind::Connector(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub elements: Vec<SceneElement>,
}

impl Scene {
    pub fn get(&self, id: StableId) -> Option<&SceneElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn translate(&mut self, by: Vector) {
        for element in &mut self.elements {
            element.bounds.origin += by;
        }
    }

    /// Absolute start and end point of a connector element.
    pub fn connector_ends(element: &SceneElement) -> Option<(Point, Point)> {
        let ElementKind::Connector(c) = &element.kind else {
            return None;
        };
        Some((
            element.bounds.origin + c.first_point(),
            element.bounds.origin + c.last_point(),
        ))
    }
}

/// Element kinds the importer distinguishes, whatever the scene dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind {
    Frame,
    Rectangle,
    Ellipse,
    Text,
    Arrow,
    Other(String),
}

/// One element of a decoded scene document, reduced to what import needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub id: String,
    pub kind: RawKind,
    /// Frame title.
    pub name: Option<String>,
    /// Plain text of a text element, or the visible label of a connector.
    pub text: Option<String>,
    pub frame_id: Option<String>,
    pub container_id: Option<String>,
    pub start_binding: Option<String>,
    pub end_binding: Option<String>,
    /// Embedded metadata object, if any.
    pub meta: Option<Value>,
}

impl RawElement {
    pub fn new(id: impl Into<String>, kind: RawKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            text: None,
            frame_id: None,
            container_id: None,
            start_binding: None,
            end_binding: None,
            meta: None,
        }
    }
}
