//! Unidraw dialect: `position`/`size` elements, compact `style` keys, `line` connectors with
//! `tipPoints`, HTML paragraph text and metadata under a top-level `cjm` key.
//!
//! No timestamps are written, so encoding the same scene twice gives identical documents.

use crate::format::{SceneFormat, elements_of, str_field};
use crate::meta::METADATA_KEY;
use crate::scene::{ElementKind, RawElement, RawKind, Scene, SceneElement, ShapeKind, palette};
use crate::{Result, SOURCE};
use cjm_core::geom::{Point, Vector};
use serde_json::{Map, Value, json};

const FONT_FAMILY: &str = "Virgil";

#[derive(Debug, Clone, Copy, Default)]
pub struct Unidraw;

impl SceneFormat for Unidraw {
    fn name(&self) -> &'static str {
        "unidraw"
    }

    fn encode(&self, scene: &Scene) -> Value {
        let elements: Vec<Value> = scene
            .elements
            .iter()
            .enumerate()
            .map(|(z, e)| element(e, z + 1))
            .collect();
        json!({
            "type": "unidraw",
            "version": 1,
            "source": SOURCE,
            "elements": elements,
            "appState": {
                "viewBackgroundColor": palette::BACKGROUND,
                "gridSize": null,
            },
        })
    }

    fn decode(&self, document: &Value) -> Result<Vec<RawElement>> {
        let mut out = Vec::new();
        for el in elements_of(document)? {
            if el.get("isDeleted").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            let type_name = el.get("type").and_then(Value::as_str).unwrap_or_default();
            let kind = match type_name {
                "frame" => RawKind::Frame,
                "shape" => match el.get("shape").and_then(Value::as_str) {
                    Some("ellipse") => RawKind::Ellipse,
                    Some("rectangle") | None => RawKind::Rectangle,
                    Some(other) => RawKind::Other(other.to_string()),
                },
                "text" => RawKind::Text,
                "line" if el.get("lineType").and_then(Value::as_str) == Some("arrow") => {
                    RawKind::Arrow
                }
                other => RawKind::Other(other.to_string()),
            };
            let mut raw = RawElement::new(str_field(el, "id").unwrap_or_default(), kind);
            raw.name = str_field(el, "name");
            raw.text = match raw.kind {
                RawKind::Text => el.get("text").and_then(Value::as_str).map(html_to_text),
                RawKind::Arrow => el
                    .get("text")
                    .and_then(Value::as_str)
                    .map(html_to_text)
                    .filter(|t| !t.is_empty())
                    .or_else(|| str_field(el, "label")),
                _ => None,
            };
            raw.frame_id = str_field(el, "frameId");
            raw.container_id = str_field(el, "containerId");
            if let Some(tips) = el.get("tipPoints").and_then(Value::as_array) {
                let target = |tip: Option<&Value>| {
                    tip.and_then(|t| t.get("binding"))
                        .and_then(|b| str_field(b, "elementId"))
                };
                raw.start_binding = target(tips.first());
                raw.end_binding = target(tips.last().filter(|_| tips.len() > 1));
            }
            raw.meta = el.get(METADATA_KEY).cloned();
            out.push(raw);
        }
        Ok(out)
    }
}

fn element(e: &SceneElement, z_index: usize) -> Value {
    let mut m = Map::new();
    m.insert("id".into(), json!(e.id.to_string()));
    m.insert("type".into(), json!(type_name(&e.kind)));
    m.insert(
        "position".into(),
        json!({"x": e.bounds.origin.x, "y": e.bounds.origin.y}),
    );
    m.insert(
        "size".into(),
        json!({"width": e.bounds.size.width, "height": e.bounds.size.height}),
    );
    m.insert("rotation".into(), json!(0));
    m.insert("alpha".into(), json!(1.0));
    m.insert("schema".into(), json!(2));
    m.insert("zIndex".into(), json!(z_index));
    m.insert("isDeleted".into(), json!(false));
    m.insert("locked".into(), json!(false));
    m.insert(
        "groupIds".into(),
        json!(e.group_ids.iter().map(|g| g.to_string()).collect::<Vec<_>>()),
    );
    m.insert("frameId".into(), json!(e.frame_id.map(|f| f.to_string())));
    if let Some(link) = &e.link {
        m.insert("link".into(), json!(link));
    }

    let mut style = Map::new();
    match &e.kind {
        ElementKind::Frame { name } => {
            m.insert("name".into(), json!(name));
            style.insert("sc".into(), json!(e.style.stroke_color));
            style.insert("fc".into(), json!(e.style.background_color));
            style.insert("sw".into(), json!(e.style.stroke_width));
        }
        ElementKind::Shape(shape) => {
            let tag = match shape {
                ShapeKind::Rectangle => "rectangle",
                ShapeKind::Ellipse => "ellipse",
            };
            m.insert("shape".into(), json!(tag));
            style.insert("sc".into(), json!(e.style.stroke_color));
            style.insert("fc".into(), json!(e.style.background_color));
            style.insert("sw".into(), json!(e.style.stroke_width));
            style.insert("ss".into(), json!(e.style.stroke_style.as_str()));
        }
        ElementKind::Text(t) => {
            m.insert("text".into(), json!(text_to_html(&t.text)));
            m.insert(
                "containerId".into(),
                json!(t.container_id.map(|c| c.to_string())),
            );
            style.insert("tc".into(), json!(e.style.stroke_color));
            style.insert("tff".into(), json!(FONT_FAMILY));
            style.insert("tfs".into(), json!(t.font_size));
            style.insert("ta".into(), json!(t.align.as_str()));
        }
        ElementKind::Line { points } => {
            m.insert(
                "points".into(),
                json!(points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()),
            );
            m.insert("lineType".into(), json!("line"));
            style.insert("sc".into(), json!(e.style.stroke_color));
            style.insert("sw".into(), json!(e.style.stroke_width));
            style.insert("ss".into(), json!(e.style.stroke_style.as_str()));
        }
        ElementKind::Connector(c) => {
            let origin = e.bounds.origin;
            let start = origin + c.first_point();
            let end = origin + c.last_point();
            let normal = unit(end - start);
            m.insert(
                "points".into(),
                json!(c.points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()),
            );
            m.insert(
                "tipPoints".into(),
                json!([
                    tip_point(start, -normal, c.start_binding),
                    tip_point(end, normal, c.end_binding),
                ]),
            );
            let visible = if c.show_label { c.label.as_str() } else { "" };
            m.insert("text".into(), json!(text_to_html(visible)));
            m.insert("label".into(), json!(c.label));
            m.insert("lineType".into(), json!("arrow"));
            m.insert("endArrowhead".into(), json!("arrow"));
            style.insert("sc".into(), json!(e.style.stroke_color));
            style.insert("sw".into(), json!(e.style.stroke_width));
            style.insert("ss".into(), json!(e.style.stroke_style.as_str()));
        }
    }
    m.insert("style".into(), Value::Object(style));
    m.insert(METADATA_KEY.into(), e.meta.to_value());
    Value::Object(m)
}

fn type_name(kind: &ElementKind) -> &'static str {
    match kind {
        ElementKind::Frame { .. } => "frame",
        ElementKind::Shape(_) => "shape",
        ElementKind::Text(_) => "text",
        ElementKind::Connector(_) | ElementKind::Line { .. } => "line",
    }
}

fn unit(v: Vector) -> Vector {
    let length = v.length();
    if length == 0.0 { v } else { v / length }
}

fn tip_point(at: Point, normal: Vector, binding: Option<cjm_core::StableId>) -> Value {
    let mut tip = json!({
        "position": {"x": at.x, "y": at.y},
        "normal": {"x": normal.x, "y": normal.y},
    });
    if let (Some(id), Some(obj)) = (binding, tip.as_object_mut()) {
        obj.insert("binding".into(), json!({"elementId": id.to_string()}));
    }
    tip
}

/// One `<p>` per line, HTML-escaped.
pub fn text_to_html(text: &str) -> String {
    if text.is_empty() {
        return "<p></p>".to_string();
    }
    text.lines()
        .map(|line| format!("<p>{}</p>", htmlize::escape_text(line)))
        .collect()
}

/// Inverse of [`text_to_html`]; markup-free input is only unescaped.
pub fn html_to_text(html: &str) -> String {
    if !html.contains("<p>") {
        return htmlize::unescape(html).into_owned();
    }
    html.split("</p>")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let body = chunk.trim_start().trim_start_matches("<p>");
            htmlize::unescape(body).into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
