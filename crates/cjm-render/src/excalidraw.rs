//! Excalidraw dialect: flat `x`/`y`/`width`/`height` elements with metadata under
//! `customData.cjm`.

use crate::format::{SceneFormat, binding_target, elements_of, str_field};
use crate::meta::METADATA_KEY;
use crate::scene::{ElementKind, RawElement, RawKind, Scene, SceneElement, ShapeKind, palette};
use crate::{Result, SOURCE};
use serde_json::{Map, Value, json};

const BINDING_GAP: f64 = 8.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Excalidraw;

impl SceneFormat for Excalidraw {
    fn name(&self) -> &'static str {
        "excalidraw"
    }

    /// Connectors come first so the editor draws them under the shapes they bind.
    fn encode(&self, scene: &Scene) -> Value {
        let (connectors, rest): (Vec<&SceneElement>, Vec<&SceneElement>) =
            scene.elements.iter().partition(|e| e.is_connector());
        let elements: Vec<Value> = connectors.into_iter().chain(rest).map(element).collect();
        json!({
            "type": "excalidraw",
            "version": 2,
            "source": SOURCE,
            "elements": elements,
            "appState": {
                "viewBackgroundColor": palette::BACKGROUND,
                "gridSize": null,
                "currentItemFontFamily": 1,
                "currentItemFontSize": 20,
                "currentItemStrokeColor": palette::STROKE,
            },
            "files": {},
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
                "rectangle" => RawKind::Rectangle,
                "ellipse" => RawKind::Ellipse,
                "text" => RawKind::Text,
                "arrow" => RawKind::Arrow,
                other => RawKind::Other(other.to_string()),
            };
            let mut raw = RawElement::new(str_field(el, "id").unwrap_or_default(), kind);
            raw.name = str_field(el, "name");
            raw.text = match raw.kind {
                RawKind::Text => str_field(el, "originalText").or_else(|| str_field(el, "text")),
                RawKind::Arrow => str_field(el, "text").or_else(|| str_field(el, "label")),
                _ => None,
            };
            raw.frame_id = str_field(el, "frameId");
            raw.container_id = str_field(el, "containerId");
            raw.start_binding = binding_target(el, "startBinding");
            raw.end_binding = binding_target(el, "endBinding");
            raw.meta = el
                .get("customData")
                .and_then(|c| c.get(METADATA_KEY))
                .cloned();
            out.push(raw);
        }
        Ok(out)
    }
}

fn element(e: &SceneElement) -> Value {
    let mut m = Map::new();
    m.insert("id".into(), json!(e.id.to_string()));
    m.insert("type".into(), json!(type_name(&e.kind)));
    m.insert("x".into(), json!(e.bounds.origin.x));
    m.insert("y".into(), json!(e.bounds.origin.y));
    m.insert("width".into(), json!(e.bounds.size.width));
    m.insert("height".into(), json!(e.bounds.size.height));
    m.insert("angle".into(), json!(0));
    m.insert("strokeColor".into(), json!(e.style.stroke_color));
    m.insert("backgroundColor".into(), json!(e.style.background_color));
    m.insert("fillStyle".into(), json!(e.style.fill_style.as_str()));
    m.insert("strokeWidth".into(), json!(e.style.stroke_width));
    m.insert("strokeStyle".into(), json!(e.style.stroke_style.as_str()));
    m.insert("roughness".into(), json!(0));
    m.insert("opacity".into(), json!(100));
    m.insert(
        "groupIds".into(),
        json!(e.group_ids.iter().map(|g| g.to_string()).collect::<Vec<_>>()),
    );
    m.insert("frameId".into(), json!(e.frame_id.map(|f| f.to_string())));
    m.insert("roundness".into(), Value::Null);
    m.insert("seed".into(), json!(e.id.seed()));
    m.insert("version".into(), json!(1));
    m.insert("versionNonce".into(), json!(e.id.version_nonce()));
    m.insert("isDeleted".into(), json!(false));
    m.insert(
        "boundElements".into(),
        json!(
            e.bound_elements
                .iter()
                .map(|(id, kind)| json!({"id": id.to_string(), "type": kind.as_str()}))
                .collect::<Vec<_>>()
        ),
    );
    m.insert("locked".into(), json!(false));
    m.insert("link".into(), json!(e.link));

    match &e.kind {
        ElementKind::Frame { name } => {
            m.insert("name".into(), json!(name));
            m.insert("nameFontSize".into(), json!(28));
        }
        ElementKind::Shape(_) => {}
        ElementKind::Text(t) => {
            m.insert("text".into(), json!(t.text));
            m.insert("originalText".into(), json!(t.text));
            m.insert("fontSize".into(), json!(t.font_size));
            m.insert("fontFamily".into(), json!(1));
            m.insert("textAlign".into(), json!(t.align.as_str()));
            m.insert("verticalAlign".into(), json!("middle"));
            m.insert("baseline".into(), json!(e.bounds.size.height / 2.0));
            m.insert("lineHeight".into(), json!(1.35));
            m.insert(
                "containerId".into(),
                json!(t.container_id.map(|c| c.to_string())),
            );
        }
        ElementKind::Line { points } => {
            m.insert(
                "points".into(),
                json!(points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()),
            );
            m.insert("startBinding".into(), Value::Null);
            m.insert("endBinding".into(), Value::Null);
            m.insert("startArrowhead".into(), Value::Null);
            m.insert("endArrowhead".into(), Value::Null);
        }
        ElementKind::Connector(c) => {
            m.insert(
                "points".into(),
                json!(c.points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()),
            );
            let roundness = if c.curved { 3 } else { 2 };
            m.insert("roundness".into(), json!({ "type": roundness }));
            let binding = |target: Option<cjm_core::StableId>| match target {
                Some(id) => json!({"elementId": id.to_string(), "focus": 0.0, "gap": BINDING_GAP}),
                None => Value::Null,
            };
            m.insert("startBinding".into(), binding(c.start_binding));
            m.insert("endBinding".into(), binding(c.end_binding));
            m.insert("startArrowhead".into(), Value::Null);
            m.insert("endArrowhead".into(), json!("arrow"));
            m.insert("label".into(), json!(c.label));
            let visible = if c.show_label { c.label.as_str() } else { "" };
            m.insert("text".into(), json!(visible));
        }
    }

    m.insert(
        "customData".into(),
        json!({ METADATA_KEY: e.meta.to_value() }),
    );
    Value::Object(m)
}

fn type_name(kind: &ElementKind) -> &'static str {
    match kind {
        ElementKind::Frame { .. } => "frame",
        ElementKind::Shape(ShapeKind::Rectangle) => "rectangle",
        ElementKind::Shape(ShapeKind::Ellipse) => "ellipse",
        ElementKind::Text(_) => "text",
        ElementKind::Connector(_) => "arrow",
        ElementKind::Line { .. } => "line",
    }
}
