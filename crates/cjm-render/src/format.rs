use crate::excalidraw::Excalidraw;
use crate::scene::{RawElement, Scene};
use crate::unidraw::Unidraw;
use crate::{Error, Result};
use serde_json::Value;

/// One concrete scene dialect.
///
/// Encoding cannot fail: every [`Scene`] is representable. Decoding reduces a document to
/// [`RawElement`]s and only fails when the document has no element list at all.
pub trait SceneFormat: Send + Sync {
    /// Value of the document's `type` field.
    fn name(&self) -> &'static str;

    fn encode(&self, scene: &Scene) -> Value;

    fn decode(&self, document: &Value) -> Result<Vec<RawElement>>;
}

static EXCALIDRAW: Excalidraw = Excalidraw;
static UNIDRAW: Unidraw = Unidraw;

pub fn format_named(name: &str) -> Result<&'static dyn SceneFormat> {
    match name.trim().to_ascii_lowercase().as_str() {
        "excalidraw" => Ok(&EXCALIDRAW),
        "unidraw" => Ok(&UNIDRAW),
        _ => Err(Error::UnsupportedFormat {
            name: name.to_string(),
        }),
    }
}

/// Picks the dialect from the document's `type`; untyped documents are recognised by the
/// Unidraw `position` field on their first element.
pub fn format_for_document(document: &Value) -> Result<&'static dyn SceneFormat> {
    if let Some(name) = document.get("type").and_then(Value::as_str) {
        return format_named(name);
    }
    let unidraw_like = document
        .get("elements")
        .and_then(Value::as_array)
        .and_then(|els| els.first())
        .is_some_and(|el| el.get("position").is_some());
    Ok(if unidraw_like { &UNIDRAW } else { &EXCALIDRAW })
}

pub(crate) fn elements_of(document: &Value) -> Result<&Vec<Value>> {
    document
        .get("elements")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidScene {
            message: "missing `elements` array".to_string(),
        })
}

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn binding_target(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|b| str_field(b, "elementId"))
}
