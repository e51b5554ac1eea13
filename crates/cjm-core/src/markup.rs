//! Markup text I/O and canonical form.

use crate::error::{Error, Result};
use crate::model::{Adjacency, EndSpec, Markup, Procedure};
use indexmap::IndexMap;

/// Parses markup JSON. `//` line comments outside string literals are accepted; anything
/// strict JSON rejects after that is retried as JSON5 (trailing commas, single quotes).
pub fn parse_markup(text: &str) -> Result<Markup> {
    let stripped = strip_line_comments(text);
    match serde_json::from_str::<Markup>(&stripped) {
        Ok(markup) => Ok(markup),
        Err(strict) => {
            tracing::debug!(error = %strict, "markup is not strict JSON, retrying as JSON5");
            json5::from_str::<Markup>(&stripped).map_err(|_| Error::Json {
                message: strict.to_string(),
            })
        }
    }
}

pub fn markup_from_value(value: serde_json::Value) -> Result<Markup> {
    serde_json::from_value(value).map_err(|e| Error::Json {
        message: e.to_string(),
    })
}

pub fn markup_to_value(markup: &Markup) -> serde_json::Value {
    // Every field serializes to plain JSON types, so this cannot fail.
    serde_json::to_value(markup).unwrap_or(serde_json::Value::Null)
}

pub fn markup_to_string_pretty(markup: &Markup) -> Result<String> {
    serde_json::to_string_pretty(markup).map_err(|e| Error::Json {
        message: e.to_string(),
    })
}

fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for rest in chars.by_ref() {
                    if rest == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

impl Markup {
    /// Canonical form used to compare documents: unordered collections sorted and
    /// deduplicated, end specs spelled canonically, empty adjacency entries dropped.
    ///
    /// End specs are folded per block with [`EndType::combine`](crate::model::EndType::combine)
    /// first, so `["c", "c::exit"]` and `["c::all"]` normalize to the same markup. A scene
    /// draws one end marker per block and imports back as the combined spelling.
    ///
    /// Procedure order is kept; it drives layout.
    pub fn normalized(&self) -> Markup {
        let mut out = self.clone();
        out.procedure_graph = normalize_adjacency(self.procedure_graph.as_ref())
            .filter(|graph| !graph.is_empty());
        out.procedure_meta.sort_keys();
        for procedure in &mut out.procedures {
            normalize_procedure(procedure);
        }
        out
    }
}

fn normalize_procedure(procedure: &mut Procedure) {
    procedure.start_block_ids.sort();
    procedure.start_block_ids.dedup();

    let mut ends: Vec<String> = match procedure.end_specs() {
        Ok(specs) => specs.iter().map(EndSpec::to_markup).collect(),
        // Invalid specs are left for validation to report.
        Err(_) => procedure.end_block_ids.clone(),
    };
    ends.sort();
    ends.dedup();
    procedure.end_block_ids = ends;

    procedure.branches = normalize_adjacency(Some(&procedure.branches)).unwrap_or_default();
    procedure.block_graph =
        normalize_adjacency(procedure.block_graph.as_ref()).filter(|graph| !graph.is_empty());
    procedure.block_id_to_block_name.sort_keys();
    if procedure.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        procedure.name = None;
    }
}

fn normalize_adjacency(adjacency: Option<&Adjacency>) -> Option<Adjacency> {
    let adjacency = adjacency?;
    let mut out: Adjacency = IndexMap::new();
    for (source, targets) in adjacency {
        let mut targets = targets.clone();
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            continue;
        }
        out.insert(source.clone(), targets);
    }
    out.sort_keys();
    Some(out)
}
