//! Serde model of a customer journey markup document.
//!
//! The structs mirror the JSON wire format one-to-one. Derived views (block ownership, end
//! marker groups, effective procedure edges) live in [`crate::graph`].

use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub type Adjacency = IndexMap<String, Vec<String>>;

/// Identifier that may be spelled as a JSON string or number (`finedog_unit_id`, `team_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Number(serde_json::Number),
    Text(String),
}

impl ExternalId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) if !s.trim().is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    #[serde(default)]
    pub markup_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finedog_unit_id: Option<ExternalId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub finedog_unit_meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<ExternalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_graph: Option<Adjacency>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub procedure_meta: IndexMap<String, ProcedureMeta>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

impl Markup {
    pub fn new(markup_type: impl Into<String>) -> Self {
        Self {
            markup_type: markup_type.into(),
            ..Self::default()
        }
    }

    pub fn procedure(&self, id: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.id == id)
    }

    pub fn procedure_ids(&self) -> Vec<&str> {
        self.procedures.iter().map(|p| p.id.as_str()).collect()
    }

    /// `service_name`, falling back to `finedog_unit_meta.service_name`.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name
            .as_deref()
            .or_else(|| self.finedog_unit_meta.get("service_name")?.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn team_id(&self) -> Option<ExternalId> {
        self.team_id.clone().or_else(|| {
            self.finedog_unit_meta
                .get("team_id")
                .and_then(ExternalId::from_value)
        })
    }

    pub fn team_name(&self) -> Option<&str> {
        self.team_name
            .as_deref()
            .or_else(|| self.finedog_unit_meta.get("team_name")?.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// `team::service` key identifying the graph this document describes.
    pub fn service_key(&self) -> String {
        let team = self
            .team_name()
            .map(str::to_string)
            .or_else(|| self.team_id().map(|id| id.to_string()))
            .unwrap_or_else(|| "Unknown team".to_string());
        let service = self.service_name().unwrap_or("Unknown service");
        format!("{team}::{service}")
    }

    /// Explicit procedure adjacency; an absent graph reads as empty.
    pub fn procedure_adjacency(&self) -> Adjacency {
        self.procedure_graph.clone().unwrap_or_default()
    }

    pub fn block_count(&self) -> usize {
        self.procedures.iter().map(|p| p.referenced_block_ids().len()).sum()
    }
}

/// Annotations the merge builder attaches to each procedure of a merged document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_procedure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_intersection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_chain: Vec<String>,
    /// Procedures folded into a service-graph node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_stats: Option<GraphStats>,
}

/// Start, branch and end counts summed over the procedures of a service-graph node.
/// Postponed ends are counted apart from the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub start: usize,
    pub branch: usize,
    pub end: usize,
    pub postpone: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    #[serde(rename = "proc_id", alias = "procedure_id")]
    pub id: String,
    #[serde(
        rename = "proc_name",
        alias = "procedure_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default)]
    pub start_block_ids: Vec<String>,
    /// Raw `block` or `block::end_type` strings; see [`Procedure::end_specs`].
    #[serde(default)]
    pub end_block_ids: Vec<String>,
    #[serde(default)]
    pub branches: Adjacency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_graph: Option<Adjacency>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub block_id_to_block_name: IndexMap<String, String>,
}

impl Procedure {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parsed end specifications, one per block. A block listed with several end types gets
    /// their [`EndType::combine`].
    pub fn end_specs(&self) -> Result<Vec<EndSpec>> {
        let mut out: IndexMap<String, EndType> = IndexMap::new();
        for raw in &self.end_block_ids {
            let spec = EndSpec::parse(&self.id, raw)?;
            out.entry(spec.block_id)
                .and_modify(|t| *t = t.combine(spec.end_type))
                .or_insert(spec.end_type);
        }
        Ok(out
            .into_iter()
            .map(|(block_id, end_type)| EndSpec { block_id, end_type })
            .collect())
    }

    /// Block ids this procedure mentions, except block-graph targets, in first-reference
    /// order: starts, branch keys and targets, block-graph keys, ends.
    ///
    /// Block-graph targets may point into another procedure, so ownership of those is decided
    /// by [`crate::graph::GraphModel`].
    pub fn referenced_block_ids(&self) -> IndexSet<&str> {
        let mut out: IndexSet<&str> = IndexSet::new();
        out.extend(self.start_block_ids.iter().map(String::as_str));
        for (key, targets) in &self.branches {
            out.insert(key);
            out.extend(targets.iter().map(String::as_str));
        }
        if let Some(bg) = &self.block_graph {
            out.extend(bg.keys().map(String::as_str));
        }
        out.extend(self.end_block_ids.iter().map(|raw| EndSpec::block_part(raw)));
        out
    }

    pub fn block_name(&self, block_id: &str) -> Option<&str> {
        self.block_id_to_block_name
            .get(block_id)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// `proc_name (proc_id)` when a name is known, else the id.
    pub fn display_title(&self) -> String {
        match self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => format!("{name} ({})", self.id),
            None => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    End,
    Exit,
    All,
    Intermediate,
    Postpone,
    TurnOut,
}

impl EndType {
    pub const ORDERED: [EndType; 6] = [
        EndType::End,
        EndType::Exit,
        EndType::All,
        EndType::Intermediate,
        EndType::Postpone,
        EndType::TurnOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::End => "end",
            Self::Exit => "exit",
            Self::All => "all",
            Self::Intermediate => "intermediate",
            Self::Postpone => "postpone",
            Self::TurnOut => "turn_out",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ORDERED
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Marker caption.
    pub fn label(self) -> &'static str {
        match self {
            Self::End => "END",
            Self::Exit => "EXIT",
            Self::All | Self::Intermediate => "END & EXIT",
            Self::Postpone => "POSTPONE",
            Self::TurnOut => "TURN OUT",
        }
    }

    /// Everything but `intermediate` stops the journey at this block.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Intermediate)
    }

    /// End type of a block declared twice (merged procedures, repeated entries).
    ///
    /// `end` and `exit` together mean `all`; a terminal type wins over `intermediate`;
    /// otherwise the first declaration stands.
    pub fn combine(self, other: Self) -> Self {
        use EndType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (All, _) | (_, All) => All,
            (End, Exit) | (Exit, End) => All,
            (Intermediate, b) => b,
            (a, _) => a,
        }
    }
}

impl fmt::Display for EndType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndSpec {
    pub block_id: String,
    pub end_type: EndType,
}

impl EndSpec {
    pub const SEPARATOR: &'static str = "::";

    pub fn new(block_id: impl Into<String>, end_type: EndType) -> Self {
        Self {
            block_id: block_id.into(),
            end_type,
        }
    }

    /// Parses `block` (plain `end`) or `block::end_type`.
    pub fn parse(procedure: &str, raw: &str) -> Result<Self> {
        let (block, end_type) = match raw.split_once(Self::SEPARATOR) {
            None => (raw, EndType::End),
            Some((block, suffix)) => {
                let end_type = EndType::parse(suffix).ok_or_else(|| Error::InvalidEndSpec {
                    procedure: procedure.to_string(),
                    spec: raw.to_string(),
                })?;
                (block, end_type)
            }
        };
        let block = block.trim();
        if block.is_empty() {
            return Err(Error::EmptyIdentifier {
                procedure: procedure.to_string(),
                what: "end block",
            });
        }
        Ok(Self::new(block, end_type))
    }

    fn block_part(raw: &str) -> &str {
        raw.split_once(Self::SEPARATOR)
            .map(|(block, _)| block)
            .unwrap_or(raw)
            .trim()
    }

    /// Canonical markup spelling: plain `end` is written without a suffix.
    pub fn to_markup(&self) -> String {
        match self.end_type {
            EndType::End => self.block_id.clone(),
            t => format!("{}{}{}", self.block_id, Self::SEPARATOR, t.as_str()),
        }
    }
}
