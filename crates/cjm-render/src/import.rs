//! Scene document → markup.
//!
//! Every element goes through a chain of resolvers, first match wins:
//!
//! 1. embedded metadata (trusted as-is),
//! 2. frame containment (shapes and free text inside a known frame become blocks, ellipses
//!    become markers by their caption),
//! 3. the diagram title (`[markup_type] service`) for elements outside every frame.
//!
//! Connectors are resolved afterwards from their metadata, their label and the elements they
//! bind. Whatever cannot be placed is dropped and recorded in the [`ImportReport`].
//!
//! Summary panels and component separators are recognised by their metadata only; without
//! it they are reported as unresolved.
//!
//! A block carries a single end marker, so a block listed under several end types comes back
//! as their combination (`c` plus `c::exit` imports as `c::all`). Compare imports against
//! [`Markup::normalized`], which folds end specs the same way.

use crate::format::format_for_document;
use crate::meta::{DocumentMeta, ElementMeta, Role, SCHEMA_VERSION};
use crate::scene::{RawElement, RawKind};
use crate::Result;
use cjm_core::model::{Adjacency, EndSpec, EndType, Markup, Procedure, ProcedureMeta};
use cjm_core::EdgeKind;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap as HashMap;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// An element carries a metadata payload that does not parse.
    UnreadableMetadata,
    /// Metadata written by another schema version; read best-effort.
    SchemaVersion,
    /// Neither metadata nor geometry places the element.
    UnresolvedElement,
    /// A connector whose kind is neither recorded nor inferable.
    UnknownEdgeType,
    /// A connector missing one of its bindings.
    UnboundConnector,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnreadableMetadata => "unreadable_metadata",
            Self::SchemaVersion => "schema_version",
            Self::UnresolvedElement => "unresolved_element",
            Self::UnknownEdgeType => "unknown_edge_type",
            Self::UnboundConnector => "unbound_connector",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportWarning {
    pub element_id: String,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.element_id, self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    pub markup: Markup,
    pub report: ImportReport,
}

/// Detects the dialect of `document`, decodes it and rebuilds the markup.
pub fn import_document(document: &Value) -> Result<Imported> {
    let format = format_for_document(document)?;
    let elements = format.decode(document)?;
    Ok(import_elements(&elements))
}

/// Rebuilds the markup from already decoded elements. Never fails; problems end up in the
/// report.
pub fn import_elements(elements: &[RawElement]) -> Imported {
    let mut importer = Importer::new(elements);
    importer.read_metadata();
    importer.frames();
    importer.nodes();
    importer.connectors();
    let imported = importer.finish();
    tracing::debug!(
        elements = elements.len(),
        procedures = imported.markup.procedures.len(),
        warnings = imported.report.warnings.len(),
        "imported scene"
    );
    imported
}

/// What a shape, marker or frame element stands for.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Frame {
        procedure: String,
    },
    Block {
        procedure: String,
        block: String,
        name: Option<String>,
    },
    StartMarker {
        procedure: String,
        block: Option<String>,
    },
    EndMarker {
        procedure: String,
        end_type: EndType,
    },
}

impl Node {
    fn procedure(&self) -> &str {
        match self {
            Self::Frame { procedure }
            | Self::Block { procedure, .. }
            | Self::StartMarker { procedure, .. }
            | Self::EndMarker { procedure, .. } => procedure,
        }
    }

    fn block(&self) -> Option<&str> {
        match self {
            Self::Block { block, .. } => Some(block),
            _ => None,
        }
    }
}

enum Resolution {
    Node(Node),
    Title {
        markup_type: String,
        service_name: Option<String>,
    },
    /// Deliberately ignored (labels, metadata-only roles).
    Skip,
    /// Not this resolver's business; ask the next one.
    Pass,
}

/// Lookup tables the resolvers read.
struct Context<'a> {
    /// Container element id → text of its bound label.
    labels: HashMap<&'a str, &'a str>,
    /// Frame element id → procedure id.
    frames: HashMap<&'a str, String>,
}

impl Context<'_> {
    fn frame_procedure(&self, raw: &RawElement) -> Option<&str> {
        raw.frame_id
            .as_deref()
            .and_then(|f| self.frames.get(f))
            .map(String::as_str)
    }

    /// Own text, else the text bound to the element.
    fn caption<'e>(&'e self, raw: &'e RawElement) -> Option<&'e str> {
        raw.text
            .as_deref()
            .or_else(|| self.labels.get(raw.id.as_str()).copied())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

trait Resolver: Sync {
    fn resolve(&self, cx: &Context<'_>, raw: &RawElement, meta: Option<&ElementMeta>) -> Resolution;
}

struct MetadataResolver;

impl Resolver for MetadataResolver {
    fn resolve(&self, cx: &Context<'_>, raw: &RawElement, meta: Option<&ElementMeta>) -> Resolution {
        let Some(meta) = meta else {
            return Resolution::Pass;
        };
        match meta.role {
            Role::BlockLabel | Role::MarkerLabel | Role::DiagramTitle | Role::Frame | Role::Edge => {
                return Resolution::Skip;
            }
            role if role.is_decoration() => return Resolution::Skip,
            _ => {}
        }
        let Some(procedure) = meta
            .procedure_id
            .clone()
            .or_else(|| cx.frame_procedure(raw).map(str::to_string))
        else {
            return Resolution::Pass;
        };
        let node = match meta.role {
            Role::Block => {
                let Some(block) = meta.block_id.clone() else {
                    return Resolution::Pass;
                };
                Node::Block {
                    procedure,
                    block,
                    name: meta.block_name.clone(),
                }
            }
            Role::StartMarker => Node::StartMarker {
                procedure,
                block: meta.block_id.clone(),
            },
            _ => {
                let Some(end_type) = meta.end_type else {
                    return Resolution::Pass;
                };
                Node::EndMarker {
                    procedure,
                    end_type,
                }
            }
        };
        Resolution::Node(node)
    }
}

struct ContainmentResolver;

impl Resolver for ContainmentResolver {
    fn resolve(&self, cx: &Context<'_>, raw: &RawElement, _meta: Option<&ElementMeta>) -> Resolution {
        if raw.kind == RawKind::Text && raw.container_id.is_some() {
            return Resolution::Skip;
        }
        let (Some(procedure), Some(caption)) = (cx.frame_procedure(raw), cx.caption(raw)) else {
            return Resolution::Pass;
        };
        let procedure = procedure.to_string();
        // Undo the line breaks label fitting inserted.
        let caption = caption.split_whitespace().collect::<Vec<_>>().join(" ");
        let node = match raw.kind {
            RawKind::Rectangle | RawKind::Text => Node::Block {
                procedure,
                block: caption,
                name: None,
            },
            RawKind::Ellipse if caption.to_ascii_uppercase().starts_with("START") => {
                Node::StartMarker {
                    procedure,
                    block: None,
                }
            }
            RawKind::Ellipse => match end_type_for_caption(&caption) {
                Some(end_type) => Node::EndMarker {
                    procedure,
                    end_type,
                },
                None => return Resolution::Pass,
            },
            _ => return Resolution::Pass,
        };
        Resolution::Node(node)
    }
}

struct TitleResolver;

impl Resolver for TitleResolver {
    fn resolve(&self, cx: &Context<'_>, raw: &RawElement, _meta: Option<&ElementMeta>) -> Resolution {
        if raw.frame_id.is_some() {
            return Resolution::Pass;
        }
        match cx.caption(raw).and_then(parse_title) {
            Some((markup_type, service_name)) => Resolution::Title {
                markup_type,
                service_name,
            },
            None => Resolution::Pass,
        }
    }
}

static RESOLVERS: [&dyn Resolver; 3] = [&MetadataResolver, &ContainmentResolver, &TitleResolver];

#[derive(Debug, Default)]
struct ProcedureDraft {
    name: Option<String>,
    starts: IndexSet<String>,
    ends: IndexSet<String>,
    branches: Adjacency,
    block_graph: Adjacency,
    superseded_branches: Option<Adjacency>,
    block_names: IndexMap<String, String>,
    meta: Option<ProcedureMeta>,
}

struct Importer<'a> {
    elements: &'a [RawElement],
    metas: Vec<Option<ElementMeta>>,
    cx: Context<'a>,
    nodes: HashMap<&'a str, Node>,
    drafts: IndexMap<String, ProcedureDraft>,
    procedure_graph: Adjacency,
    title_meta: Option<ElementMeta>,
    first_document: Option<DocumentMeta>,
    plain_title: Option<(String, Option<String>)>,
    report: ImportReport,
}

impl<'a> Importer<'a> {
    fn new(elements: &'a [RawElement]) -> Self {
        Self {
            elements,
            metas: Vec::with_capacity(elements.len()),
            cx: Context {
                labels: HashMap::default(),
                frames: HashMap::default(),
            },
            nodes: HashMap::default(),
            drafts: IndexMap::new(),
            procedure_graph: Adjacency::new(),
            title_meta: None,
            first_document: None,
            plain_title: None,
            report: ImportReport::default(),
        }
    }

    fn warn(&mut self, element_id: &str, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(element = element_id, kind = kind.as_str(), "{message}");
        self.report.warnings.push(ImportWarning {
            element_id: element_id.to_string(),
            kind,
            message,
        });
    }

    fn draft(&mut self, procedure: &str) -> &mut ProcedureDraft {
        self.drafts.entry(procedure.to_string()).or_default()
    }

    fn read_metadata(&mut self) {
        let elements = self.elements;
        let mut foreign_schema = false;
        for raw in elements {
            let meta = match &raw.meta {
                None => None,
                Some(value) => {
                    let parsed = ElementMeta::from_value(value);
                    if parsed.is_none() {
                        self.warn(
                            &raw.id,
                            WarningKind::UnreadableMetadata,
                            "embedded metadata could not be read; using geometry instead",
                        );
                    }
                    parsed
                }
            };
            if let Some(meta) = &meta {
                if !meta.is_current_schema() && !foreign_schema {
                    foreign_schema = true;
                    let message = format!(
                        "metadata schema version `{}` differs from `{SCHEMA_VERSION}`; reading best-effort",
                        meta.document.schema_version
                    );
                    self.warn(&raw.id, WarningKind::SchemaVersion, message);
                }
                if meta.role == Role::DiagramTitle && self.title_meta.is_none() {
                    self.title_meta = Some(meta.clone());
                }
                if self.first_document.is_none() {
                    self.first_document = Some(meta.document.clone());
                }
            }
            if raw.kind == RawKind::Text {
                if let (Some(container), Some(text)) = (&raw.container_id, &raw.text) {
                    self.cx.labels.insert(container.as_str(), text.as_str());
                }
            }
            self.metas.push(meta);
        }
    }

    /// Frames first: containment of everything else depends on them.
    fn frames(&mut self) {
        let elements = self.elements;
        for (i, raw) in elements.iter().enumerate() {
            if raw.kind != RawKind::Frame {
                continue;
            }
            let meta = self.metas[i].clone().filter(|m| m.role == Role::Frame);
            let identity = match meta.as_ref().and_then(|m| m.procedure_id.clone()) {
                Some(id) => Some((id, meta.as_ref().and_then(|m| m.procedure_name.clone()))),
                None => raw.name.as_deref().and_then(split_frame_title),
            };
            let Some((procedure, name)) = identity else {
                self.warn(
                    &raw.id,
                    WarningKind::UnresolvedElement,
                    "frame has neither metadata nor a title",
                );
                continue;
            };
            self.cx.frames.insert(raw.id.as_str(), procedure.clone());
            self.nodes.insert(
                raw.id.as_str(),
                Node::Frame {
                    procedure: procedure.clone(),
                },
            );
            let draft = self.draft(&procedure);
            if draft.name.is_none() {
                draft.name = name;
            }
            if let Some(meta) = meta {
                if meta.branches.is_some() {
                    draft.superseded_branches = meta.branches;
                }
                if meta.procedure_meta.is_some() {
                    draft.meta = meta.procedure_meta;
                }
            }
        }
    }

    fn nodes(&mut self) {
        let elements = self.elements;
        for (i, raw) in elements.iter().enumerate() {
            if matches!(raw.kind, RawKind::Frame | RawKind::Arrow) {
                continue;
            }
            let meta = self.metas[i].as_ref();
            let resolution = RESOLVERS
                .iter()
                .map(|r| r.resolve(&self.cx, raw, meta))
                .find(|r| !matches!(r, Resolution::Pass))
                .unwrap_or(Resolution::Pass);
            match resolution {
                Resolution::Node(node) => self.add_node(raw, node),
                Resolution::Title {
                    markup_type,
                    service_name,
                } => {
                    if self.plain_title.is_none() {
                        self.plain_title = Some((markup_type, service_name));
                    }
                }
                Resolution::Skip => {}
                Resolution::Pass => {
                    let message = match &raw.kind {
                        RawKind::Other(kind) => format!("unsupported element type `{kind}`"),
                        _ => "element could not be placed in any procedure".to_string(),
                    };
                    self.warn(&raw.id, WarningKind::UnresolvedElement, message);
                }
            }
        }
    }

    fn add_node(&mut self, raw: &'a RawElement, node: Node) {
        let draft = self.draft(node.procedure());
        match &node {
            Node::Block { block, name, .. } => {
                if let Some(name) = name.as_ref().filter(|n| !n.trim().is_empty()) {
                    draft.block_names.insert(block.clone(), name.clone());
                }
            }
            Node::StartMarker {
                block: Some(block), ..
            } => {
                draft.starts.insert(block.clone());
            }
            _ => {}
        }
        self.nodes.insert(raw.id.as_str(), node);
    }

    fn connectors(&mut self) {
        let elements = self.elements;
        for (i, raw) in elements.iter().enumerate() {
            if raw.kind != RawKind::Arrow {
                continue;
            }
            let meta = self.metas[i].clone().filter(|m| m.role == Role::Edge);
            if meta.as_ref().is_some_and(|m| m.implicit) {
                continue;
            }
            let bound = |id: &Option<String>| id.as_deref().and_then(|id| self.nodes.get(id)).cloned();
            let source = bound(&raw.start_binding);
            let target = bound(&raw.end_binding);

            let kind = meta
                .as_ref()
                .and_then(|m| m.edge_type)
                .or_else(|| raw.text.as_deref().and_then(EdgeKind::parse))
                .or_else(|| infer_kind(source.as_ref(), target.as_ref()));
            let Some(kind) = kind else {
                if source.is_none() || target.is_none() {
                    self.warn(
                        &raw.id,
                        WarningKind::UnboundConnector,
                        "connector is not bound on both ends and has no edge type",
                    );
                } else {
                    self.warn(
                        &raw.id,
                        WarningKind::UnknownEdgeType,
                        "connector kind cannot be inferred from its label or endpoints",
                    );
                }
                continue;
            };

            let edge = ConnectorEdge {
                meta: meta.as_ref(),
                source: source.as_ref(),
                target: target.as_ref(),
            };
            if !self.apply_edge(kind, &edge) {
                let kind = if source.is_none() || target.is_none() {
                    WarningKind::UnboundConnector
                } else {
                    WarningKind::UnresolvedElement
                };
                let message = "connector endpoints could not be resolved";
                self.warn(&raw.id, kind, message);
            }
        }
    }

    /// Records one resolved connector; `false` when its endpoints stay unknown.
    fn apply_edge(&mut self, kind: EdgeKind, edge: &ConnectorEdge<'_>) -> bool {
        match kind {
            EdgeKind::Start => {
                let (Some(procedure), Some(block)) = (
                    edge.procedure(),
                    edge.target_block().or_else(|| match edge.source {
                        Some(Node::StartMarker { block, .. }) => block.clone(),
                        _ => None,
                    }),
                ) else {
                    return false;
                };
                self.draft(&procedure).starts.insert(block);
            }
            EdgeKind::End => {
                let end_type = edge.meta.and_then(|m| m.end_type).or(match edge.target {
                    Some(Node::EndMarker { end_type, .. }) => Some(*end_type),
                    _ => None,
                });
                let (Some(procedure), Some(block), Some(end_type)) =
                    (edge.procedure(), edge.source_block(), end_type)
                else {
                    return false;
                };
                let spec = EndSpec::new(block, end_type).to_markup();
                self.draft(&procedure).ends.insert(spec);
            }
            EdgeKind::Branch
            | EdgeKind::BranchCycle
            | EdgeKind::BlockGraph
            | EdgeKind::BlockGraphCycle => {
                let (Some(procedure), Some(source), Some(target)) =
                    (edge.procedure(), edge.source_block(), edge.target_block())
                else {
                    return false;
                };
                let draft = self.draft(&procedure);
                let adjacency = if kind.base() == EdgeKind::Branch {
                    &mut draft.branches
                } else {
                    &mut draft.block_graph
                };
                link(adjacency, source, target);
            }
            EdgeKind::ProcedureGraph | EdgeKind::ProcedureGraphCycle => {
                let target = edge
                    .meta
                    .and_then(|m| m.target_procedure_id.clone())
                    .or_else(|| edge.target.map(|n| n.procedure().to_string()));
                let (Some(source), Some(target)) = (edge.procedure(), target) else {
                    return false;
                };
                link(&mut self.procedure_graph, source, target);
            }
        }
        true
    }

    fn finish(self) -> Imported {
        let document = self
            .title_meta
            .as_ref()
            .map(|m| m.document.clone())
            .or(self.first_document)
            .unwrap_or_default();

        let mut markup = Markup::new(document.markup_type);
        markup.finedog_unit_id = document.finedog_unit_id;
        markup.service_name = document.service_name;
        markup.team_id = document.team_id;
        markup.team_name = document.team_name;
        if let Some((markup_type, service_name)) = self.plain_title {
            if markup.markup_type.is_empty() {
                markup.markup_type = markup_type;
            }
            if markup.service_name.is_none() {
                markup.service_name = service_name;
            }
        }

        let has_procedure_graph = self
            .title_meta
            .as_ref()
            .is_some_and(|m| m.has_procedure_graph);
        markup.finedog_unit_meta = self
            .title_meta
            .and_then(|m| m.finedog_unit_meta)
            .unwrap_or_else(Map::new);
        if has_procedure_graph || !self.procedure_graph.is_empty() {
            markup.procedure_graph = Some(self.procedure_graph);
        }

        for (id, draft) in self.drafts {
            if let Some(meta) = draft.meta {
                markup.procedure_meta.insert(id.clone(), meta);
            }
            let has_block_graph = draft.superseded_branches.is_some() || !draft.block_graph.is_empty();
            let mut branches = draft.superseded_branches.unwrap_or_default();
            for (source, targets) in draft.branches {
                for target in targets {
                    link(&mut branches, source.clone(), target);
                }
            }
            markup.procedures.push(Procedure {
                id,
                name: draft.name,
                start_block_ids: draft.starts.into_iter().collect(),
                end_block_ids: draft.ends.into_iter().collect(),
                branches,
                block_graph: has_block_graph.then_some(draft.block_graph),
                block_id_to_block_name: draft.block_names,
            });
        }

        Imported {
            markup,
            report: self.report,
        }
    }
}

/// A connector with its endpoints resolved as far as possible.
struct ConnectorEdge<'e> {
    meta: Option<&'e ElementMeta>,
    source: Option<&'e Node>,
    target: Option<&'e Node>,
}

impl ConnectorEdge<'_> {
    /// Metadata, then the bound source, then the bound target.
    fn procedure(&self) -> Option<String> {
        self.meta
            .and_then(|m| m.procedure_id.clone())
            .or_else(|| self.source.map(|n| n.procedure().to_string()))
            .or_else(|| self.target.map(|n| n.procedure().to_string()))
    }

    fn source_block(&self) -> Option<String> {
        self.meta
            .and_then(|m| m.source_block_id.clone())
            .or_else(|| self.source.and_then(Node::block).map(str::to_string))
    }

    fn target_block(&self) -> Option<String> {
        self.meta
            .and_then(|m| m.target_block_id.clone())
            .or_else(|| self.target.and_then(Node::block).map(str::to_string))
    }
}

fn infer_kind(source: Option<&Node>, target: Option<&Node>) -> Option<EdgeKind> {
    let kind = match (source?, target?) {
        (Node::StartMarker { .. }, Node::Block { .. }) => EdgeKind::Start,
        (Node::Block { .. }, Node::EndMarker { .. }) => EdgeKind::End,
        (Node::Frame { .. }, Node::Frame { .. }) => EdgeKind::ProcedureGraph,
        (a @ Node::Block { .. }, b @ Node::Block { .. }) => {
            if a.procedure() == b.procedure() {
                EdgeKind::Branch
            } else {
                EdgeKind::BlockGraph
            }
        }
        _ => return None,
    };
    Some(kind)
}

fn link(adjacency: &mut Adjacency, source: String, target: String) {
    let targets = adjacency.entry(source).or_default();
    if !targets.contains(&target) {
        targets.push(target);
    }
}

/// End type of a marker caption (`END & EXIT` reads as `all`) or of a raw end type name.
fn end_type_for_caption(caption: &str) -> Option<EndType> {
    EndType::ORDERED
        .into_iter()
        .find(|t| t.label().eq_ignore_ascii_case(caption.trim()))
        .or_else(|| EndType::parse(caption))
}

/// `name (id)` → (`id`, `Some(name)`); anything else is the id itself.
fn split_frame_title(title: &str) -> Option<(String, Option<String>)> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let split = title
        .strip_suffix(')')
        .and_then(|rest| rest.rfind(" (").map(|at| (&rest[..at], &rest[at + 2..])))
        .filter(|(name, id)| !name.trim().is_empty() && !id.trim().is_empty());
    Some(match split {
        Some((name, id)) => (id.trim().to_string(), Some(name.trim().to_string())),
        None => (title.to_string(), None),
    })
}

/// `[markup_type] service` → (`markup_type`, `Some(service)`).
fn parse_title(text: &str) -> Option<(String, Option<String>)> {
    let rest = text.trim().strip_prefix('[')?;
    let (markup_type, service) = rest.split_once(']')?;
    let service = service.trim();
    Some((
        markup_type.trim().to_string(),
        (!service.is_empty()).then(|| service.to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_titles_split_into_name_and_id() {
        assert_eq!(
            split_frame_title("Intake (p1)"),
            Some(("p1".to_string(), Some("Intake".to_string())))
        );
        assert_eq!(split_frame_title("p1"), Some(("p1".to_string(), None)));
        assert_eq!(split_frame_title("(p1)"), Some(("(p1)".to_string(), None)));
        assert_eq!(split_frame_title("  "), None);
    }

    #[test]
    fn marker_captions_map_to_end_types() {
        assert_eq!(end_type_for_caption("END"), Some(EndType::End));
        assert_eq!(end_type_for_caption("END & EXIT"), Some(EndType::All));
        assert_eq!(end_type_for_caption("turn out"), Some(EndType::TurnOut));
        assert_eq!(end_type_for_caption("postpone"), Some(EndType::Postpone));
        assert_eq!(end_type_for_caption("finish"), None);
    }

    #[test]
    fn titles_parse_type_and_service() {
        assert_eq!(
            parse_title("[service] Loans"),
            Some(("service".to_string(), Some("Loans".to_string())))
        );
        assert_eq!(parse_title("[service]"), Some(("service".to_string(), None)));
        assert_eq!(parse_title("Loans"), None);
    }
}
