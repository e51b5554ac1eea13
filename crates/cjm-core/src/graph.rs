//! Validated, analysed view of one markup document.
//!
//! [`GraphModel`] resolves what the raw markup leaves implicit: which procedure owns each
//! block-graph target, which edges are drawn, which blocks end the journey without saying so,
//! and how procedures relate when no `procedure_graph` is given. Layout and serialization
//! both read from it, so they never disagree on those decisions.

use crate::config::CjmConfig;
use crate::error::Result;
use crate::model::{Adjacency, EndSpec, EndType, Markup, Procedure, ProcedureMeta};
use crate::validate::{ValidateOptions, validate_markup};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Every connector kind a scene can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Branch,
    BranchCycle,
    BlockGraph,
    BlockGraphCycle,
    #[serde(alias = "procedure_flow")]
    ProcedureGraph,
    #[serde(alias = "procedure_cycle")]
    ProcedureGraphCycle,
    Start,
    End,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::BranchCycle => "branch_cycle",
            Self::BlockGraph => "block_graph",
            Self::BlockGraphCycle => "block_graph_cycle",
            Self::ProcedureGraph => "procedure_graph",
            Self::ProcedureGraphCycle => "procedure_graph_cycle",
            Self::Start => "start",
            Self::End => "end",
        }
    }

    /// Accepts the serialized names plus the legacy `procedure_flow` / `procedure_cycle`.
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim() {
            "branch" => Self::Branch,
            "branch_cycle" => Self::BranchCycle,
            "block_graph" => Self::BlockGraph,
            "block_graph_cycle" => Self::BlockGraphCycle,
            "procedure_graph" | "procedure_flow" => Self::ProcedureGraph,
            "procedure_graph_cycle" | "procedure_cycle" => Self::ProcedureGraphCycle,
            "start" => Self::Start,
            "end" => Self::End,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_cycle(self) -> bool {
        matches!(
            self,
            Self::BranchCycle | Self::BlockGraphCycle | Self::ProcedureGraphCycle
        )
    }

    pub fn as_cycle(self) -> Self {
        match self {
            Self::Branch => Self::BranchCycle,
            Self::BlockGraph => Self::BlockGraphCycle,
            Self::ProcedureGraph => Self::ProcedureGraphCycle,
            other => other,
        }
    }

    /// Forward kind of a cycle kind; other kinds map to themselves.
    pub fn base(self) -> Self {
        match self {
            Self::BranchCycle => Self::Branch,
            Self::BlockGraphCycle => Self::BlockGraph,
            Self::ProcedureGraphCycle => Self::ProcedureGraph,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions {
    /// Synthesize `TURN OUT` markers for branch keys that do not terminate the journey.
    pub implicit_turn_out: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            implicit_turn_out: true,
        }
    }
}

impl ModelOptions {
    pub fn from_config(config: &CjmConfig) -> Self {
        Self {
            implicit_turn_out: config.implicit_turn_out(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockModel {
    pub id: String,
    pub name: Option<String>,
    /// Declared end type, if any.
    pub end_type: Option<EndType>,
    pub is_start: bool,
}

impl BlockModel {
    pub fn display_text(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A drawn block-to-block edge. `target_procedure` differs from the owner only for
/// block-graph links into another procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEdge {
    pub source: String,
    pub target: String,
    pub target_procedure: String,
    pub kind: EdgeKind,
    /// Position among the targets of `source`, and the number of those targets.
    pub ordinal: usize,
    pub sibling_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMember {
    pub block_id: String,
    /// Synthesized rather than declared in `end_block_ids`.
    pub implicit: bool,
}

/// All blocks of one procedure sharing an end type; rendered as a single marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndGroup {
    pub end_type: EndType,
    pub members: Vec<EndMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureModel {
    pub id: String,
    pub name: Option<String>,
    pub title: String,
    pub blocks: Vec<BlockModel>,
    pub start_block_ids: Vec<String>,
    pub end_specs: Vec<EndSpec>,
    pub edges: Vec<BlockEdge>,
    pub end_groups: Vec<EndGroup>,
    /// Branches not drawn because a block graph supersedes them.
    pub superseded_branches: Option<Adjacency>,
    pub meta: Option<ProcedureMeta>,
}

impl ProcedureModel {
    pub fn block(&self, id: &str) -> Option<&BlockModel> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn has_block(&self, id: &str) -> bool {
        self.block(id).is_some()
    }

    pub fn has_block_graph(&self) -> bool {
        self.superseded_branches.is_some()
    }

    /// Drawn edges that stay inside this procedure; these drive block leveling.
    pub fn local_edges(&self) -> impl Iterator<Item = &BlockEdge> {
        self.edges.iter().filter(|e| e.target_procedure == self.id)
    }

    pub fn cross_edges(&self) -> impl Iterator<Item = &BlockEdge> {
        self.edges.iter().filter(|e| e.target_procedure != self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureEdgeOrigin {
    /// Listed in `procedure_graph`; the only origin that survives an import.
    Explicit,
    /// Implied by a block-graph link into another procedure.
    Derived,
    /// Document order, used only when nothing else relates the procedures.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureEdge {
    pub source: String,
    pub target: String,
    pub origin: ProcedureEdgeOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphModel {
    pub markup: Markup,
    pub procedures: Vec<ProcedureModel>,
    /// Edges arranging procedures on the canvas. All share one origin.
    pub procedure_edges: Vec<ProcedureEdge>,
}

impl GraphModel {
    /// Validates `markup` and derives the model.
    pub fn build(markup: &Markup, options: &ModelOptions) -> Result<Self> {
        validate_markup(markup, ValidateOptions::strict())?;
        Self::build_validated(markup, options)
    }

    /// Like [`GraphModel::build`] but lets `procedure_graph` name procedures missing from
    /// the document; such edges are dropped.
    pub fn build_lenient(markup: &Markup, options: &ModelOptions) -> Result<Self> {
        validate_markup(markup, ValidateOptions::merge_input())?;
        Self::build_validated(markup, options)
    }

    fn build_validated(markup: &Markup, options: &ModelOptions) -> Result<Self> {
        let referenced: Vec<IndexSet<&str>> = markup
            .procedures
            .iter()
            .map(Procedure::referenced_block_ids)
            .collect();

        let mut owners: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (idx, blocks) in referenced.iter().enumerate() {
            for block in blocks {
                owners.entry(block).or_default().push(idx);
            }
        }

        let explicit_pairs: BTreeSet<(&str, &str)> = markup
            .procedure_graph
            .iter()
            .flatten()
            .flat_map(|(s, ts)| ts.iter().map(move |t| (s.as_str(), t.as_str())))
            .collect();

        let mut procedures = Vec::with_capacity(markup.procedures.len());
        for (idx, procedure) in markup.procedures.iter().enumerate() {
            let resolve = |target: &str| -> usize {
                if referenced[idx].contains(target) {
                    return idx;
                }
                let candidates: Vec<usize> = owners
                    .get(target)
                    .map(|c| c.iter().copied().filter(|&c| c != idx).collect())
                    .unwrap_or_default();
                resolve_owner(markup, idx, &candidates, &explicit_pairs)
            };
            procedures.push(build_procedure(markup, procedure, idx, &resolve, options)?);
        }

        let procedure_edges = effective_procedure_edges(markup, &procedures);

        tracing::debug!(
            procedures = procedures.len(),
            procedure_edges = procedure_edges.len(),
            "built graph model"
        );

        Ok(Self {
            markup: markup.clone(),
            procedures,
            procedure_edges,
        })
    }

    pub fn procedure(&self, id: &str) -> Option<&ProcedureModel> {
        self.procedures.iter().find(|p| p.id == id)
    }

    /// Number of start blocks across the document; more than one numbers the start markers.
    pub fn start_block_count(&self) -> usize {
        self.procedures
            .iter()
            .map(|p| p.start_block_ids.len())
            .sum()
    }

    pub fn explicit_procedure_edges(&self) -> impl Iterator<Item = &ProcedureEdge> {
        self.procedure_edges
            .iter()
            .filter(|e| e.origin == ProcedureEdgeOrigin::Explicit)
    }
}

/// Owner of a block-graph target that the source procedure does not mention itself.
///
/// A unique owner wins; with several, a direct `procedure_graph` link from the source is
/// preferred, then one into the source, then the smallest procedure id. Unknown targets stay
/// local to the source procedure.
fn resolve_owner(
    markup: &Markup,
    source_idx: usize,
    candidates: &[usize],
    explicit_pairs: &BTreeSet<(&str, &str)>,
) -> usize {
    let source_id = markup.procedures[source_idx].id.as_str();
    let id_of = |idx: usize| markup.procedures[idx].id.as_str();
    match candidates {
        [] => source_idx,
        [only] => *only,
        _ => candidates
            .iter()
            .copied()
            .find(|&c| explicit_pairs.contains(&(source_id, id_of(c))))
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&c| explicit_pairs.contains(&(id_of(c), source_id)))
            })
            .or_else(|| candidates.iter().copied().min_by_key(|&c| id_of(c)))
            .unwrap_or(source_idx),
    }
}

fn build_procedure(
    markup: &Markup,
    procedure: &Procedure,
    idx: usize,
    resolve: &dyn Fn(&str) -> usize,
    options: &ModelOptions,
) -> Result<ProcedureModel> {
    let end_specs = procedure.end_specs()?;
    let declared_end: IndexMap<&str, EndType> = end_specs
        .iter()
        .map(|s| (s.block_id.as_str(), s.end_type))
        .collect();

    // Block order: starts, branch keys and targets, block-graph keys and local targets,
    // ends, named blocks.
    let mut order: IndexSet<&str> = IndexSet::new();
    order.extend(procedure.start_block_ids.iter().map(String::as_str));
    for (key, targets) in &procedure.branches {
        order.insert(key);
        order.extend(targets.iter().map(String::as_str));
    }
    if let Some(bg) = &procedure.block_graph {
        for (key, targets) in bg {
            order.insert(key);
            order.extend(
                targets
                    .iter()
                    .map(String::as_str)
                    .filter(|&t| resolve(t) == idx),
            );
        }
    }
    order.extend(end_specs.iter().map(|s| s.block_id.as_str()));
    order.extend(procedure.block_id_to_block_name.keys().map(String::as_str));

    let starts: IndexSet<&str> = procedure.start_block_ids.iter().map(String::as_str).collect();
    let blocks: Vec<BlockModel> = order
        .iter()
        .map(|&id| BlockModel {
            id: id.to_string(),
            name: procedure.block_name(id).map(str::to_string),
            end_type: declared_end.get(id).copied(),
            is_start: starts.contains(id),
        })
        .collect();

    let mut edges: Vec<BlockEdge> = Vec::new();
    let (adjacency, kind) = match &procedure.block_graph {
        Some(bg) => (bg, EdgeKind::BlockGraph),
        None => (&procedure.branches, EdgeKind::Branch),
    };
    for (source, targets) in adjacency {
        let targets: IndexSet<&str> = targets.iter().map(String::as_str).collect();
        let sibling_count = targets.len();
        for (ordinal, target) in targets.into_iter().enumerate() {
            let owner = if kind == EdgeKind::BlockGraph {
                resolve(target)
            } else {
                idx
            };
            edges.push(BlockEdge {
                source: source.clone(),
                target: target.to_string(),
                target_procedure: markup.procedures[owner].id.clone(),
                kind,
                ordinal,
                sibling_count,
            });
        }
    }

    let end_groups = end_groups(procedure, &blocks, &edges, &declared_end, options);

    Ok(ProcedureModel {
        id: procedure.id.clone(),
        name: procedure.name.clone().filter(|n| !n.trim().is_empty()),
        title: procedure.display_title(),
        blocks,
        start_block_ids: starts.iter().map(|s| s.to_string()).collect(),
        end_specs,
        edges,
        end_groups,
        superseded_branches: procedure
            .block_graph
            .as_ref()
            .map(|_| procedure.branches.clone()),
        meta: markup.procedure_meta.get(&procedure.id).cloned(),
    })
}

fn end_groups(
    procedure: &Procedure,
    blocks: &[BlockModel],
    edges: &[BlockEdge],
    declared_end: &IndexMap<&str, EndType>,
    options: &ModelOptions,
) -> Vec<EndGroup> {
    let mut members: IndexMap<EndType, Vec<EndMember>> = IndexMap::new();
    for (&block_id, &end_type) in declared_end {
        members.entry(end_type).or_default().push(EndMember {
            block_id: block_id.to_string(),
            implicit: false,
        });
    }

    let has_outgoing: BTreeSet<&str> = edges.iter().map(|e| e.source.as_str()).collect();
    for block in blocks {
        if block.end_type.is_none() && !has_outgoing.contains(block.id.as_str()) {
            members.entry(EndType::End).or_default().push(EndMember {
                block_id: block.id.clone(),
                implicit: true,
            });
        }
    }

    if options.implicit_turn_out {
        for key in procedure.branches.keys() {
            let declared = declared_end.get(key.as_str()).copied();
            if declared.is_some_and(EndType::is_terminal) {
                continue;
            }
            members.entry(EndType::TurnOut).or_default().push(EndMember {
                block_id: key.clone(),
                implicit: true,
            });
        }
    }

    EndType::ORDERED
        .into_iter()
        .filter_map(|end_type| {
            let members = members.shift_remove(&end_type)?;
            Some(EndGroup { end_type, members })
        })
        .collect()
}

/// Explicit `procedure_graph` edges between known procedures; failing that, links implied
/// by cross-procedure block-graph edges; failing that, a chain in document order.
fn effective_procedure_edges(markup: &Markup, procedures: &[ProcedureModel]) -> Vec<ProcedureEdge> {
    let known: BTreeSet<&str> = procedures.iter().map(|p| p.id.as_str()).collect();

    let mut explicit: IndexSet<(String, String)> = IndexSet::new();
    for (source, targets) in markup.procedure_graph.iter().flatten() {
        for target in targets {
            if known.contains(source.as_str()) && known.contains(target.as_str()) {
                explicit.insert((source.clone(), target.clone()));
            }
        }
    }
    if !explicit.is_empty() {
        return with_origin(explicit, ProcedureEdgeOrigin::Explicit);
    }

    let derived: IndexSet<(String, String)> = procedures
        .iter()
        .flat_map(|p| {
            p.cross_edges()
                .map(|e| (p.id.clone(), e.target_procedure.clone()))
        })
        .collect();
    if !derived.is_empty() {
        return with_origin(derived, ProcedureEdgeOrigin::Derived);
    }

    let sequential: IndexSet<(String, String)> = procedures
        .windows(2)
        .map(|pair| (pair[0].id.clone(), pair[1].id.clone()))
        .collect();
    with_origin(sequential, ProcedureEdgeOrigin::Sequential)
}

fn with_origin(pairs: IndexSet<(String, String)>, origin: ProcedureEdgeOrigin) -> Vec<ProcedureEdge> {
    pairs
        .into_iter()
        .map(|(source, target)| ProcedureEdge {
            source,
            target,
            origin,
        })
        .collect()
}
