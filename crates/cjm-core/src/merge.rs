//! Cross-graph merge builder.
//!
//! Combines several markup documents (one per team service, typically) into a single
//! `procedure_graph` document, detects merge nodes (chains of procedures shared between
//! services), elides pass-through procedures, and computes [`MergeMetrics`]. At
//! [`GraphLevel::Service`] the result is folded further by [`service_graph`].

use crate::config::CjmConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphModel, ModelOptions};
use crate::metrics::{MergeMetrics, compute_metrics};
use crate::model::{Adjacency, EndSpec, EndType, Markup, Procedure, ProcedureMeta};
use crate::service_graph::service_graph;
use crate::stable_id::{self, StableId};
use crate::validate::{ValidateOptions, validate_markup};
use cjm_graphlib::Graph;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const MERGED_MARKUP_TYPE: &str = "procedure_graph";
/// Upper bound accepted for [`MergeOptions::min_chain_len`]; larger values are rejected by
/// [`MergeOptions::validate`].
pub const MAX_MIN_CHAIN_LEN: usize = 10;

pub(crate) const SERVICE_COLORS: [&str; 8] = [
    "#e3f2fd", "#fce4ec", "#e8f5e9", "#fff3e0", "#ede7f6", "#e0f7fa", "#f9fbe7", "#efebe9",
];
const INTERSECTION_COLOR: &str = "#ffe08a";

/// Granularity of the merged document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphLevel {
    /// One frame per procedure.
    #[default]
    Procedure,
    /// One frame per connected group of a service's procedures.
    Service,
}

impl GraphLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Procedure => "procedure",
            Self::Service => "service",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "procedure" | "procedures" => Some(Self::Procedure),
            "service" | "services" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Unify procedures sharing an id across documents. When off, a procedure where one
    /// service ends and another starts is treated as a handoff, not a merge node.
    pub union_by_id: bool,
    /// Detect merge nodes over every non-disabled document, not only the selected ones.
    pub global_merge_detection: bool,
    /// Minimum merge-node chain length; `0` turns detection off.
    pub min_chain_len: usize,
    /// Length of the ranked metric lists.
    pub top_limit: usize,
    pub graph_level: GraphLevel,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            union_by_id: true,
            global_merge_detection: false,
            min_chain_len: 1,
            top_limit: 10,
            graph_level: GraphLevel::Procedure,
        }
    }
}

impl MergeOptions {
    /// Reads `merge.*` keys, rejecting malformed values before any merge work starts.
    pub fn from_config(config: &CjmConfig) -> Result<Self> {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| -> Result<bool> {
            match config.get(key) {
                None => Ok(default),
                Some(v) => v
                    .as_bool()
                    .ok_or_else(|| Error::invalid_config(key, "expected a boolean")),
            }
        };
        let count = |key: &str, default: usize| -> Result<usize> {
            match config.get(key) {
                None => Ok(default),
                Some(v) => v
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| Error::invalid_config(key, "expected a non-negative integer")),
            }
        };
        let options = Self {
            union_by_id: flag("merge.union_by_id", defaults.union_by_id)?,
            global_merge_detection: flag(
                "merge.global_merge_detection",
                defaults.global_merge_detection,
            )?,
            min_chain_len: count("merge.min_chain_len", defaults.min_chain_len)?,
            top_limit: count("merge.top_limit", defaults.top_limit)?,
            graph_level: match config.get("merge.graph_level") {
                None => defaults.graph_level,
                Some(v) => v.as_str().and_then(GraphLevel::parse).ok_or_else(|| {
                    Error::invalid_config("merge.graph_level", "expected `procedure` or `service`")
                })?,
            },
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_chain_len > MAX_MIN_CHAIN_LEN {
            return Err(Error::invalid_config(
                "merge.min_chain_len",
                format!("must be between 0 and {MAX_MIN_CHAIN_LEN}"),
            ));
        }
        if self.top_limit == 0 {
            return Err(Error::invalid_config(
                "merge.top_limit",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Which documents take part, by [`Markup::service_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSelection {
    /// Rendered documents; `None` selects every non-disabled document.
    pub selected: Option<BTreeSet<String>>,
    /// Excluded from rendering, detection and metrics alike.
    pub disabled: BTreeSet<String>,
}

impl MergeSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: Some(keys.into_iter().map(Into::into).collect()),
            disabled: BTreeSet::new(),
        }
    }

    pub fn disable(mut self, key: impl Into<String>) -> Self {
        self.disabled.insert(key.into());
        self
    }

    fn is_available(&self, key: &str) -> bool {
        !self.disabled.contains(key)
    }

    fn is_selected(&self, key: &str) -> bool {
        self.is_available(key)
            && self
                .selected
                .as_ref()
                .is_none_or(|selected| selected.contains(key))
    }
}

/// A chain of consecutive procedures shared by at least two services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeNode {
    pub id: StableId,
    pub procedure_ids: Vec<String>,
    /// Service keys mentioning any member, sorted.
    pub services: Vec<String>,
}

impl MergeNode {
    pub fn contains(&self, procedure_id: &str) -> bool {
        self.procedure_ids.iter().any(|p| p == procedure_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub markup: Markup,
    pub merge_nodes: Vec<MergeNode>,
    /// Pass-through procedures removed from the merged document, in removal order.
    pub elided: Vec<String>,
    pub metrics: MergeMetrics,
}

/// Procedure-level view of all documents sharing one service key.
#[derive(Debug, Clone)]
pub(crate) struct ServiceGraph<'a> {
    pub key: String,
    pub team_name: String,
    pub service_name: String,
    pub documents: Vec<&'a Markup>,
    /// Procedures with a payload in one of the documents.
    pub defined: IndexSet<String>,
    /// `defined` plus every procedure named by a `procedure_graph`.
    pub mentioned: IndexSet<String>,
    pub graph: Graph,
}

impl<'a> ServiceGraph<'a> {
    pub fn group(documents: &[&'a Markup]) -> Vec<ServiceGraph<'a>> {
        let mut grouped: IndexMap<String, Vec<&'a Markup>> = IndexMap::new();
        for &doc in documents {
            grouped.entry(doc.service_key()).or_default().push(doc);
        }
        grouped
            .into_iter()
            .map(|(key, docs)| Self::from_documents(key, docs))
            .collect()
    }

    fn from_documents(key: String, documents: Vec<&'a Markup>) -> Self {
        let mut graph: Graph = Graph::new();
        let mut defined: IndexSet<String> = IndexSet::new();
        for doc in &documents {
            for procedure in &doc.procedures {
                defined.insert(procedure.id.clone());
                graph.ensure_node(procedure.id.as_str());
            }
            for (source, targets) in doc.procedure_graph.iter().flatten() {
                graph.ensure_node(source.as_str());
                for target in targets {
                    graph.set_edge(source.as_str(), target.as_str());
                }
            }
        }
        let mentioned: IndexSet<String> = graph.node_ids().into_iter().collect();
        let first = documents.first().copied();
        Self {
            key,
            team_name: first
                .and_then(Markup::team_name)
                .unwrap_or("Unknown team")
                .to_string(),
            service_name: first
                .and_then(Markup::service_name)
                .unwrap_or("Unknown service")
                .to_string(),
            documents,
            defined,
            mentioned,
            graph,
        }
    }

    pub fn is_start(&self, procedure_id: &str) -> bool {
        self.mentioned.contains(procedure_id) && self.graph.in_degree(procedure_id) == 0
    }

    pub fn is_end(&self, procedure_id: &str) -> bool {
        self.mentioned.contains(procedure_id) && self.graph.out_degree(procedure_id) == 0
    }

    pub fn degree(&self, procedure_id: &str) -> usize {
        self.graph.in_degree(procedure_id) + self.graph.out_degree(procedure_id)
    }

    pub fn block_count(&self) -> usize {
        self.documents.iter().map(|d| d.block_count()).sum()
    }
}

/// Merge-node chains over the union of `services`.
///
/// A procedure is a chain candidate when at least two services mention it and its in- and
/// out-degree in the union graph are both at most one. Candidates linked by an edge form a
/// chain; chains that only close a cycle have no head and are skipped. Chains shorter than
/// `min_chain_len` are dropped, so raising the minimum never adds a node.
///
/// Without `merge_handoffs`, a procedure where one service ends and another starts is a
/// handoff and does not count as shared by that pair; see [`shares_procedure`].
pub(crate) fn detect_merge_nodes(
    services: &[ServiceGraph<'_>],
    min_chain_len: usize,
    merge_handoffs: bool,
) -> Vec<MergeNode> {
    if min_chain_len == 0 {
        return Vec::new();
    }
    let by_key: BTreeMap<&str, &ServiceGraph<'_>> =
        services.iter().map(|s| (s.key.as_str(), s)).collect();

    let mut union: Graph = Graph::new();
    let mut shared_by: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for service in services {
        for v in service.graph.nodes() {
            union.ensure_node(v);
            shared_by
                .entry(v.to_string())
                .or_default()
                .insert(service.key.clone());
        }
        for e in service.graph.edges() {
            union.set_edge(e.v.as_str(), e.w.as_str());
        }
    }

    let shared_pair = |v: &str, keys: &BTreeSet<String>| {
        if merge_handoffs {
            return keys.len() >= 2;
        }
        let owners: Vec<&ServiceGraph<'_>> = keys
            .iter()
            .filter_map(|k| by_key.get(k.as_str()).copied())
            .collect();
        owners.iter().enumerate().any(|(i, left)| {
            owners[i + 1..]
                .iter()
                .any(|right| shares_procedure(v, left, right))
        })
    };
    let is_candidate = |v: &str| {
        shared_by.get(v).is_some_and(|s| shared_pair(v, s))
            && union.in_degree(v) <= 1
            && union.out_degree(v) <= 1
            && !union.has_edge(v, v)
    };
    let next = |v: &str| -> Option<String> {
        let w = union.successors(v).first().copied()?;
        is_candidate(w).then(|| w.to_string())
    };
    let has_candidate_parent = |v: &str| {
        union
            .predecessors(v)
            .first()
            .is_some_and(|&u| is_candidate(u))
    };

    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut out: Vec<MergeNode> = Vec::new();
    for head in union.nodes() {
        if !is_candidate(head) || has_candidate_parent(head) || visited.contains(head) {
            continue;
        }
        let mut chain: Vec<String> = vec![head.to_string()];
        visited.insert(head.to_string());
        let mut cur = head.to_string();
        while let Some(w) = next(&cur) {
            if !visited.insert(w.clone()) {
                break;
            }
            chain.push(w.clone());
            cur = w;
        }
        if chain.len() < min_chain_len {
            continue;
        }
        let services: BTreeSet<String> = chain
            .iter()
            .filter_map(|p| shared_by.get(p))
            .flatten()
            .cloned()
            .collect();
        let members: Vec<&str> = chain.iter().map(String::as_str).collect();
        out.push(MergeNode {
            id: stable_id::derive_global("merge-node", &members),
            procedure_ids: chain,
            services: services.into_iter().collect(),
        });
    }

    tracing::debug!(
        merge_nodes = out.len(),
        min_chain_len,
        "detected merge nodes"
    );
    out
}

/// Whether `left` and `right` both own `procedure_id` rather than hand the flow over at it.
/// A service whose only procedure this is always shares it.
fn shares_procedure(
    procedure_id: &str,
    left: &ServiceGraph<'_>,
    right: &ServiceGraph<'_>,
) -> bool {
    if left.mentioned.len() == 1 || right.mentioned.len() == 1 {
        return true;
    }
    let handoff = (left.is_end(procedure_id) && right.is_start(procedure_id))
        || (right.is_end(procedure_id) && left.is_start(procedure_id));
    !handoff
}

pub struct MergeBuilder<'a> {
    documents: &'a [Markup],
    options: MergeOptions,
}

impl<'a> MergeBuilder<'a> {
    /// Fails with [`Error::InvalidConfig`] before looking at any document.
    pub fn new(documents: &'a [Markup], options: MergeOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { documents, options })
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    pub fn build(&self, selection: &MergeSelection) -> Result<MergeOutcome> {
        for doc in self.documents {
            validate_markup(doc, ValidateOptions::merge_input())?;
        }

        let available: Vec<(usize, &Markup)> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| selection.is_available(&d.service_key()))
            .collect();
        let selected: Vec<(usize, &Markup)> = available
            .iter()
            .copied()
            .filter(|(_, d)| selection.is_selected(&d.service_key()))
            .collect();

        let selected_docs: Vec<&Markup> = selected.iter().map(|(_, d)| *d).collect();
        let available_docs: Vec<&Markup> = available.iter().map(|(_, d)| *d).collect();
        let selected_services = ServiceGraph::group(&selected_docs);
        let available_services = ServiceGraph::group(&available_docs);

        let scope = if self.options.global_merge_detection {
            &available_services
        } else {
            &selected_services
        };
        let merge_nodes = detect_merge_nodes(
            scope,
            self.options.min_chain_len,
            self.options.union_by_id,
        );

        let merged = self.merge_documents(&selected, &selected_services, &merge_nodes);
        let (markup, elided) = elide_pass_through(merged, &merge_nodes)?;

        let metrics = compute_metrics(
            &selected_services,
            &available_services,
            &merge_nodes,
            &markup,
            self.options.top_limit,
        );

        tracing::debug!(
            available = available.len(),
            selected = selected.len(),
            procedures = markup.procedures.len(),
            elided = elided.len(),
            level = self.options.graph_level.as_str(),
            "merged markup documents"
        );
        let markup = match self.options.graph_level {
            GraphLevel::Procedure => markup,
            GraphLevel::Service => service_graph(&markup),
        };

        Ok(MergeOutcome {
            markup,
            merge_nodes,
            elided,
            metrics,
        })
    }

    fn merge_documents(
        &self,
        selected: &[(usize, &Markup)],
        services: &[ServiceGraph<'_>],
        merge_nodes: &[MergeNode],
    ) -> Markup {
        // Ids defined by more than one selected document; scoped when not unifying.
        let mut definitions: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, doc) in selected {
            for procedure in &doc.procedures {
                *definitions.entry(procedure.id.as_str()).or_default() += 1;
            }
        }
        let union_by_id = self.options.union_by_id;
        let scoped = |doc_idx: usize, id: &str| -> String {
            if !union_by_id && definitions.get(id).copied().unwrap_or(0) > 1 {
                format!("{id}::doc{}", doc_idx + 1)
            } else {
                id.to_string()
            }
        };

        let mut procedures: IndexMap<String, Procedure> = IndexMap::new();
        let mut origin: IndexMap<String, (String, &Markup)> = IndexMap::new();
        let mut graph: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for &(doc_idx, doc) in selected {
            for procedure in &doc.procedures {
                let id = scoped(doc_idx, &procedure.id);
                origin
                    .entry(id.clone())
                    .or_insert_with(|| (procedure.id.clone(), doc));
                match procedures.get_mut(&id) {
                    Some(existing) => unify_procedure(existing, procedure),
                    None => {
                        let mut copy = procedure.clone();
                        copy.id = id.clone();
                        procedures.insert(id, copy);
                    }
                }
            }
            for (source, targets) in doc.procedure_graph.iter().flatten() {
                let entry = graph.entry(scoped(doc_idx, source)).or_default();
                entry.extend(targets.iter().map(|t| scoped(doc_idx, t)));
            }
        }

        // Procedures only known through `procedure_graph` become empty frames.
        let referenced: Vec<String> = graph
            .iter()
            .flat_map(|(s, ts)| std::iter::once(s).chain(ts))
            .cloned()
            .collect();
        for id in referenced {
            if !procedures.contains_key(&id) {
                procedures.insert(id.clone(), Procedure::new(id));
            }
        }

        let service_colors: BTreeMap<&str, &str> = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.key.as_str(), SERVICE_COLORS[i % SERVICE_COLORS.len()]))
            .collect();

        let mut procedure_meta: IndexMap<String, ProcedureMeta> = IndexMap::new();
        for id in procedures.keys() {
            let source_id = origin
                .get(id)
                .map(|(source, _)| source.clone())
                .unwrap_or_else(|| id.clone());
            let owner = origin.get(id).map(|(_, doc)| *doc);
            let mentioning: Vec<String> = services
                .iter()
                .filter(|s| s.mentioned.contains(&source_id))
                .map(|s| s.key.clone())
                .collect();
            let is_intersection = mentioning.len() >= 2;
            let owner_key = owner.map(Markup::service_key);
            let color = if is_intersection {
                INTERSECTION_COLOR
            } else {
                owner_key
                    .as_deref()
                    .or(mentioning.first().map(String::as_str))
                    .and_then(|k| service_colors.get(k).copied())
                    .unwrap_or(SERVICE_COLORS[0])
            };
            let merge_chain = merge_nodes
                .iter()
                .find(|n| n.contains(&source_id))
                .map(|n| n.procedure_ids.clone())
                .unwrap_or_default();
            procedure_meta.insert(
                id.clone(),
                ProcedureMeta {
                    team_name: owner.and_then(Markup::team_name).map(str::to_string),
                    service_name: owner.and_then(Markup::service_name).map(str::to_string),
                    source_procedure_id: Some(source_id),
                    color: Some(color.to_string()),
                    is_intersection,
                    services: mentioning,
                    merge_chain,
                    ..ProcedureMeta::default()
                },
            );
        }

        let mut teams: IndexSet<&str> = IndexSet::new();
        for service in services {
            teams.insert(service.team_name.as_str());
        }
        let title = teams.into_iter().collect::<Vec<_>>().join(", ");

        let procedure_graph: Adjacency = graph
            .into_iter()
            .filter(|(_, targets)| !targets.is_empty())
            .map(|(source, targets)| (source, targets.into_iter().collect()))
            .collect();

        Markup {
            markup_type: MERGED_MARKUP_TYPE.to_string(),
            service_name: (!title.is_empty()).then_some(title),
            procedure_graph: Some(procedure_graph),
            procedure_meta,
            procedures: procedures.into_values().collect(),
            ..Markup::default()
        }
    }
}

fn unify_procedure(existing: &mut Procedure, incoming: &Procedure) {
    if existing.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
        existing.name = incoming.name.clone();
    }
    for start in &incoming.start_block_ids {
        if !existing.start_block_ids.contains(start) {
            existing.start_block_ids.push(start.clone());
        }
    }

    let mut ends: IndexMap<String, EndType> = IndexMap::new();
    for raw in existing.end_block_ids.iter().chain(&incoming.end_block_ids) {
        // Specs were validated with the inputs.
        let Ok(spec) = EndSpec::parse(&existing.id, raw) else {
            continue;
        };
        ends.entry(spec.block_id)
            .and_modify(|t| *t = t.combine(spec.end_type))
            .or_insert(spec.end_type);
    }
    existing.end_block_ids = ends
        .into_iter()
        .map(|(block, end_type)| EndSpec::new(block, end_type).to_markup())
        .collect();

    union_adjacency(&mut existing.branches, &incoming.branches);
    if let Some(incoming_bg) = &incoming.block_graph {
        union_adjacency(
            existing.block_graph.get_or_insert_with(Adjacency::new),
            incoming_bg,
        );
    }
    for (block, name) in &incoming.block_id_to_block_name {
        let slot = existing
            .block_id_to_block_name
            .entry(block.clone())
            .or_default();
        if slot.trim().is_empty() {
            *slot = name.clone();
        }
    }
}

fn union_adjacency(into: &mut Adjacency, from: &Adjacency) {
    for (source, targets) in from {
        let slot = into.entry(source.clone()).or_default();
        for target in targets {
            if !slot.contains(target) {
                slot.push(target.clone());
            }
        }
    }
}

/// Removes procedures that only pass the flow through: exactly one parent and one child, no
/// declared start or end blocks (implicit exits do not count), no blocks linked from other
/// procedures, and no merge node nearby. The parent is linked straight to the child.
fn elide_pass_through(markup: Markup, merge_nodes: &[MergeNode]) -> Result<(Markup, Vec<String>)> {
    let model = GraphModel::build_lenient(&markup, &ModelOptions::default())?;

    let source_id = |id: &str| -> String {
        markup
            .procedure_meta
            .get(id)
            .and_then(|m| m.source_procedure_id.clone())
            .unwrap_or_else(|| id.to_string())
    };
    let in_merge_node = |id: &str| {
        let source = source_id(id);
        merge_nodes.iter().any(|n| n.contains(&source))
    };
    let linked_from_elsewhere: BTreeSet<&str> = model
        .procedures
        .iter()
        .flat_map(|p| p.cross_edges().map(|e| e.target_procedure.as_str()))
        .collect();

    let mut graph: Graph = Graph::new();
    for procedure in &markup.procedures {
        graph.ensure_node(procedure.id.as_str());
    }
    for (source, targets) in markup.procedure_graph.iter().flatten() {
        for target in targets {
            graph.set_edge(source.as_str(), target.as_str());
        }
    }

    let mut elided: Vec<String> = Vec::new();
    for procedure in &model.procedures {
        let id = procedure.id.as_str();
        let (preds, succs) = (graph.predecessors(id), graph.successors(id));
        let (Some(&parent), Some(&child)) = (preds.first(), succs.first()) else {
            continue;
        };
        let eligible = preds.len() == 1
            && succs.len() == 1
            && parent != id
            && child != id
            && parent != child
            && procedure.start_block_ids.is_empty()
            && procedure.blocks.iter().all(|b| b.end_type.is_none())
            && procedure.cross_edges().next().is_none()
            && !linked_from_elsewhere.contains(id)
            && !in_merge_node(id)
            && !in_merge_node(parent)
            && !in_merge_node(child);
        if !eligible {
            continue;
        }
        let (parent, child) = (parent.to_string(), child.to_string());
        graph.remove_edge(&parent, id);
        graph.remove_edge(id, &child);
        graph.set_edge(parent, child);
        elided.push(id.to_string());
    }

    if elided.is_empty() {
        return Ok((markup, elided));
    }

    let removed: BTreeSet<&str> = elided.iter().map(String::as_str).collect();
    let mut out = markup.clone();
    out.procedures.retain(|p| !removed.contains(p.id.as_str()));
    out.procedure_meta.retain(|id, _| !removed.contains(id.as_str()));
    let mut procedure_graph: Adjacency = Adjacency::new();
    for e in graph.edges() {
        procedure_graph
            .entry(e.v.clone())
            .or_default()
            .push(e.w.clone());
    }
    out.procedure_graph = Some(procedure_graph);
    Ok((out, elided))
}
