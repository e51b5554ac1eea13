//! Aggregate metrics of a merge run.
//!
//! Disabled documents never reach this module. Ranked lists use fixed keys:
//!
//! - linking procedures: most graphs using the procedure, then most links (in + out), then
//!   most inbound, then most outbound, then procedure id;
//! - overloaded collaborators: most merge-node procedures, then most cycles, then most
//!   procedures, then most blocks, then team and service name.

use crate::merge::{MergeNode, ServiceGraph};
use crate::model::Markup;
use cjm_graphlib::{Graph, alg};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeMetrics {
    /// Selected documents per `markup_type`.
    pub markup_type_counts: BTreeMap<String, usize>,
    /// Distinct selected services.
    pub graph_count: usize,
    /// Distinct procedure ids across the selected services.
    pub procedure_count: usize,
    pub merge_node_count: usize,
    /// Unique procedure ids shared with any external collaborator over unique selected ids.
    pub overlap_ratio: f64,
    pub external_collaborators: Vec<CollaboratorDependency>,
    pub linking_procedures: Vec<ProcedureLinkStat>,
    pub overloaded_collaborators: Vec<CollaboratorLoad>,
    pub graph: GraphMetrics,
    pub procedure_order: Vec<ProcedureOrderEntry>,
}

/// Shared procedures between the selection and one service outside it.
///
/// Every shared procedure counts exactly once in one direction, so
/// `external_depends_on_selected + selected_depends_on_external == total`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorDependency {
    pub service_key: String,
    pub team_name: String,
    pub service_name: String,
    pub external_depends_on_selected: usize,
    pub selected_depends_on_external: usize,
    pub total: usize,
    pub shared_procedure_ids: Vec<String>,
    pub overlap_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureLinkStat {
    pub procedure_id: String,
    pub procedure_name: Option<String>,
    pub graph_count: usize,
    pub usage_in_other_graphs: usize,
    pub incoming_edges: usize,
    pub outgoing_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollaboratorLoad {
    pub service_key: String,
    pub team_name: String,
    pub service_name: String,
    pub merge_nodes: usize,
    pub cycle_count: usize,
    pub procedure_count: usize,
    pub block_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphMetrics {
    pub vertices: usize,
    pub edges: usize,
    pub sources: usize,
    pub sinks: usize,
    pub cycle_count: usize,
    pub weakly_connected: bool,
    pub components: usize,
}

/// One row of the per-procedure drilldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureOrderEntry {
    pub procedure_id: String,
    /// Weak component, numbered from 0 in input order.
    pub component: usize,
    /// Sequential position across the whole ordering, from 0.
    pub rank: usize,
    pub level: usize,
}

pub(crate) fn compute_metrics(
    selected: &[ServiceGraph<'_>],
    available: &[ServiceGraph<'_>],
    merge_nodes: &[MergeNode],
    merged: &Markup,
    top_limit: usize,
) -> MergeMetrics {
    let mut markup_type_counts: BTreeMap<String, usize> = BTreeMap::new();
    for doc in selected.iter().flat_map(|s| &s.documents) {
        *markup_type_counts.entry(doc.markup_type.clone()).or_default() += 1;
    }

    let selected_ids: IndexSet<&str> = selected
        .iter()
        .flat_map(|s| s.mentioned.iter().map(String::as_str))
        .collect();
    let selected_keys: BTreeSet<&str> = selected.iter().map(|s| s.key.as_str()).collect();

    let selection = SelectionState::new(selected);
    let external_collaborators: Vec<CollaboratorDependency> = available
        .iter()
        .filter(|s| !selected_keys.contains(s.key.as_str()))
        .filter_map(|external| collaborator_dependency(&selection, external, &selected_ids))
        .collect();
    let all_shared: BTreeSet<&str> = external_collaborators
        .iter()
        .flat_map(|c| c.shared_procedure_ids.iter().map(String::as_str))
        .collect();

    let merge_members: BTreeSet<&str> = merge_nodes
        .iter()
        .flat_map(|n| n.procedure_ids.iter().map(String::as_str))
        .collect();

    let merged_graph = procedure_graph(merged);
    MergeMetrics {
        markup_type_counts,
        graph_count: selected.len(),
        procedure_count: selected_ids.len(),
        merge_node_count: merge_nodes.len(),
        overlap_ratio: ratio(all_shared.len(), selected_ids.len()),
        external_collaborators,
        linking_procedures: linking_procedures(selected, merged, top_limit),
        overloaded_collaborators: overloaded_collaborators(
            selected,
            &selection.graph,
            &merge_members,
            top_limit,
        ),
        graph: graph_metrics(&merged_graph),
        procedure_order: procedure_order(&merged_graph),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// The selected services seen as one graph.
struct SelectionState {
    defined: BTreeSet<String>,
    graph: Graph,
}

impl SelectionState {
    fn new(selected: &[ServiceGraph<'_>]) -> Self {
        let mut graph: Graph = Graph::new();
        let mut defined: BTreeSet<String> = BTreeSet::new();
        for service in selected {
            defined.extend(service.defined.iter().cloned());
            for v in service.graph.nodes() {
                graph.ensure_node(v);
            }
            for e in service.graph.edges() {
                graph.set_edge(e.v.as_str(), e.w.as_str());
            }
        }
        Self { defined, graph }
    }

    fn is_start(&self, id: &str) -> bool {
        self.graph.has_node(id) && self.graph.in_degree(id) == 0
    }

    fn is_end(&self, id: &str) -> bool {
        self.graph.has_node(id) && self.graph.out_degree(id) == 0
    }

    fn degree(&self, id: &str) -> usize {
        self.graph.in_degree(id) + self.graph.out_degree(id)
    }
}

/// Splits each shared procedure into one direction: ownership first (whoever defines the
/// payload is depended on), then flow position (an end on one side feeding a start on the
/// other), then connectivity (the better connected side is depended on).
fn collaborator_dependency(
    selection: &SelectionState,
    external: &ServiceGraph<'_>,
    selected_ids: &IndexSet<&str>,
) -> Option<CollaboratorDependency> {
    let shared: Vec<String> = selected_ids
        .iter()
        .filter(|id| external.mentioned.contains(**id))
        .map(|id| id.to_string())
        .collect();
    if shared.is_empty() {
        return None;
    }

    let mut external_depends_on_selected = 0;
    let mut selected_depends_on_external = 0;
    for id in &shared {
        let selected_defines = selection.defined.contains(id);
        let external_defines = external.defined.contains(id);
        let external_depends = if selected_defines != external_defines {
            selected_defines
        } else if external.is_end(id) && selection.is_start(id) {
            true
        } else if selection.is_end(id) && external.is_start(id) {
            false
        } else {
            external.degree(id) < selection.degree(id)
        };
        if external_depends {
            external_depends_on_selected += 1;
        } else {
            selected_depends_on_external += 1;
        }
    }

    Some(CollaboratorDependency {
        service_key: external.key.clone(),
        team_name: external.team_name.clone(),
        service_name: external.service_name.clone(),
        external_depends_on_selected,
        selected_depends_on_external,
        total: shared.len(),
        overlap_ratio: ratio(shared.len(), selected_ids.len()),
        shared_procedure_ids: shared,
    })
}

fn linking_procedures(
    selected: &[ServiceGraph<'_>],
    merged: &Markup,
    top_limit: usize,
) -> Vec<ProcedureLinkStat> {
    let mut union: Graph = Graph::new();
    let mut graphs_using: BTreeMap<&str, usize> = BTreeMap::new();
    for service in selected {
        for v in service.graph.nodes() {
            union.ensure_node(v);
            *graphs_using.entry(v).or_default() += 1;
        }
        for e in service.graph.edges() {
            union.set_edge(e.v.as_str(), e.w.as_str());
        }
    }

    let name_of = |id: &str| -> Option<String> {
        merged
            .procedure(id)
            .and_then(|p| p.name.clone())
            .or_else(|| {
                selected
                    .iter()
                    .flat_map(|s| &s.documents)
                    .find_map(|d| d.procedure(id).and_then(|p| p.name.clone()))
            })
    };

    let mut stats: Vec<ProcedureLinkStat> = union
        .nodes()
        .map(|id| {
            let graph_count = graphs_using.get(id).copied().unwrap_or(0);
            ProcedureLinkStat {
                procedure_id: id.to_string(),
                procedure_name: name_of(id),
                graph_count,
                usage_in_other_graphs: graph_count.saturating_sub(1),
                incoming_edges: union.in_degree(id),
                outgoing_edges: union.out_degree(id),
            }
        })
        .collect();
    stats.sort_by(|a, b| {
        let key = |s: &ProcedureLinkStat| {
            (
                std::cmp::Reverse(s.usage_in_other_graphs),
                std::cmp::Reverse(s.incoming_edges + s.outgoing_edges),
                std::cmp::Reverse(s.incoming_edges),
                std::cmp::Reverse(s.outgoing_edges),
                s.procedure_id.to_lowercase(),
            )
        };
        key(a).cmp(&key(b))
    });
    stats.truncate(top_limit);
    stats
}

fn overloaded_collaborators(
    selected: &[ServiceGraph<'_>],
    union: &Graph,
    merge_members: &BTreeSet<&str>,
    top_limit: usize,
) -> Vec<CollaboratorLoad> {
    let mut stats: Vec<CollaboratorLoad> = selected
        .iter()
        .map(|service| {
            let mut scoped: Graph = Graph::new();
            for id in &service.mentioned {
                scoped.ensure_node(id.as_str());
            }
            for e in union.edges() {
                if service.mentioned.contains(&e.v) && service.mentioned.contains(&e.w) {
                    scoped.set_edge(e.v.as_str(), e.w.as_str());
                }
            }
            CollaboratorLoad {
                service_key: service.key.clone(),
                team_name: service.team_name.clone(),
                service_name: service.service_name.clone(),
                merge_nodes: service
                    .mentioned
                    .iter()
                    .filter(|id| merge_members.contains(id.as_str()))
                    .count(),
                cycle_count: alg::cycle_count(&scoped),
                procedure_count: service.mentioned.len(),
                block_count: service.block_count(),
            }
        })
        .collect();
    stats.sort_by(|a, b| {
        let key = |s: &CollaboratorLoad| {
            (
                std::cmp::Reverse(s.merge_nodes),
                std::cmp::Reverse(s.cycle_count),
                std::cmp::Reverse(s.procedure_count),
                std::cmp::Reverse(s.block_count),
                s.team_name.to_lowercase(),
                s.service_name.to_lowercase(),
            )
        };
        key(a).cmp(&key(b))
    });
    stats.truncate(top_limit);
    stats
}

/// Procedure graph of a document: every procedure as a node, `procedure_graph` as edges.
pub fn procedure_graph(markup: &Markup) -> Graph {
    let mut g: Graph = Graph::new();
    for procedure in &markup.procedures {
        g.ensure_node(procedure.id.as_str());
    }
    for (source, targets) in markup.procedure_graph.iter().flatten() {
        for target in targets {
            g.set_edge(source.as_str(), target.as_str());
        }
    }
    g
}

pub fn graph_metrics(g: &Graph) -> GraphMetrics {
    let components = alg::components(g).len();
    GraphMetrics {
        vertices: g.node_count(),
        edges: g.edge_count(),
        sources: g.sources().len(),
        sinks: g.sinks().len(),
        cycle_count: alg::cycle_count(g),
        weakly_connected: components <= 1,
        components,
    }
}

/// Depth-first order from each component's roots, components in input order. Levels come
/// from [`alg::acyclic_levels`], the same leveling the layout engine arranges frames by.
pub fn procedure_order(g: &Graph) -> Vec<ProcedureOrderEntry> {
    let levels: BTreeMap<String, usize> = alg::acyclic_levels(g).into_iter().collect();
    let mut out: Vec<ProcedureOrderEntry> = Vec::with_capacity(g.node_count());
    for (component, nodes) in alg::components(g).into_iter().enumerate() {
        let mut roots: Vec<&str> = nodes
            .iter()
            .map(String::as_str)
            .filter(|v| g.in_degree(v) == 0)
            .collect();
        // A component that is one big cycle has no roots; start from its first node.
        if roots.is_empty() {
            roots.extend(nodes.first().map(String::as_str));
        }
        let mut walk = alg::preorder(g, &roots);
        let seen: BTreeSet<String> = walk.iter().cloned().collect();
        walk.extend(nodes.iter().filter(|v| !seen.contains(*v)).cloned());
        for procedure_id in walk {
            out.push(ProcedureOrderEntry {
                level: levels.get(&procedure_id).copied().unwrap_or(0),
                rank: out.len(),
                component,
                procedure_id,
            });
        }
    }
    out
}
