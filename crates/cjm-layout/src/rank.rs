//! Column assignment for the blocks of one procedure.

use cjm_core::ProcedureModel;
use cjm_graphlib::{EdgeKey, Graph, alg};
use rustc_hash::FxHashMap as HashMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Blocks in topological order (cycle edges ignored) with their level.
    pub order: Vec<(String, usize)>,
    /// DFS back edges rooted at the start blocks, self-loops included.
    pub cycle_edges: BTreeSet<EdgeKey>,
    /// The local graph with every edge, cycle edges included.
    pub graph: Graph,
    pub max_level: usize,
}

impl Ranking {
    pub fn level(&self, block_id: &str) -> Option<usize> {
        self.order
            .iter()
            .find_map(|(id, level)| (id == block_id).then_some(*level))
    }

    pub fn is_cycle_edge(&self, source: &str, target: &str) -> bool {
        self.cycle_edges.contains(&EdgeKey::new(source, target))
    }

    /// Successors over forward (non-cycle) edges.
    pub fn forward_successors<'a>(&'a self, v: &str) -> Vec<&'a str> {
        self.graph
            .successors(v)
            .into_iter()
            .filter(|w| !self.is_cycle_edge(v, w))
            .collect()
    }

    pub fn forward_predecessors<'a>(&'a self, w: &str) -> Vec<&'a str> {
        self.graph
            .predecessors(w)
            .into_iter()
            .filter(|v| !self.is_cycle_edge(v, w))
            .collect()
    }
}

/// Longest-path levels over the procedure's drawn local edges.
///
/// Cycles never fail the layout: the DFS back edges are left out of the leveling and reported
/// in [`Ranking::cycle_edges`]. With start blocks present, every other block sits at level 1
/// or deeper so the starts get a column of their own.
pub fn rank_blocks(procedure: &ProcedureModel) -> Ranking {
    let mut graph: Graph = Graph::new();
    for block in &procedure.blocks {
        graph.ensure_node(block.id.as_str());
    }
    for edge in procedure.local_edges() {
        graph.set_edge(edge.source.as_str(), edge.target.as_str());
    }

    let roots: Vec<&str> = procedure.start_block_ids.iter().map(String::as_str).collect();
    let cycle_edges = alg::back_edges(&graph, &roots);
    let order = alg::longest_path_levels(&graph, &cycle_edges);

    let mut levels: HashMap<String, usize> = order.iter().cloned().collect();
    if !roots.is_empty() {
        for (id, level) in levels.iter_mut() {
            if !roots.contains(&id.as_str()) {
                *level = (*level).max(1);
            }
        }
        // `order` is topological once cycle edges are ignored, so one pass restores
        // `level(w) > level(v)` along every forward edge.
        for (v, _) in &order {
            let base = levels.get(v).copied().unwrap_or(0);
            for w in graph.successors(v) {
                if cycle_edges.contains(&EdgeKey::new(v.as_str(), w)) {
                    continue;
                }
                if let Some(slot) = levels.get_mut(w) {
                    *slot = (*slot).max(base + 1);
                }
            }
        }
    }

    let order: Vec<(String, usize)> = order
        .into_iter()
        .map(|(id, _)| {
            let level = levels.get(&id).copied().unwrap_or(0);
            (id, level)
        })
        .collect();
    let max_level = order.iter().map(|(_, l)| *l).max().unwrap_or(0);

    Ranking {
        order,
        cycle_edges,
        graph,
        max_level,
    }
}
