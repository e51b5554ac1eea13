//! In-column ordering and row assignment.
//!
//! Columns start in (start blocks first, input order), then go through barycentric sweeps
//! against the neighbouring columns and a row smoothing pass that lines children up with their
//! parents. Every comparison falls back to the previous position, so the result only depends
//! on the input order.

use crate::rank::Ranking;
use cjm_core::ProcedureModel;
use rustc_hash::FxHashMap as HashMap;

const SWEEPS: usize = 3;
const SMOOTHING_PASSES: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    /// Blocks of each column, top to bottom.
    pub columns: Vec<Vec<String>>,
    /// Row of every block, in block slots. Rows may be fractional after smoothing.
    pub rows: HashMap<String, f64>,
    /// Rows taken by the tallest column; at least one.
    pub height: f64,
}

impl Grid {
    pub fn row(&self, block_id: &str) -> Option<f64> {
        self.rows.get(block_id).copied()
    }
}

pub fn order_blocks(procedure: &ProcedureModel, ranking: &Ranking) -> Grid {
    let input_index: HashMap<&str, usize> = procedure
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();
    let index_of = |id: &str| input_index.get(id).copied().unwrap_or(usize::MAX);
    let level_of: HashMap<&str, usize> = ranking
        .order
        .iter()
        .map(|(id, level)| (id.as_str(), *level))
        .collect();
    let level = |id: &str| level_of.get(id).copied().unwrap_or(0);

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); ranking.max_level + 1];
    for block in &procedure.blocks {
        if let Some(column) = columns.get_mut(level(&block.id)) {
            column.push(block.id.clone());
        }
    }
    for column in &mut columns {
        column.sort_by_key(|id| (!procedure.start_block_ids.contains(id), index_of(id)));
    }

    let mut positions = index_positions(&columns);
    for _ in 0..SWEEPS {
        for l in 1..columns.len() {
            let anchors: HashMap<String, f64> = columns[l]
                .iter()
                .map(|id| {
                    let parents = ranking
                        .forward_predecessors(id)
                        .into_iter()
                        .filter(|p| level(p) + 1 == l);
                    (id.clone(), mean(parents.filter_map(|p| positions.get(p).copied())))
                })
                .filter_map(|(id, anchor)| anchor.map(|a| (id, a)))
                .collect();
            sort_by_anchor(&mut columns[l], &anchors, &positions);
        }
        positions = index_positions(&columns);

        for l in (0..columns.len().saturating_sub(1)).rev() {
            let anchors: HashMap<String, f64> = columns[l]
                .iter()
                .map(|id| {
                    let children = ranking
                        .forward_successors(id)
                        .into_iter()
                        .filter(|c| level(c) == l + 1);
                    (id.clone(), mean(children.filter_map(|c| positions.get(c).copied())))
                })
                .filter_map(|(id, anchor)| anchor.map(|a| (id, a)))
                .collect();
            sort_by_anchor(&mut columns[l], &anchors, &positions);
        }
        positions = index_positions(&columns);
    }

    let span = |id: &str| ranking.forward_successors(id).len().max(1) as f64;

    let mut rows: HashMap<String, f64> = HashMap::default();
    for column in &columns {
        let mut row = 0.0;
        for id in column {
            rows.insert(id.clone(), row);
            row += span(id);
        }
    }

    // Each child follows the parent with the most descendants below it.
    let mut descendants: HashMap<&str, usize> = HashMap::default();
    for (v, _) in ranking.order.iter().rev() {
        let total = ranking
            .forward_successors(v)
            .iter()
            .map(|c| 1 + descendants.get(c).copied().unwrap_or(0))
            .sum();
        descendants.insert(v.as_str(), total);
    }
    let mut primary_parent: HashMap<&str, &str> = HashMap::default();
    for (parent, _) in &ranking.order {
        let children = ranking.forward_successors(parent);
        let heaviest = children.iter().copied().min_by_key(|c| {
            (
                std::cmp::Reverse(descendants.get(c).copied().unwrap_or(0)),
                index_of(c),
            )
        });
        if let Some(child) = heaviest {
            primary_parent.entry(child).or_insert(parent.as_str());
        }
    }

    for _ in 0..SMOOTHING_PASSES {
        for l in 0..columns.len() {
            let mut desired: HashMap<String, f64> = HashMap::default();
            for id in &columns[l] {
                let parents = ranking.forward_predecessors(id);
                let neighbours = parents
                    .iter()
                    .copied()
                    .filter(|p| level(p) + 1 == l)
                    .chain(
                        ranking
                            .forward_successors(id)
                            .into_iter()
                            .filter(|c| level(c) == l + 1),
                    );
                let current = rows.get(id.as_str()).copied().unwrap_or(0.0);
                let mut target = mean(neighbours.filter_map(|n| rows.get(n).copied())).unwrap_or(current);
                if let Some(parent) = primary_parent.get(id.as_str()) {
                    if parents.len() == 1 && level(parent) + 1 == l {
                        target = rows.get(*parent).copied().unwrap_or(target);
                    }
                }
                desired.insert(id.clone(), target);
            }
            sort_by_anchor(&mut columns[l], &desired, &positions);

            let mut next_free: Option<f64> = None;
            for id in &columns[l] {
                let target = desired.get(id).copied().unwrap_or(0.0);
                let row = match next_free {
                    None => target.max(0.0),
                    Some(free) => target.max(free),
                };
                rows.insert(id.clone(), row);
                next_free = Some(row + span(id));
            }
        }
        positions = index_positions(&columns);
    }

    let height = columns
        .iter()
        .filter_map(|column| column.last())
        .map(|id| rows.get(id).copied().unwrap_or(0.0) + span(id))
        .fold(1.0_f64, f64::max);

    Grid {
        columns,
        rows,
        height,
    }
}

fn index_positions(columns: &[Vec<String>]) -> HashMap<String, f64> {
    columns
        .iter()
        .flat_map(|column| column.iter().enumerate().map(|(i, id)| (id.clone(), i as f64)))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Stable sort by anchor; nodes without one keep their current position as the key.
fn sort_by_anchor(
    column: &mut Vec<String>,
    anchors: &HashMap<String, f64>,
    positions: &HashMap<String, f64>,
) {
    let mut keyed: Vec<(f64, usize, String)> = column
        .drain(..)
        .enumerate()
        .map(|(i, id)| {
            let key = anchors
                .get(&id)
                .or_else(|| positions.get(&id))
                .copied()
                .unwrap_or(i as f64);
            (key, i, id)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    column.extend(keyed.into_iter().map(|(_, _, id)| id));
}
