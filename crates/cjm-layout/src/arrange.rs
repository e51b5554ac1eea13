//! Left-to-right arrangement of procedure frames.

use cjm_core::geom::{Point, Size, point};
use cjm_core::GraphModel;
use cjm_graphlib::{EdgeKey, Graph, alg};
use rustc_hash::FxHashMap as HashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSlot {
    pub component: usize,
    pub level: usize,
    pub origin: Point,
}

#[derive(Debug, Clone, Default)]
pub struct Arrangement {
    pub slots: HashMap<String, FrameSlot>,
    pub cycle_edges: BTreeSet<EdgeKey>,
    /// Middle of the gap under every component but the last.
    pub gap_centres: Vec<f64>,
}

/// Places frames by procedure level inside each weak component and stacks the components
/// vertically in input order, `component_gap` apart.
///
/// Levels come from [`alg::acyclic_levels`]; every column is `widest frame + lane_gap` wide
/// so arrows between neighbouring levels never cross a frame.
pub fn arrange_procedures(
    model: &GraphModel,
    sizes: &HashMap<String, Size>,
    lane_gap: f64,
    component_gap: f64,
) -> Arrangement {
    let mut g: Graph = Graph::new();
    for procedure in &model.procedures {
        g.ensure_node(procedure.id.as_str());
    }
    for edge in &model.procedure_edges {
        g.set_edge(edge.source.as_str(), edge.target.as_str());
    }

    let cycle_edges = alg::back_edges(&g, &g.sources());
    let levels: HashMap<String, usize> = alg::acyclic_levels(&g).into_iter().collect();
    let widest = sizes.values().map(|s| s.width).fold(0.0_f64, f64::max);
    let lane_span = widest + lane_gap;
    let height_of = |id: &str| sizes.get(id).map(|s| s.height).unwrap_or(0.0);

    let mut slots: HashMap<String, FrameSlot> = HashMap::default();
    let mut gap_centres: Vec<f64> = Vec::new();
    let mut origin_y = 0.0;
    let components = alg::components(&g);
    let last = components.len().saturating_sub(1);
    for (component, nodes) in components.into_iter().enumerate() {
        let mut columns: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in nodes {
            let level = levels.get(&id).copied().unwrap_or(0);
            columns.entry(level).or_default().push(id);
        }

        let mut component_height: f64 = 0.0;
        for (level, ids) in columns {
            let mut y = origin_y;
            for id in ids {
                let height = height_of(&id);
                slots.insert(
                    id,
                    FrameSlot {
                        component,
                        level,
                        origin: point(level as f64 * lane_span, y),
                    },
                );
                component_height = component_height.max(y + height - origin_y);
                y += height + lane_gap;
            }
        }
        if component < last {
            gap_centres.push(origin_y + component_height + component_gap / 2.0);
            origin_y += component_height + component_gap;
        }
    }

    Arrangement {
        slots,
        cycle_edges,
        gap_centres,
    }
}
