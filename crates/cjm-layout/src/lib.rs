#![forbid(unsafe_code)]

//! Deterministic grid layout for customer journey documents.
//!
//! Each procedure becomes a frame holding a column per block level, a start-marker lane on
//! the left and its end markers either in a trailing column or in a row under the grid.
//! Frames are then arranged by procedure level, one band per weak component, with a dashed
//! separator between bands and a summary panel left of each. Nothing here depends on hashing
//! order or clocks: the same [`GraphModel`] always yields the same [`LayoutPlan`].

pub mod arrange;
pub mod config;
pub mod order;
pub mod plan;
pub mod rank;
mod scenario;

pub use config::{LayoutConfig, ScenarioConfig};
pub use plan::{
    BlockPlacement, FramePlacement, LayoutPlan, MarkerKind, MarkerPlacement, PanelText,
    ProcedureEdgePlacement, ScenarioPlacement, SeparatorPlacement,
};

use cjm_core::geom::{Size, point, rect, size, vector};
use cjm_core::{EdgeKind, EndGroup, GraphModel, ProcedureModel};
use order::Grid;
use rank::Ranking;
use rustc_hash::FxHashMap as HashMap;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where one end marker goes inside its procedure grid.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EndSlot {
    /// Row of the trailing marker column.
    Column(f64),
    /// Position in the row under the grid.
    Below(usize),
}

struct ProcedureGrid<'a> {
    procedure: &'a ProcedureModel,
    ranking: Ranking,
    grid: Grid,
    end_slots: Vec<(&'a EndGroup, EndSlot)>,
    columns: usize,
    rows: f64,
}

impl<'a> ProcedureGrid<'a> {
    fn new(procedure: &'a ProcedureModel, config: &LayoutConfig) -> Self {
        let ranking = rank::rank_blocks(procedure);
        let grid = order::order_blocks(procedure, &ranking);
        let block_columns = ranking.max_level + 1;
        let has_end_column = block_columns < config.max_columns;

        let mut end_slots: Vec<(&EndGroup, EndSlot)> = Vec::new();
        let mut rows = grid.height;
        if has_end_column {
            let mut desired: Vec<(f64, usize, &EndGroup)> = procedure
                .end_groups
                .iter()
                .enumerate()
                .map(|(i, group)| {
                    let member_rows: Vec<f64> = group
                        .members
                        .iter()
                        .filter_map(|m| grid.row(&m.block_id))
                        .collect();
                    let row = if member_rows.is_empty() {
                        0.0
                    } else {
                        member_rows.iter().sum::<f64>() / member_rows.len() as f64
                    };
                    (row, i, group)
                })
                .collect();
            desired.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let mut next_free = 0.0_f64;
            for (row, _, group) in desired {
                let row = row.max(next_free);
                end_slots.push((group, EndSlot::Column(row)));
                next_free = row + 1.0;
            }
            rows = rows.max(next_free);
        } else if !procedure.end_groups.is_empty() {
            end_slots.extend(
                procedure
                    .end_groups
                    .iter()
                    .enumerate()
                    .map(|(i, group)| (group, EndSlot::Below(i))),
            );
            rows += 1.0;
        }

        let columns = block_columns + usize::from(has_end_column && !procedure.end_groups.is_empty());
        Self {
            procedure,
            ranking,
            grid,
            end_slots,
            columns,
            rows,
        }
    }

    fn content_size(&self, config: &LayoutConfig) -> Size {
        let cols = self.columns as f64;
        size(
            cols * config.block_size.width + (cols - 1.0) * config.gap_x,
            self.rows * config.block_size.height + (self.rows - 1.0).max(0.0) * config.gap_y,
        )
    }

    fn frame_size(&self, config: &LayoutConfig) -> Size {
        let content = self.content_size(config);
        size(
            config.padding * 2.0 + config.start_lane_width() + content.width,
            config.padding * 2.0 + content.height,
        )
    }
}

/// Lays out every procedure of `model`.
pub fn layout(model: &GraphModel, config: &LayoutConfig) -> LayoutPlan {
    let grids: Vec<ProcedureGrid<'_>> = model
        .procedures
        .iter()
        .map(|p| ProcedureGrid::new(p, config))
        .collect();
    let sizes: HashMap<String, Size> = grids
        .iter()
        .map(|g| (g.procedure.id.clone(), g.frame_size(config)))
        .collect();
    let arrangement =
        arrange::arrange_procedures(model, &sizes, config.lane_gap, config.component_gap());

    let numbered_starts = model.start_block_count() > 1;
    let mut start_ordinal = 0;
    let mut plan = LayoutPlan {
        config: *config,
        ..LayoutPlan::default()
    };

    for g in &grids {
        let id = g.procedure.id.as_str();
        let Some(slot) = arrangement.slots.get(id) else {
            continue;
        };
        let frame_size = sizes.get(id).copied().unwrap_or_else(|| g.frame_size(config));
        plan.frames.push(FramePlacement {
            procedure_id: id.to_string(),
            component: slot.component,
            level: slot.level,
            bounds: rect(slot.origin.x, slot.origin.y, frame_size.width, frame_size.height),
        });

        let content = slot.origin + vector(config.padding + config.start_lane_width(), config.padding);
        let centre_marker = vector(
            (config.block_size.width - config.marker_size.width) / 2.0,
            (config.block_size.height - config.marker_size.height) / 2.0,
        );

        for (block_id, level) in &g.ranking.order {
            let row = g.grid.row(block_id).unwrap_or(0.0);
            let at = content
                + vector(
                    *level as f64 * config.column_pitch(),
                    row * config.row_pitch(),
                );
            plan.block_index
                .insert((id.to_string(), block_id.clone()), plan.blocks.len());
            plan.blocks.push(BlockPlacement {
                procedure_id: id.to_string(),
                block_id: block_id.clone(),
                level: *level,
                row,
                bounds: rect(at.x, at.y, config.block_size.width, config.block_size.height),
            });
        }

        for start in &g.procedure.start_block_ids {
            let Some(block) = plan.block(id, start) else {
                continue;
            };
            let x = block.bounds.origin.x - config.start_lane_width();
            let y = block.bounds.origin.y + centre_marker.y;
            start_ordinal += 1;
            let ordinal = numbered_starts.then_some(start_ordinal);
            plan.markers.push(MarkerPlacement {
                procedure_id: id.to_string(),
                kind: MarkerKind::Start {
                    block_id: start.clone(),
                    ordinal,
                },
                label: match ordinal {
                    Some(n) => format!("START #{n}"),
                    None => "START".to_string(),
                },
                bounds: rect(x, y, config.marker_size.width, config.marker_size.height),
            });
        }

        let block_columns = (g.ranking.max_level + 1) as f64;
        let below_count = g
            .end_slots
            .iter()
            .filter(|(_, s)| matches!(s, EndSlot::Below(_)))
            .count() as f64;
        let below_width = below_count * config.marker_size.width
            + (below_count - 1.0).max(0.0) * config.gap_x;
        for (group, end_slot) in &g.end_slots {
            let at = match *end_slot {
                EndSlot::Column(row) => {
                    content
                        + vector(block_columns * config.column_pitch(), row * config.row_pitch())
                        + centre_marker
                }
                EndSlot::Below(i) => {
                    content
                        + vector(
                            (g.content_size(config).width - below_width) / 2.0
                                + i as f64 * (config.marker_size.width + config.gap_x),
                            g.grid.height * config.row_pitch() + centre_marker.y,
                        )
                }
            };
            plan.markers.push(MarkerPlacement {
                procedure_id: id.to_string(),
                kind: MarkerKind::End {
                    end_type: group.end_type,
                },
                label: group.end_type.label().to_string(),
                bounds: rect(at.x, at.y, config.marker_size.width, config.marker_size.height),
            });
        }

        plan.block_cycles
            .insert(id.to_string(), g.ranking.cycle_edges.clone());
    }

    plan.procedure_edges = model
        .procedure_edges
        .iter()
        .map(|e| {
            let is_cycle = arrangement
                .cycle_edges
                .contains(&cjm_graphlib::EdgeKey::new(e.source.as_str(), e.target.as_str()));
            ProcedureEdgePlacement {
                source: e.source.clone(),
                target: e.target.clone(),
                origin: e.origin,
                kind: if is_cycle {
                    EdgeKind::ProcedureGraphCycle
                } else {
                    EdgeKind::ProcedureGraph
                },
            }
        })
        .collect();
    plan.procedure_cycles = arrangement.cycle_edges;

    if config.separators {
        let min_x = plan.frames.iter().map(|f| f.bounds.min_x()).reduce(f64::min);
        let max_x = plan.frames.iter().map(|f| f.bounds.max_x()).reduce(f64::max);
        if let (Some(min_x), Some(max_x)) = (min_x, max_x) {
            plan.separators = arrangement
                .gap_centres
                .iter()
                .map(|&y| SeparatorPlacement {
                    start: point(min_x - config.separator_margin_x, y),
                    end: point(max_x + config.separator_margin_x, y),
                })
                .collect();
        }
    }
    if config.scenarios {
        plan.scenarios = scenario::build_scenarios(model, &plan.frames, config);
    }

    tracing::debug!(
        frames = plan.frames.len(),
        blocks = plan.blocks.len(),
        markers = plan.markers.len(),
        block_cycles = plan.block_cycles.values().map(|c| c.len()).sum::<usize>(),
        procedure_cycles = plan.procedure_cycles.len(),
        scenarios = plan.scenarios.len(),
        "laid out document"
    );
    plan
}
