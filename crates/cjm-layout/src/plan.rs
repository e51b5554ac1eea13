use crate::config::LayoutConfig;
use cjm_core::geom::{Point, Rect, point, union_all};
use cjm_core::{BlockEdge, EdgeKind, EndType, ProcedureEdgeOrigin};
use cjm_graphlib::EdgeKey;
use rustc_hash::FxHashMap as HashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlacement {
    pub procedure_id: String,
    /// Weak component of the procedure arrangement, numbered from 0.
    pub component: usize,
    pub level: usize,
    pub bounds: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlacement {
    pub procedure_id: String,
    pub block_id: String,
    pub level: usize,
    pub row: f64,
    pub bounds: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    /// `ordinal` numbers the start markers when a document has more than one.
    Start {
        block_id: String,
        ordinal: Option<usize>,
    },
    End {
        end_type: EndType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPlacement {
    pub procedure_id: String,
    pub kind: MarkerKind,
    pub label: String,
    pub bounds: Rect,
}

impl MarkerPlacement {
    pub fn is_start(&self) -> bool {
        matches!(self.kind, MarkerKind::Start { .. })
    }

    pub fn end_type(&self) -> Option<EndType> {
        match self.kind {
            MarkerKind::End { end_type } => Some(end_type),
            MarkerKind::Start { .. } => None,
        }
    }
}

/// A procedure-level arrangement edge and whether it closes a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureEdgePlacement {
    pub source: String,
    pub target: String,
    pub origin: ProcedureEdgeOrigin,
    pub kind: EdgeKind,
}

/// Dashed rule between two stacked components.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatorPlacement {
    pub start: Point,
    pub end: Point,
}

/// Text section of a summary panel, already wrapped into lines.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelText {
    pub text: String,
    pub font_size: f64,
    pub bounds: Rect,
}

/// Summary of one procedure component, drawn left of its frames: a panel with the graph
/// properties and complexity counts, and a procedure list under it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlacement {
    pub component: usize,
    pub bounds: Rect,
    pub title: PanelText,
    /// Only for cyclic components.
    pub cycles: Option<PanelText>,
    pub body: PanelText,
    pub procedures_bounds: Rect,
    pub procedures: PanelText,
}

/// Positions for every frame, block and marker of one document.
#[derive(Debug, Clone, Default)]
pub struct LayoutPlan {
    pub config: LayoutConfig,
    pub frames: Vec<FramePlacement>,
    pub blocks: Vec<BlockPlacement>,
    pub markers: Vec<MarkerPlacement>,
    pub procedure_edges: Vec<ProcedureEdgePlacement>,
    /// Local cycle edges per procedure.
    pub block_cycles: BTreeMap<String, BTreeSet<EdgeKey>>,
    pub procedure_cycles: BTreeSet<EdgeKey>,
    pub separators: Vec<SeparatorPlacement>,
    pub scenarios: Vec<ScenarioPlacement>,
    pub(crate) block_index: HashMap<(String, String), usize>,
}

impl LayoutPlan {
    pub fn frame(&self, procedure_id: &str) -> Option<&FramePlacement> {
        self.frames.iter().find(|f| f.procedure_id == procedure_id)
    }

    pub fn block(&self, procedure_id: &str, block_id: &str) -> Option<&BlockPlacement> {
        let idx = self
            .block_index
            .get(&(procedure_id.to_string(), block_id.to_string()))?;
        self.blocks.get(*idx)
    }

    pub fn start_marker(&self, procedure_id: &str, block_id: &str) -> Option<&MarkerPlacement> {
        self.markers.iter().find(|m| {
            m.procedure_id == procedure_id
                && matches!(&m.kind, MarkerKind::Start { block_id: b, .. } if b == block_id)
        })
    }

    pub fn end_marker(&self, procedure_id: &str, end_type: EndType) -> Option<&MarkerPlacement> {
        self.markers
            .iter()
            .find(|m| m.procedure_id == procedure_id && m.end_type() == Some(end_type))
    }

    /// Kind to draw `edge` (owned by `procedure_id`) with.
    ///
    /// Local edges use the procedure's own cycle set; block-graph links into another
    /// procedure are cycles when the procedure pair is.
    pub fn edge_kind(&self, procedure_id: &str, edge: &BlockEdge) -> EdgeKind {
        let is_cycle = if edge.target_procedure == procedure_id {
            self.block_cycles
                .get(procedure_id)
                .is_some_and(|c| c.contains(&EdgeKey::new(edge.source.as_str(), edge.target.as_str())))
        } else {
            self.procedure_cycles.contains(&EdgeKey::new(
                procedure_id,
                edge.target_procedure.as_str(),
            ))
        };
        if is_cycle { edge.kind.as_cycle() } else { edge.kind }
    }

    /// Smallest rectangle around every frame and marker.
    pub fn bounds(&self) -> Option<Rect> {
        union_all(
            self.frames
                .iter()
                .map(|f| &f.bounds)
                .chain(self.markers.iter().map(|m| &m.bounds)),
        )
    }

    /// Centre of the first frame; scenes are re-centred on it.
    pub fn anchor(&self) -> Point {
        self.frames
            .first()
            .map(|f| f.bounds.center())
            .unwrap_or_else(|| point(0.0, 0.0))
    }
}
