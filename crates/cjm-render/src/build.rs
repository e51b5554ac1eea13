//! Maps a laid-out [`GraphModel`] onto a format-neutral [`Scene`].

use crate::meta::{DocumentMeta, ElementMeta, Role};
use crate::scene::{
    BoundKind, Connector, ElementKind, FillStyle, Scene, SceneElement, ShapeKind, StrokeStyle,
    Style, TextAlign, TextContent, palette,
};
use crate::text::fit_text;
use crate::RenderOptions;
use cjm_core::geom::{Point, Rect, Vector, point, rect, vector};
use cjm_core::stable_id::{derive, derive_global};
use cjm_core::{
    EdgeKind, EndType, GraphModel, ProcedureEdgeOrigin, ProcedureModel, StableId,
};
use cjm_layout::{
    BlockPlacement, LayoutPlan, MarkerKind, MarkerPlacement, PanelText, ScenarioPlacement,
    SeparatorPlacement,
};
use rustc_hash::FxHashMap as HashMap;

const TITLE_FONT_SIZE: f64 = 36.0;
const TITLE_PANEL_HEIGHT: f64 = 96.0;
const TITLE_PANEL_MIN_WIDTH: f64 = 420.0;
const TITLE_PANEL_MARGIN: f64 = 160.0;
const TITLE_GAP: f64 = 160.0;
const PROCEDURE_CYCLE_CURVE: f64 = 100.0;

pub fn frame_id(procedure_id: &str) -> StableId {
    derive(&[procedure_id], "frame", &[])
}

pub fn block_id(procedure_id: &str, block_id: &str) -> StableId {
    derive(&[procedure_id], "block", &[block_id])
}

fn marker_key(kind: &MarkerKind) -> (Role, String) {
    match kind {
        MarkerKind::Start { block_id, .. } => (Role::StartMarker, block_id.clone()),
        MarkerKind::End { end_type } => (Role::EndMarker, end_type.as_str().to_string()),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::StartMarker => "start_marker",
        Role::EndMarker => "end_marker",
        _ => "marker",
    }
}

pub fn start_marker_id(procedure_id: &str, block_id: &str) -> StableId {
    derive(&[procedure_id], "marker", &["start_marker", block_id])
}

pub fn end_marker_id(procedure_id: &str, end_type: EndType) -> StableId {
    derive(&[procedure_id], "marker", &["end_marker", end_type.as_str()])
}

struct SceneBuilder<'a> {
    model: &'a GraphModel,
    plan: &'a LayoutPlan,
    options: &'a RenderOptions,
    document: DocumentMeta,
    elements: Vec<SceneElement>,
}

/// Builds every element of the scene: frames, blocks with labels, markers with labels,
/// connectors, component separators, summary panels and the diagram title, re-centred on
/// the first frame. Link templates are applied last.
pub fn build_scene(model: &GraphModel, plan: &LayoutPlan, options: &RenderOptions) -> Scene {
    let mut b = SceneBuilder {
        model,
        plan,
        options,
        document: DocumentMeta::from_markup(&model.markup),
        elements: Vec::new(),
    };

    for frame in &plan.frames {
        if let Some(procedure) = model.procedure(&frame.procedure_id) {
            b.frame(procedure, frame.bounds);
        }
    }
    for block in &plan.blocks {
        if let Some(procedure) = model.procedure(&block.procedure_id) {
            b.block(procedure, block);
        }
    }
    for marker in &plan.markers {
        b.marker(marker);
    }
    for procedure in &model.procedures {
        b.start_edges(procedure);
        b.end_edges(procedure);
        b.block_edges(procedure);
    }
    b.procedure_edges();
    for (index, separator) in plan.separators.iter().enumerate() {
        b.separator(index, separator);
    }
    for scenario in &plan.scenarios {
        b.scenario(scenario);
    }
    if options.title {
        b.title();
    }

    let mut scene = Scene {
        elements: b.elements,
    };
    link_bound_elements(&mut scene);
    options.links.apply(&mut scene);
    if options.recenter {
        let anchor = plan.anchor();
        scene.translate(vector(-anchor.x, -anchor.y));
    }

    tracing::debug!(
        elements = scene.elements.len(),
        connectors = scene.elements.iter().filter(|e| e.is_connector()).count(),
        "built scene"
    );
    scene
}

impl SceneBuilder<'_> {
    fn meta(&self, role: Role, procedure_id: &str) -> ElementMeta {
        ElementMeta::in_procedure(&self.document, role, procedure_id)
    }

    fn push(
        &mut self,
        id: StableId,
        kind: ElementKind,
        bounds: Rect,
        style: Style,
        frame_id: Option<StableId>,
        group_ids: Vec<StableId>,
        meta: ElementMeta,
    ) {
        self.elements.push(SceneElement {
            id,
            kind,
            bounds,
            style,
            frame_id,
            group_ids,
            bound_elements: Vec::new(),
            link: None,
            meta,
        });
    }

    fn frame(&mut self, procedure: &ProcedureModel, bounds: Rect) {
        let mut meta = self.meta(Role::Frame, &procedure.id);
        meta.procedure_name = procedure.name.clone();
        meta.branches = procedure.superseded_branches.clone();
        meta.procedure_meta = procedure.meta.clone();

        let background = procedure
            .meta
            .as_ref()
            .and_then(|m| m.color.clone())
            .unwrap_or_else(|| palette::TRANSPARENT.to_string());
        self.push(
            frame_id(&procedure.id),
            ElementKind::Frame {
                name: procedure.title.clone(),
            },
            bounds,
            Style {
                background_color: background,
                ..Style::default()
            },
            None,
            Vec::new(),
            meta,
        );
    }

    fn block(&mut self, procedure: &ProcedureModel, placement: &BlockPlacement) {
        let Some(block) = procedure.block(&placement.block_id) else {
            return;
        };
        let pid = procedure.id.as_str();
        let rect_id = block_id(pid, &block.id);
        let text_id = derive(&[pid], "block-text", &[block.id.as_str()]);
        let group = derive(&[pid], "group", &[block.id.as_str()]);

        let mut meta = self.meta(Role::Block, pid);
        meta.block_id = Some(block.id.clone());
        meta.block_name = block.name.clone();
        meta.end_block_type = block.end_type;

        let background = if block.is_start {
            palette::START_BLOCK
        } else if block.end_type == Some(EndType::Intermediate) {
            palette::INTERMEDIATE_BLOCK
        } else {
            palette::BLOCK
        };
        self.push(
            rect_id,
            ElementKind::Shape(ShapeKind::Rectangle),
            placement.bounds,
            Style {
                background_color: background.to_string(),
                fill_style: FillStyle::Hachure,
                ..Style::default()
            },
            Some(frame_id(pid)),
            vec![group],
            meta.clone(),
        );

        let bounds = placement.bounds;
        let max_width = (bounds.size.width - 24.0).max(100.0);
        let max_height = (bounds.size.height - 24.0).max(24.0);
        let label = self.label(
            block.display_text(),
            bounds.center(),
            max_width,
            max_height,
            self.options.block_font_size,
            rect_id,
        );
        meta.role = Role::BlockLabel;
        self.push(
            text_id,
            label.0,
            label.1,
            Style::default(),
            Some(frame_id(pid)),
            vec![group],
            meta,
        );
    }

    fn label(
        &self,
        text: &str,
        centre: Point,
        max_width: f64,
        max_height: f64,
        font_size: f64,
        container: StableId,
    ) -> (ElementKind, Rect) {
        let fitted = fit_text(
            self.options.text_measurer.as_ref(),
            text,
            max_width,
            max_height,
            font_size,
            self.options.min_font_size,
        );
        let bounds = rect(
            centre.x - max_width / 2.0,
            centre.y - fitted.height / 2.0,
            max_width,
            fitted.height,
        );
        (
            ElementKind::Text(TextContent {
                text: fitted.text,
                font_size: fitted.font_size,
                container_id: Some(container),
                align: TextAlign::Center,
            }),
            bounds,
        )
    }

    fn marker(&mut self, marker: &MarkerPlacement) {
        let pid = marker.procedure_id.as_str();
        let (role, key) = marker_key(&marker.kind);
        let shape_id = match &marker.kind {
            MarkerKind::Start { block_id, .. } => start_marker_id(pid, block_id),
            MarkerKind::End { end_type } => end_marker_id(pid, *end_type),
        };
        let group = derive(&[pid], "marker-group", &[role_name(role), key.as_str()]);
        let text_id = derive(&[pid], "marker-text", &[role_name(role), key.as_str()]);

        let mut meta = self.meta(role, pid);
        let mut style = Style {
            fill_style: FillStyle::Solid,
            ..Style::default()
        };
        match &marker.kind {
            MarkerKind::Start { block_id, .. } => {
                meta.block_id = Some(block_id.clone());
                style.background_color = palette::START_MARKER.to_string();
            }
            MarkerKind::End { end_type } => {
                meta.end_type = Some(*end_type);
                style.background_color = palette::end_marker(*end_type).to_string();
                if *end_type == EndType::Intermediate {
                    style.stroke_style = StrokeStyle::Dashed;
                }
            }
        }
        self.push(
            shape_id,
            ElementKind::Shape(ShapeKind::Ellipse),
            marker.bounds,
            style,
            Some(frame_id(pid)),
            vec![group],
            meta.clone(),
        );

        let bounds = marker.bounds;
        let label = self.label(
            &marker.label,
            bounds.center(),
            bounds.size.width - 24.0,
            (bounds.size.height - 14.0).min(52.0),
            self.options.marker_font_size,
            shape_id,
        );
        meta.role = Role::MarkerLabel;
        self.push(
            text_id,
            label.0,
            label.1,
            Style::default(),
            Some(frame_id(pid)),
            vec![group],
            meta,
        );
    }

    fn start_edges(&mut self, procedure: &ProcedureModel) {
        let plan = self.plan;
        let pid = procedure.id.as_str();
        for start in &procedure.start_block_ids {
            let (Some(marker), Some(block)) =
                (plan.start_marker(pid, start), plan.block(pid, start))
            else {
                continue;
            };
            let from = side_anchor(&marker.bounds, Side::Right, 0.0);
            let to = side_anchor(&block.bounds, Side::Left, 0.0);

            let mut meta = self.meta(Role::Edge, pid);
            meta.edge_type = Some(EdgeKind::Start);
            meta.target_block_id = Some(start.clone());
            self.connector(
                derive(&[pid], "edge", &["start", start.as_str()]),
                from,
                straight(from, to),
                EdgeKind::Start,
                start_marker_id(pid, start),
                block_id(pid, start),
                false,
                meta,
            );
        }
    }

    fn end_edges(&mut self, procedure: &ProcedureModel) {
        let plan = self.plan;
        let pid = procedure.id.as_str();
        for group in &procedure.end_groups {
            let Some(marker) = plan.end_marker(pid, group.end_type) else {
                continue;
            };
            for member in &group.members {
                let Some(block) = plan.block(pid, &member.block_id) else {
                    continue;
                };
                let from = side_anchor(&block.bounds, Side::Right, 0.0);
                let to = side_anchor(&marker.bounds, Side::Left, 0.0);

                let mut meta = self.meta(Role::Edge, pid);
                meta.edge_type = Some(EdgeKind::End);
                meta.end_type = Some(group.end_type);
                meta.source_block_id = Some(member.block_id.clone());
                meta.implicit = member.implicit;
                self.connector(
                    derive(
                        &[pid],
                        "edge",
                        &["end", member.block_id.as_str(), group.end_type.as_str()],
                    ),
                    from,
                    straight(from, to),
                    EdgeKind::End,
                    block_id(pid, &member.block_id),
                    end_marker_id(pid, group.end_type),
                    false,
                    meta,
                );
            }
        }
    }

    fn block_edges(&mut self, procedure: &ProcedureModel) {
        let plan = self.plan;
        let pid = procedure.id.as_str();
        for edge in &procedure.edges {
            let (Some(source), Some(target)) = (
                plan.block(pid, &edge.source),
                plan.block(&edge.target_procedure, &edge.target),
            ) else {
                continue;
            };
            let kind = plan.edge_kind(pid, edge);
            let (from, route) = if kind.is_cycle() {
                let from = side_anchor(&source.bounds, Side::Top, 0.0);
                let to = side_anchor(&target.bounds, Side::Top, 0.0);
                (from, elbow(from, to, plan.config.cycle_elbow_offset))
            } else {
                let dy = plan.config.branch_offset(edge.ordinal, edge.sibling_count);
                let from = side_anchor(&source.bounds, Side::Right, dy);
                let to = side_anchor(&target.bounds, Side::Left, dy);
                (from, straight(from, to))
            };

            let mut meta = self.meta(Role::Edge, pid);
            meta.edge_type = Some(kind);
            meta.source_block_id = Some(edge.source.clone());
            meta.target_block_id = Some(edge.target.clone());
            meta.target_procedure_id = Some(edge.target_procedure.clone());
            self.connector(
                derive(
                    &[pid],
                    "edge",
                    &[
                        kind.base().as_str(),
                        edge.source.as_str(),
                        edge.target_procedure.as_str(),
                        edge.target.as_str(),
                    ],
                ),
                from,
                route,
                kind,
                block_id(pid, &edge.source),
                block_id(&edge.target_procedure, &edge.target),
                false,
                meta,
            );
        }
    }

    /// Explicit links round-trip into `procedure_graph`; derived and sequential ones are
    /// drawn as implicit connectors the importer skips.
    fn procedure_edges(&mut self) {
        let plan = self.plan;
        for edge in &plan.procedure_edges {
            let (Some(source), Some(target)) =
                (plan.frame(&edge.source), plan.frame(&edge.target))
            else {
                continue;
            };
            let to = side_anchor(&target.bounds, Side::Left, 0.0);
            let (from, route) = if edge.kind.is_cycle() {
                let from = point(source.bounds.center().x, source.bounds.max_y());
                (from, curve(from, to, PROCEDURE_CYCLE_CURVE))
            } else {
                let from = side_anchor(&source.bounds, Side::Right, 0.0);
                (from, straight(from, to))
            };

            let mut meta = self.meta(Role::Edge, &edge.source);
            meta.edge_type = Some(edge.kind);
            meta.target_procedure_id = Some(edge.target.clone());
            meta.implicit = edge.origin != ProcedureEdgeOrigin::Explicit;
            self.connector(
                derive(&[edge.source.as_str()], "edge", &["procedure", edge.target.as_str()]),
                from,
                route,
                edge.kind,
                frame_id(&edge.source),
                frame_id(&edge.target),
                edge.kind.is_cycle(),
                meta,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connector(
        &mut self,
        id: StableId,
        from: Point,
        route: Vec<Vector>,
        kind: EdgeKind,
        start: StableId,
        end: StableId,
        curved: bool,
        meta: ElementMeta,
    ) {
        let (origin, size, points) = normalize_route(from, &route);
        let mut style = Style::default();
        if kind.is_cycle() {
            style.stroke_color = palette::CYCLE.to_string();
            style.stroke_style = StrokeStyle::Dashed;
            style.stroke_width = if kind == EdgeKind::ProcedureGraphCycle {
                2.0
            } else {
                1.0
            };
        }
        let show_label = matches!(
            kind,
            EdgeKind::Branch
                | EdgeKind::BranchCycle
                | EdgeKind::BlockGraphCycle
                | EdgeKind::ProcedureGraphCycle
        );
        self.push(
            id,
            ElementKind::Connector(Connector {
                points,
                start_binding: Some(start),
                end_binding: Some(end),
                label: kind.as_str().to_string(),
                show_label,
                curved,
            }),
            rect(origin.x, origin.y, size.x, size.y),
            style,
            None,
            Vec::new(),
            meta,
        );
    }

    fn separator(&mut self, index: usize, separator: &SeparatorPlacement) {
        let mut meta = ElementMeta::new(&self.document, Role::Separator);
        meta.separator_index = Some(index);
        let (origin, size, points) =
            normalize_route(separator.start, &straight(separator.start, separator.end));
        self.push(
            derive_global("separator", &[index.to_string().as_str()]),
            ElementKind::Line { points },
            rect(origin.x, origin.y, size.x, size.y),
            Style {
                stroke_color: palette::SEPARATOR.to_string(),
                stroke_style: StrokeStyle::Dashed,
                stroke_width: 2.0,
                ..Style::default()
            },
            None,
            Vec::new(),
            meta,
        );
    }

    /// Summary panel and procedure list of one component, grouped together.
    fn scenario(&mut self, scenario: &ScenarioPlacement) {
        let number = scenario.component + 1;
        let key = number.to_string();
        let group = derive_global("scenario-group", &[key.as_str()]);
        let meta = |role: Role| {
            let mut meta = ElementMeta::new(&self.document, role);
            meta.scenario_index = Some(number);
            meta
        };
        let panel = |background: &str, stroke: &str| Style {
            background_color: background.to_string(),
            stroke_color: stroke.to_string(),
            fill_style: FillStyle::Solid,
            ..Style::default()
        };

        let mut parts: Vec<(StableId, ElementKind, Rect, Style, ElementMeta)> = vec![(
            derive_global("scenario-panel", &[key.as_str()]),
            ElementKind::Shape(ShapeKind::Rectangle),
            scenario.bounds,
            panel(palette::SCENARIO_PANEL, palette::SCENARIO_STROKE),
            meta(Role::ScenarioPanel),
        )];
        let text = |id: &str, content: &PanelText, color: &str, role: Role| {
            (
                derive_global(id, &[key.as_str()]),
                ElementKind::Text(TextContent {
                    text: content.text.clone(),
                    font_size: content.font_size,
                    container_id: None,
                    align: TextAlign::Left,
                }),
                content.bounds,
                Style {
                    stroke_color: color.to_string(),
                    ..Style::default()
                },
                meta(role),
            )
        };
        parts.push(text(
            "scenario-title",
            &scenario.title,
            palette::STROKE,
            Role::ScenarioTitle,
        ));
        if let Some(cycles) = &scenario.cycles {
            parts.push(text("scenario-cycles", cycles, palette::CYCLE, Role::ScenarioCycle));
        }
        parts.push(text(
            "scenario-body",
            &scenario.body,
            palette::STROKE,
            Role::ScenarioBody,
        ));
        parts.push((
            derive_global("scenario-procedures-panel", &[key.as_str()]),
            ElementKind::Shape(ShapeKind::Rectangle),
            scenario.procedures_bounds,
            panel(palette::PROCEDURES_PANEL, palette::PROCEDURES_STROKE),
            meta(Role::ScenarioProceduresPanel),
        ));
        parts.push(text(
            "scenario-procedures",
            &scenario.procedures,
            palette::STROKE,
            Role::ScenarioProcedures,
        ));

        for (id, kind, bounds, style, meta) in parts {
            self.push(id, kind, bounds, style, None, vec![group], meta);
        }
    }

    fn title(&mut self) {
        let Some(bounds) = self.plan.bounds() else {
            return;
        };
        let markup = &self.model.markup;
        let text = match markup.service_name() {
            Some(service) => format!("[{}] {service}", markup.markup_type),
            None => format!("[{}]", markup.markup_type),
        };

        let mut meta = ElementMeta::new(&self.document, Role::DiagramTitle);
        meta.finedog_unit_meta =
            (!markup.finedog_unit_meta.is_empty()).then(|| markup.finedog_unit_meta.clone());
        meta.has_procedure_graph = markup.procedure_graph.is_some();

        let width = (bounds.size.width + TITLE_PANEL_MARGIN).max(TITLE_PANEL_MIN_WIDTH);
        let panel = rect(
            bounds.center().x - width / 2.0,
            bounds.min_y() - TITLE_GAP - TITLE_PANEL_HEIGHT,
            width,
            TITLE_PANEL_HEIGHT,
        );
        let panel_id = derive_global("diagram-title-panel", &[]);
        let group = derive_global("diagram-title-group", &[]);
        self.push(
            panel_id,
            ElementKind::Shape(ShapeKind::Rectangle),
            panel,
            Style {
                stroke_color: palette::TITLE_STROKE.to_string(),
                background_color: palette::TITLE_PANEL.to_string(),
                ..Style::default()
            },
            None,
            vec![group],
            meta.clone(),
        );
        let label = self.label(
            &text,
            panel.center(),
            width - 48.0,
            TITLE_PANEL_HEIGHT - 24.0,
            TITLE_FONT_SIZE,
            panel_id,
        );
        self.push(
            derive_global("diagram-title", &[]),
            label.0,
            label.1,
            Style::default(),
            None,
            vec![group],
            meta,
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
    Top,
}

fn side_anchor(bounds: &Rect, side: Side, dy: f64) -> Point {
    let mid_y = bounds.center().y + dy;
    match side {
        Side::Left => point(bounds.min_x(), mid_y),
        Side::Right => point(bounds.max_x(), mid_y),
        Side::Top => point(bounds.center().x, bounds.min_y()),
    }
}

fn straight(from: Point, to: Point) -> Vec<Vector> {
    vec![vector(0.0, 0.0), to - from]
}

/// Direction the detour of a cycle connector bends to: up for forward-pointing routes.
fn bend_direction(d: Vector) -> f64 {
    let forward = if d.x == 0.0 { d.y >= 0.0 } else { d.x > 0.0 };
    if forward { -1.0 } else { 1.0 }
}

fn elbow(from: Point, to: Point, offset: f64) -> Vec<Vector> {
    let d = to - from;
    let off = offset * bend_direction(d);
    vec![
        vector(0.0, 0.0),
        vector(0.0, off),
        vector(d.x, off),
        vector(d.x, d.y),
    ]
}

fn curve(from: Point, to: Point, offset: f64) -> Vec<Vector> {
    let d = to - from;
    vec![
        vector(0.0, 0.0),
        vector(d.x / 2.0, d.y / 2.0 + offset * bend_direction(d)),
        d,
    ]
}

/// Shifts a route so its bounding box starts at zero; returns the new origin, the box size
/// and the shifted points.
fn normalize_route(from: Point, route: &[Vector]) -> (Point, Vector, Vec<Vector>) {
    let min_x = route.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let min_y = route.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_x = route.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = route.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    if route.is_empty() {
        return (from, vector(0.0, 0.0), Vec::new());
    }
    let shift = vector(min_x, min_y);
    (
        from + shift,
        vector(max_x - min_x, max_y - min_y),
        route.iter().map(|p| *p - shift).collect(),
    )
}

/// Records every connector on the shapes it binds and every label on its container.
fn link_bound_elements(scene: &mut Scene) {
    let index: HashMap<StableId, usize> = scene
        .elements
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id, i))
        .collect();
    let mut links: Vec<(usize, StableId, BoundKind)> = Vec::new();
    for element in &scene.elements {
        match &element.kind {
            ElementKind::Connector(c) => {
                for target in [c.start_binding, c.end_binding].into_iter().flatten() {
                    if let Some(&i) = index.get(&target) {
                        links.push((i, element.id, BoundKind::Arrow));
                    }
                }
            }
            ElementKind::Text(t) => {
                if let Some(&i) = t.container_id.as_ref().and_then(|c| index.get(c)) {
                    links.push((i, element.id, BoundKind::Text));
                }
            }
            _ => {}
        }
    }
    for (i, id, kind) in links {
        let bound = &mut scene.elements[i].bound_elements;
        if !bound.iter().any(|(existing, _)| *existing == id) {
            bound.push((id, kind));
        }
    }
}
