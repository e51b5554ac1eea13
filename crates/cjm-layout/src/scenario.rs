//! Summary panels for procedure components.
//!
//! Each component gets a panel left of its leftmost frame listing the properties of its
//! procedure graph and three complexity counts, and under it a list of its procedures.
//! Text is wrapped here by an average glyph width so the plan carries final line breaks.

use crate::config::{LayoutConfig, ScenarioConfig};
use crate::plan::{FramePlacement, PanelText, ScenarioPlacement};
use cjm_core::geom::{Rect, rect, union_all};
use cjm_core::metrics::graph_metrics;
use cjm_core::{GraphModel, ProcedureModel};
use cjm_graphlib::{Graph, alg};
use std::collections::BTreeSet;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const LINE_HEIGHT: f64 = 1.35;
/// Average glyph width as a share of the font size.
const GLYPH_WIDTH: f64 = 0.6;

pub(crate) fn build_scenarios(
    model: &GraphModel,
    frames: &[FramePlacement],
    config: &LayoutConfig,
) -> Vec<ScenarioPlacement> {
    let count = frames.iter().map(|f| f.component + 1).max().unwrap_or(0);
    (0..count)
        .filter_map(|component| {
            let members: Vec<&FramePlacement> =
                frames.iter().filter(|f| f.component == component).collect();
            let title = if count == 1 {
                "Graph".to_string()
            } else {
                format!("Graph {}", component + 1)
            };
            scenario(model, component, &title, &members, &config.scenario)
        })
        .collect()
}

fn scenario(
    model: &GraphModel,
    component: usize,
    title: &str,
    frames: &[&FramePlacement],
    cfg: &ScenarioConfig,
) -> Option<ScenarioPlacement> {
    let area = union_all(frames.iter().map(|f| &f.bounds))?;
    let procedures: Vec<&ProcedureModel> = frames
        .iter()
        .filter_map(|f| model.procedure(&f.procedure_id))
        .collect();
    let summary = summarize(model, &procedures);

    let content_width = cfg.width - cfg.padding * 2.0;
    let title_lines = wrap_lines(&[title.to_string()], content_width, cfg.title_font_size);
    let cycle_lines = summary.cycles.map(|n| {
        wrap_lines(
            &[format!("- cyclic, cycles: {n}")],
            content_width,
            cfg.cycle_font_size,
        )
    });
    let body_lines = wrap_lines(&summary.body_lines(), content_width, cfg.body_font_size);

    let title_height = text_height(&title_lines, cfg.title_font_size);
    let cycle_height = cycle_lines
        .as_ref()
        .map_or(0.0, |l| text_height(l, cfg.cycle_font_size));
    let body_height = text_height(&body_lines, cfg.body_font_size);
    let height = cfg
        .min_height
        .max(title_height + cycle_height + body_height + cfg.padding * 2.0);

    let x = area.min_x() - cfg.gap - cfg.width;
    let y = area.min_y();
    let bounds = rect(x, y, cfg.width, height);
    let section = |lines: Vec<String>, font_size: f64, top: f64, height: f64| PanelText {
        text: lines.join("\n"),
        font_size,
        bounds: rect(x + cfg.padding, top, content_width, height),
    };
    let title_top = y + cfg.padding;
    let title = section(title_lines, cfg.title_font_size, title_top, title_height);
    let cycles = cycle_lines.map(|lines| {
        section(lines, cfg.cycle_font_size, title_top + title_height, cycle_height)
    });
    let body = section(
        body_lines,
        cfg.body_font_size,
        title_top + title_height + cycle_height,
        body_height,
    );

    let list_width = cfg.width - cfg.procedures_padding * 2.0;
    let mut list = vec!["Procedures:".to_string()];
    let labels = procedure_labels(&procedures, frames, cfg.procedures_limit);
    if labels.is_empty() {
        list.push("- (none)".to_string());
    }
    list.extend(labels.into_iter().map(|l| format!("- {l}")));
    let list_lines = wrap_lines(&list, list_width, cfg.procedures_font_size);
    let list_height = text_height(&list_lines, cfg.procedures_font_size);
    let procedures_bounds = rect(
        x,
        y + height + cfg.procedures_gap,
        cfg.width,
        cfg.procedures_min_height
            .max(list_height + cfg.procedures_padding * 2.0),
    );
    let procedures = PanelText {
        text: list_lines.join("\n"),
        font_size: cfg.procedures_font_size,
        bounds: rect(
            x + cfg.procedures_padding,
            procedures_bounds.min_y() + cfg.procedures_padding,
            list_width,
            list_height,
        ),
    };

    Some(ScenarioPlacement {
        component,
        bounds,
        title,
        cycles,
        body,
        procedures_bounds,
        procedures,
    })
}

/// Graph properties and complexity counts of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Summary {
    cycles: Option<usize>,
    vertices: usize,
    edges: usize,
    sources: usize,
    sinks: usize,
    branching: bool,
    merging: bool,
    entries: usize,
    exits: usize,
    variants: usize,
}

impl Summary {
    fn body_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.cycles.is_none() {
            lines.push("- acyclic".to_string());
        }
        lines.extend([
            "- directed".to_string(),
            "- weakly connected".to_string(),
            format!("- vertices: {}", self.vertices),
            format!("- edges: {}", self.edges),
            format!("- sources: {}", self.sources),
            format!("- sinks: {}", self.sinks),
            if self.branching { "- branching" } else { "- no branching" }.to_string(),
            if self.merging { "- merges" } else { "- no merges" }.to_string(),
            String::new(),
            String::new(),
            "Complexity:".to_string(),
            format!("- Entries: {}", self.entries),
            format!("- Exits: {}", self.exits),
            format!("- Variants: {}", self.variants),
        ]);
        lines
    }
}

/// Frames of one component are weakly connected by construction, so only the counts vary.
fn summarize(model: &GraphModel, procedures: &[&ProcedureModel]) -> Summary {
    let ids: BTreeSet<&str> = procedures.iter().map(|p| p.id.as_str()).collect();
    let mut procedure_graph: Graph = Graph::new();
    for p in procedures {
        procedure_graph.ensure_node(p.id.as_str());
    }
    for e in &model.procedure_edges {
        if ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()) {
            procedure_graph.set_edge(e.source.as_str(), e.target.as_str());
        }
    }
    let metrics = graph_metrics(&procedure_graph);

    let mut starts: Vec<&str> = Vec::new();
    let mut exits: BTreeSet<&str> = BTreeSet::new();
    let mut block_graph: Graph = Graph::new();
    for p in procedures {
        for s in &p.start_block_ids {
            if !starts.contains(&s.as_str()) {
                starts.push(s);
            }
        }
        exits.extend(
            p.blocks
                .iter()
                .filter(|b| b.end_type.is_some())
                .map(|b| b.id.as_str()),
        );
        for e in p.local_edges() {
            block_graph.set_edge(e.source.as_str(), e.target.as_str());
        }
    }
    let paths = if block_graph.edge_count() > 0 {
        alg::count_paths(&block_graph, &starts)
    } else {
        alg::count_paths(&procedure_graph, &[])
    };

    Summary {
        cycles: (metrics.cycle_count > 0).then_some(metrics.cycle_count),
        vertices: metrics.vertices,
        edges: metrics.edges,
        sources: metrics.sources,
        sinks: metrics.sinks,
        branching: procedure_graph
            .nodes()
            .any(|v| procedure_graph.out_degree(v) > 1),
        merging: procedure_graph
            .nodes()
            .any(|v| procedure_graph.in_degree(v) > 1),
        entries: starts.len(),
        exits: exits.len(),
        variants: paths.max(1),
    }
}

/// Left to right, then by id. Past `limit`, procedures with start blocks are listed first
/// and the remainder is counted.
fn procedure_labels(
    procedures: &[&ProcedureModel],
    frames: &[&FramePlacement],
    limit: usize,
) -> Vec<String> {
    let x_of = |id: &str| {
        frames
            .iter()
            .find(|f| f.procedure_id == id)
            .map_or(0.0, |f| f.bounds.min_x())
    };
    let mut entries: Vec<(f64, &ProcedureModel)> =
        procedures.iter().map(|p| (x_of(&p.id), *p)).collect();
    entries.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    if entries.len() <= limit {
        return entries.into_iter().map(|(_, p)| p.title.clone()).collect();
    }

    let (with_start, rest): (Vec<_>, Vec<_>) = entries
        .iter()
        .partition(|(_, p)| !p.start_block_ids.is_empty());
    let mut labels: Vec<String> = with_start
        .into_iter()
        .chain(rest)
        .take(limit)
        .map(|(_, p)| p.title.clone())
        .collect();
    labels.push(format!("and {} more", entries.len() - limit));
    labels
}

fn text_height(lines: &[String], font_size: f64) -> f64 {
    lines.len() as f64 * font_size * LINE_HEIGHT
}

/// Greedy word wrap to `max_width`; words longer than a line are cut. Empty lines stay.
pub(crate) fn wrap_lines(lines: &[String], max_width: f64, font_size: f64) -> Vec<String> {
    let max_cols = ((max_width / (font_size * GLYPH_WIDTH)).floor() as usize).max(1);
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            let used = current.width();
            if !current.is_empty() && used + 1 + word.width() <= max_cols {
                current.push(' ');
                current.push_str(word);
                continue;
            }
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            for ch in word.chars() {
                let w = ch.width().unwrap_or(0);
                if !current.is_empty() && current.width() + w > max_cols {
                    out.push(std::mem::take(&mut current));
                }
                current.push(ch);
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wrap_breaks_on_words_and_cuts_long_ones() {
        // 10 columns at font size 10.
        let wrapped = wrap_lines(&lines(&["alpha beta gamma", "", "abcdefghijklmno"]), 60.0, 10.0);
        assert_eq!(
            wrapped,
            lines(&["alpha beta", "gamma", "", "abcdefghij", "klmno"])
        );
    }

    #[test]
    fn narrow_panels_still_fit_one_glyph() {
        assert_eq!(wrap_lines(&lines(&["ab"]), 1.0, 16.0), lines(&["a", "b"]));
    }
}
