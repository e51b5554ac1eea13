//! Service-level view of a merged document.
//!
//! Every service becomes one node per connected group of its procedures, so a service whose
//! procedures never touch each other shows up several times. Nodes are linked where their
//! procedures are, and nodes sharing a procedure are linked both ways.

use crate::merge::SERVICE_COLORS;
use crate::model::{Adjacency, EndSpec, EndType, GraphStats, Markup, Procedure, ProcedureMeta};
use cjm_graphlib::{Graph, alg};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, BTreeSet};

pub const SERVICE_GRAPH_MARKUP_TYPE: &str = "service_graph";

const UNKNOWN_TEAM: &str = "Unknown team";
const UNKNOWN_SERVICE: &str = "Unknown service";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceInfo {
    team_name: String,
    service_name: String,
}

impl ServiceInfo {
    fn key(&self) -> String {
        format!("{}::{}", self.team_name, self.service_name)
    }

    /// Best guess for a key no procedure owns: split at the first separator.
    fn from_key(key: &str) -> Self {
        let (team, service) = key.split_once("::").unwrap_or((UNKNOWN_TEAM, key));
        Self {
            team_name: non_blank(team).unwrap_or(UNKNOWN_TEAM).to_string(),
            service_name: non_blank(service).unwrap_or(UNKNOWN_SERVICE).to_string(),
        }
    }

    fn from_meta(meta: Option<&ProcedureMeta>) -> Self {
        Self {
            team_name: meta
                .and_then(|m| non_blank(m.team_name.as_deref()?))
                .unwrap_or(UNKNOWN_TEAM)
                .to_string(),
            service_name: meta
                .and_then(|m| non_blank(m.service_name.as_deref()?))
                .unwrap_or(UNKNOWN_SERVICE)
                .to_string(),
        }
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

struct ServiceNode {
    id: String,
    key: String,
    procedure_ids: Vec<String>,
}

/// Folds a merged `procedure_graph` document into a `service_graph` document.
///
/// Service membership comes from each procedure's `services` annotation, falling back to its
/// owning team and service. Nodes are ordered by service (first appearance) and then by
/// their earliest procedure.
pub fn service_graph(document: &Markup) -> Markup {
    let order: IndexSet<&str> = document.procedures.iter().map(|p| p.id.as_str()).collect();

    let mut infos: BTreeMap<String, ServiceInfo> = BTreeMap::new();
    for procedure in &document.procedures {
        let meta = document.procedure_meta.get(&procedure.id);
        if meta.is_some_and(|m| m.team_name.is_some() || m.service_name.is_some()) {
            let info = ServiceInfo::from_meta(meta);
            infos.entry(info.key()).or_insert(info);
        }
    }

    let mut members: IndexMap<String, Vec<&str>> = IndexMap::new();
    for procedure in &document.procedures {
        let meta = document.procedure_meta.get(&procedure.id);
        let keys: Vec<String> = match meta.map(|m| m.services.as_slice()) {
            Some(keys) if !keys.is_empty() => keys.to_vec(),
            _ => {
                let info = ServiceInfo::from_meta(meta);
                let key = info.key();
                infos.entry(key.clone()).or_insert(info);
                vec![key]
            }
        };
        for key in keys {
            let list = members.entry(key).or_default();
            if !list.contains(&procedure.id.as_str()) {
                list.push(procedure.id.as_str());
            }
        }
    }
    for key in members.keys() {
        if !infos.contains_key(key) {
            infos.insert(key.clone(), ServiceInfo::from_key(key));
        }
    }

    let mut nodes: Vec<ServiceNode> = Vec::new();
    for (key, procedure_ids) in &members {
        let mut graph: Graph = Graph::new();
        for id in procedure_ids {
            graph.ensure_node(*id);
        }
        for (source, targets) in document.procedure_graph.iter().flatten() {
            for target in targets {
                if source != target
                    && graph.has_node(source.as_str())
                    && graph.has_node(target.as_str())
                {
                    graph.set_edge(source.as_str(), target.as_str());
                }
            }
        }
        let info = &infos[key];
        for mut component in alg::components(&graph) {
            component.sort_by_key(|id| order.get_index_of(id.as_str()).unwrap_or(usize::MAX));
            nodes.push(ServiceNode {
                id: node_id(info, &component),
                key: key.clone(),
                procedure_ids: component,
            });
        }
    }

    let mut nodes_of: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for id in &node.procedure_ids {
            nodes_of.entry(id.as_str()).or_default().push(i);
        }
    }
    let mut links: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
    for (source, targets) in document.procedure_graph.iter().flatten() {
        for target in targets {
            for &from in nodes_of.get(source.as_str()).into_iter().flatten() {
                for &to in nodes_of.get(target.as_str()).into_iter().flatten() {
                    if from != to {
                        links[from].insert(to);
                    }
                }
            }
        }
    }
    for sharing in nodes_of.values() {
        for &left in sharing {
            for &right in sharing {
                if left != right {
                    links[left].insert(right);
                }
            }
        }
    }

    let colors: BTreeMap<String, &str> = {
        let mut keys: Vec<&String> = members.keys().collect();
        keys.sort_by_key(|k| k.to_lowercase());
        keys.into_iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), SERVICE_COLORS[i % SERVICE_COLORS.len()]))
            .collect()
    };
    let totals: BTreeMap<&str, usize> = nodes.iter().fold(BTreeMap::new(), |mut acc, n| {
        *acc.entry(n.key.as_str()).or_default() += 1;
        acc
    });

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut procedures: Vec<Procedure> = Vec::with_capacity(nodes.len());
    let mut procedure_meta: IndexMap<String, ProcedureMeta> = IndexMap::new();
    let mut procedure_graph: Adjacency = Adjacency::new();
    for (i, node) in nodes.iter().enumerate() {
        let info = &infos[&node.key];
        let index = seen.entry(node.key.as_str()).or_default();
        *index += 1;
        let mut label = format!("[{}] {}", info.team_name, info.service_name);
        if totals.get(node.key.as_str()).copied().unwrap_or(1) > 1 {
            label.push_str(&format!(" (Graph #{index})"));
        }

        procedures.push(Procedure {
            name: Some(label),
            ..Procedure::new(node.id.clone())
        });
        procedure_meta.insert(
            node.id.clone(),
            ProcedureMeta {
                team_name: Some(info.team_name.clone()),
                service_name: Some(info.service_name.clone()),
                color: colors.get(&node.key).map(|c| c.to_string()),
                services: vec![node.key.clone()],
                procedure_count: Some(node.procedure_ids.len()),
                graph_stats: Some(stats(document, &node.procedure_ids)),
                ..ProcedureMeta::default()
            },
        );
        let mut targets: Vec<String> = links[i].iter().map(|&t| nodes[t].id.clone()).collect();
        targets.sort();
        procedure_graph.insert(node.id.clone(), targets);
    }

    let title = document
        .service_name
        .as_deref()
        .and_then(non_blank)
        .map_or_else(|| "Services".to_string(), |t| format!("Services · {t}"));
    tracing::debug!(
        services = members.len(),
        nodes = procedures.len(),
        "folded merged document into services"
    );
    Markup {
        markup_type: SERVICE_GRAPH_MARKUP_TYPE.to_string(),
        service_name: Some(title),
        team_id: document.team_id.clone(),
        team_name: document.team_name.clone(),
        procedure_graph: Some(procedure_graph),
        procedure_meta,
        procedures,
        ..Markup::default()
    }
}

/// `service::{team}::{service}::graph::{procedures}`, every part slugged.
fn node_id(info: &ServiceInfo, procedure_ids: &[String]) -> String {
    format!(
        "service::{}::{}::graph::{}",
        slug(&info.team_name),
        slug(&info.service_name),
        slug(&procedure_ids.join("-"))
    )
}

/// Lowercase alphanumerics with every other run collapsed into one `_`.
fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn stats(document: &Markup, procedure_ids: &[String]) -> GraphStats {
    let mut stats = GraphStats::default();
    for procedure in procedure_ids.iter().filter_map(|id| document.procedure(id)) {
        stats.start += procedure.start_block_ids.len();
        stats.branch += procedure.branches.values().map(Vec::len).sum::<usize>();
        for raw in &procedure.end_block_ids {
            match EndSpec::parse(&procedure.id, raw).map(|s| s.end_type) {
                Ok(EndType::Postpone) => stats.postpone += 1,
                Ok(_) => stats.end += 1,
                Err(_) => {}
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_separators() {
        assert_eq!(slug("Team A"), "team_a");
        assert_eq!(slug("  --Loans & Cards!! "), "loans_cards");
        assert_eq!(slug("***"), "unknown");
        assert_eq!(slug("Кредиты 2"), "кредиты_2");
    }

    #[test]
    fn unknown_keys_are_split_at_the_first_separator() {
        assert_eq!(
            ServiceInfo::from_key("Team A::svc::v2"),
            ServiceInfo {
                team_name: "Team A".to_string(),
                service_name: "svc::v2".to_string(),
            }
        );
        assert_eq!(ServiceInfo::from_key("solo").team_name, UNKNOWN_TEAM);
    }
}
