use crate::*;
use serde_json::json;

fn model(value: serde_json::Value) -> GraphModel {
    let markup = markup::markup_from_value(value).unwrap();
    GraphModel::build(&markup, &ModelOptions::default()).unwrap()
}

fn group_blocks(p: &ProcedureModel, end_type: EndType) -> Vec<(String, bool)> {
    p.end_groups
        .iter()
        .find(|g| g.end_type == end_type)
        .map(|g| {
            g.members
                .iter()
                .map(|m| (m.block_id.clone(), m.implicit))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn intake_has_one_exit_group_and_one_forward_edge() {
    let m = model(json!({
        "markup_type": "service",
        "procedures": [{
            "proc_id": "intake",
            "start_block_ids": ["a"],
            "end_block_ids": ["b::exit"],
            "branches": {"a": ["b"]}
        }]
    }));
    let p = &m.procedures[0];
    assert_eq!(
        p.blocks.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );
    assert_eq!(p.edges.len(), 1);
    assert_eq!((p.edges[0].source.as_str(), p.edges[0].target.as_str()), ("a", "b"));
    assert_eq!(p.edges[0].kind, EdgeKind::Branch);
    assert_eq!(group_blocks(p, EndType::Exit), vec![("b".to_string(), false)]);
    assert!(group_blocks(p, EndType::End).is_empty());
    assert_eq!(m.start_block_count(), 1);
}

#[test]
fn blocks_without_end_or_outgoing_edges_end_implicitly() {
    let m = model(json!({
        "markup_type": "service",
        "procedures": [{
            "proc_id": "p1",
            "start_block_ids": ["a"],
            "branches": {"a": ["b"], "b": ["c"]}
        }]
    }));
    let p = &m.procedures[0];
    assert_eq!(group_blocks(p, EndType::End), vec![("c".to_string(), true)]);
    assert_eq!(
        group_blocks(p, EndType::TurnOut),
        vec![("a".to_string(), true), ("b".to_string(), true)]
    );
}

#[test]
fn turn_out_markers_skip_terminal_blocks_but_not_intermediate_ones() {
    let value = |end: &str| {
        json!({
            "markup_type": "service",
            "procedures": [{
                "proc_id": "p1",
                "start_block_ids": ["a"],
                "end_block_ids": [end],
                "branches": {"a": ["b"], "b": ["c"]}
            }]
        })
    };
    let terminal = model(value("b::end"));
    assert_eq!(
        group_blocks(&terminal.procedures[0], EndType::TurnOut),
        vec![("a".to_string(), true)]
    );

    let intermediate = model(value("b::intermediate"));
    let p = &intermediate.procedures[0];
    assert_eq!(
        group_blocks(p, EndType::TurnOut),
        vec![("a".to_string(), true), ("b".to_string(), true)]
    );
    // The intermediate end keeps its outgoing edge as well as its marker.
    assert_eq!(group_blocks(p, EndType::Intermediate), vec![("b".to_string(), false)]);
    assert!(p.edges.iter().any(|e| e.source == "b" && e.target == "c"));
}

#[test]
fn turn_out_synthesis_can_be_disabled() {
    let markup = markup::markup_from_value(json!({
        "markup_type": "service",
        "procedures": [{"proc_id": "p1", "start_block_ids": ["a"], "branches": {"a": ["b"]}}]
    }))
    .unwrap();
    let mut config = CjmConfig::default();
    config.set_value("model.implicit_turn_out", json!(false));
    let m = GraphModel::build(&markup, &ModelOptions::from_config(&config)).unwrap();
    assert!(group_blocks(&m.procedures[0], EndType::TurnOut).is_empty());
}

#[test]
fn block_graph_supersedes_branches_and_links_across_procedures() {
    let m = model(json!({
        "markup_type": "service",
        "procedures": [{
            "proc_id": "p1",
            "start_block_ids": ["a"],
            "branches": {"a": ["b"]},
            "block_graph": {"a": ["b"], "b": ["x"]}
        }, {
            "proc_id": "p2",
            "start_block_ids": ["x"],
            "end_block_ids": ["y"],
            "branches": {"x": ["y"]}
        }]
    }));
    let p1 = &m.procedures[0];
    assert!(p1.has_block_graph());
    assert!(p1.edges.iter().all(|e| e.kind == EdgeKind::BlockGraph));
    assert!(!p1.has_block("x"));
    let cross: Vec<_> = p1.cross_edges().collect();
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].target_procedure, "p2");

    assert_eq!(
        m.procedure_edges,
        vec![ProcedureEdge {
            source: "p1".into(),
            target: "p2".into(),
            origin: ProcedureEdgeOrigin::Derived
        }]
    );
}

#[test]
fn ambiguous_block_graph_targets_prefer_procedure_graph_links() {
    let m = model(json!({
        "markup_type": "service",
        "procedure_graph": {"p1": ["p3"]},
        "procedures": [
            {"proc_id": "p1", "start_block_ids": ["a"], "block_graph": {"a": ["shared"]}},
            {"proc_id": "p2", "start_block_ids": ["shared"]},
            {"proc_id": "p3", "start_block_ids": ["shared"]}
        ]
    }));
    assert_eq!(m.procedures[0].edges[0].target_procedure, "p3");
    assert!(m.procedure_edges.iter().all(|e| e.origin == ProcedureEdgeOrigin::Explicit));
}

#[test]
fn unrelated_procedures_fall_back_to_document_order() {
    let m = model(json!({
        "markup_type": "service",
        "procedures": [{"proc_id": "p1"}, {"proc_id": "p2"}, {"proc_id": "p3"}]
    }));
    let pairs: Vec<(&str, &str)> = m
        .procedure_edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(pairs, vec![("p1", "p2"), ("p2", "p3")]);
    assert!(m.procedures.iter().all(|p| p.blocks.is_empty()));
}

#[test]
fn edge_kind_accepts_legacy_names() {
    assert_eq!(EdgeKind::parse("procedure_flow"), Some(EdgeKind::ProcedureGraph));
    assert_eq!(
        serde_json::from_value::<EdgeKind>(json!("procedure_cycle")).unwrap(),
        EdgeKind::ProcedureGraphCycle
    );
    assert_eq!(EdgeKind::Branch.as_cycle(), EdgeKind::BranchCycle);
    assert_eq!(EdgeKind::BlockGraphCycle.base(), EdgeKind::BlockGraph);
}
