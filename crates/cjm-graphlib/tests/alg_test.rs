use cjm_graphlib::alg;
use cjm_graphlib::{EdgeKey, Graph};
use std::collections::BTreeSet;

fn graph(edges: &[(&str, &str)]) -> Graph {
    let mut g: Graph = Graph::new();
    for (v, w) in edges {
        g.set_edge(*v, *w);
    }
    g
}

fn levels_of(g: &Graph) -> Vec<(String, usize)> {
    let back = alg::back_edges(g, &[]);
    alg::longest_path_levels(g, &back)
}

#[test]
fn successors_and_predecessors_follow_insertion_order() {
    let g = graph(&[("a", "c"), ("a", "b"), ("d", "b")]);
    assert_eq!(g.successors("a"), vec!["c", "b"]);
    assert_eq!(g.predecessors("b"), vec!["a", "d"]);
    assert_eq!(g.sources(), vec!["a", "d"]);
    assert_eq!(g.sinks(), vec!["c", "b"]);
}

#[test]
fn duplicate_edges_collapse() {
    let mut g = graph(&[("a", "b")]);
    g.set_edge("a", "b");
    assert_eq!(g.edge_count(), 1);
    assert!(g.remove_edge("a", "b"));
    assert!(!g.has_edge("a", "b"));
    assert!(g.successors("a").is_empty());
}

#[test]
fn find_cycles_reports_sccs_and_self_loops() {
    let g = graph(&[("a", "b"), ("b", "a"), ("b", "c"), ("d", "d")]);
    assert_eq!(
        alg::find_cycles(&g),
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["d".to_string()]
        ]
    );
    assert_eq!(alg::cycle_count(&g), 2);

    let in_cycles = alg::edges_in_cycles(&g);
    assert!(in_cycles.contains(&EdgeKey::new("a", "b")));
    assert!(in_cycles.contains(&EdgeKey::new("b", "a")));
    assert!(in_cycles.contains(&EdgeKey::new("d", "d")));
    assert!(!in_cycles.contains(&EdgeKey::new("b", "c")));
}

#[test]
fn back_edges_break_every_cycle() {
    let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("c", "d")]);
    let back = alg::back_edges(&g, &["a"]);
    assert_eq!(back, BTreeSet::from([EdgeKey::new("c", "a")]));
}

#[test]
fn longest_path_levels_use_the_longest_route() {
    let g = graph(&[("a", "b"), ("b", "c"), ("a", "c"), ("c", "d")]);
    assert_eq!(
        levels_of(&g),
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 1),
            ("c".to_string(), 2),
            ("d".to_string(), 3),
        ]
    );
}

#[test]
fn longest_path_levels_survive_cycles() {
    let g = graph(&[("a", "b"), ("b", "a"), ("b", "c")]);
    let levels = levels_of(&g);
    assert_eq!(levels.len(), 3);
    assert_eq!(
        levels,
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 1),
            ("c".to_string(), 2),
        ]
    );
}

#[test]
fn components_keep_input_order() {
    let mut g = graph(&[("x", "y"), ("a", "b")]);
    g.ensure_node("lonely");
    g.set_edge("b", "y");
    g.ensure_node("z");
    assert_eq!(
        alg::components(&g),
        vec![
            vec![
                "x".to_string(),
                "y".to_string(),
                "a".to_string(),
                "b".to_string()
            ],
            vec!["lonely".to_string()],
            vec!["z".to_string()],
        ]
    );
    assert!(!alg::is_weakly_connected(&g));
}

#[test]
fn preorder_visits_each_node_once() {
    let g = graph(&[("a", "b"), ("a", "c"), ("b", "c"), ("c", "a")]);
    assert_eq!(
        alg::preorder(&g, &["a"]),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
}

#[test]
fn from_adjacency_preserves_first_mention_order() {
    let g: Graph = Graph::from_adjacency([("p2", vec!["p3"]), ("p1", vec!["p2"])]);
    assert_eq!(g.node_ids(), vec!["p2", "p3", "p1"]);
    assert_eq!(g.edge_count(), 2);
}

#[test]
fn acyclic_levels_root_at_sources() {
    let g = graph(&[("b", "c"), ("c", "b"), ("a", "b")]);
    assert_eq!(
        alg::acyclic_levels(&g),
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 1),
            ("c".to_string(), 2),
        ]
    );
}

#[test]
fn count_paths_counts_walks_to_sinks() {
    // a -> b -> d, a -> c -> d, c -> e
    let g = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("c", "e")]);
    assert_eq!(alg::count_paths(&g, &[]), 3);
    assert_eq!(alg::count_paths(&g, &["c"]), 2);
    assert_eq!(alg::count_paths(&g, &["missing"]), 3);

    // The loop back to `a` adds no walk of its own.
    let cyclic = graph(&[("a", "b"), ("b", "a"), ("b", "c")]);
    assert_eq!(alg::count_paths(&cyclic, &["a"]), 1);

    let ring = graph(&[("a", "b"), ("b", "a")]);
    assert_eq!(alg::count_paths(&ring, &[]), 0);
    assert_eq!(alg::count_paths(&Graph::<(), ()>::new(), &[]), 0);
}
