//! Traversal helpers: preorder, weak components, strongly connected components, DFS back
//! edges, and longest-path leveling.
//!
//! All functions visit nodes in insertion order and successors in edge insertion order.

use super::{EdgeKey, Graph};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub fn preorder<N, E>(g: &Graph<N, E>, roots: &[&str]) -> Vec<String> {
    fn dfs<N, E>(g: &Graph<N, E>, v: &str, visited: &mut BTreeSet<String>, out: &mut Vec<String>) {
        if !visited.insert(v.to_string()) {
            return;
        }
        out.push(v.to_string());
        for w in g.successors(v) {
            dfs(g, w, visited, out);
        }
    }

    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut out: Vec<String> = Vec::new();
    for r in roots {
        if g.has_node(r) {
            dfs(g, r, &mut visited, &mut out);
        }
    }
    out
}

/// Weakly connected components. Components are ordered by their earliest node and the
/// nodes inside a component keep insertion order.
pub fn components<N, E>(g: &Graph<N, E>) -> Vec<Vec<String>> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out: Vec<Vec<String>> = Vec::new();

    for start in g.nodes() {
        if !seen.insert(start.to_string()) {
            continue;
        }
        let mut comp: Vec<String> = Vec::new();
        let mut q: VecDeque<String> = VecDeque::new();
        q.push_back(start.to_string());
        while let Some(v) = q.pop_front() {
            for n in g.successors(&v).into_iter().chain(g.predecessors(&v)) {
                if seen.insert(n.to_string()) {
                    q.push_back(n.to_string());
                }
            }
            comp.push(v);
        }
        comp.sort_by_key(|v| g.node_order(v).unwrap_or(usize::MAX));
        out.push(comp);
    }

    out
}

pub fn is_weakly_connected<N, E>(g: &Graph<N, E>) -> bool {
    components(g).len() <= 1
}

/// Strongly connected components (Tarjan), in completion order.
pub fn tarjan<N, E>(g: &Graph<N, E>) -> Vec<Vec<String>> {
    struct Tarjan<'a, N, E> {
        g: &'a Graph<N, E>,
        index: usize,
        stack: Vec<String>,
        on_stack: BTreeSet<String>,
        indices: BTreeMap<String, usize>,
        lowlink: BTreeMap<String, usize>,
        sccs: Vec<Vec<String>>,
    }

    impl<N, E> Tarjan<'_, N, E> {
        fn strongconnect(&mut self, v: &str) {
            self.indices.insert(v.to_string(), self.index);
            self.lowlink.insert(v.to_string(), self.index);
            self.index += 1;
            self.stack.push(v.to_string());
            self.on_stack.insert(v.to_string());

            for w in self.g.successors(v) {
                if !self.indices.contains_key(w) {
                    self.strongconnect(w);
                    let (Some(v_low), Some(w_low)) =
                        (self.lowlink.get(v).copied(), self.lowlink.get(w).copied())
                    else {
                        debug_assert!(false, "tarjan lowlink missing");
                        continue;
                    };
                    self.lowlink.insert(v.to_string(), v_low.min(w_low));
                } else if self.on_stack.contains(w) {
                    let (Some(v_low), Some(w_idx)) =
                        (self.lowlink.get(v).copied(), self.indices.get(w).copied())
                    else {
                        debug_assert!(false, "tarjan index missing");
                        continue;
                    };
                    self.lowlink.insert(v.to_string(), v_low.min(w_idx));
                }
            }

            let (Some(v_low), Some(v_idx)) =
                (self.lowlink.get(v).copied(), self.indices.get(v).copied())
            else {
                debug_assert!(false, "tarjan bookkeeping missing for v");
                return;
            };
            if v_low == v_idx {
                let mut scc: Vec<String> = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(&w);
                    let done = w == v;
                    scc.push(w);
                    if done {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
        }
    }

    let mut t = Tarjan {
        g,
        index: 0,
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        indices: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        sccs: Vec::new(),
    };
    for v in g.nodes() {
        if !t.indices.contains_key(v) {
            t.strongconnect(v);
        }
    }
    t.sccs
}

/// SCCs that form a cycle: size > 1, or a single node with a self-loop. Each cycle lists its
/// nodes in insertion order; cycles are ordered by their first node's position.
pub fn find_cycles<N, E>(g: &Graph<N, E>) -> Vec<Vec<String>> {
    let order = |v: &String| g.node_order(v).unwrap_or(usize::MAX);
    let mut cycles: Vec<Vec<String>> = Vec::new();
    for mut scc in tarjan(g) {
        let is_cycle = scc.len() > 1 || scc.first().is_some_and(|v| g.has_edge(v, v));
        if is_cycle {
            scc.sort_by_key(order);
            cycles.push(scc);
        }
    }
    cycles.sort_by_key(|c| c.first().map(order).unwrap_or(usize::MAX));
    cycles
}

pub fn cycle_count<N, E>(g: &Graph<N, E>) -> usize {
    find_cycles(g).len()
}

/// Edges whose endpoints share a cyclic SCC (including self-loops).
pub fn edges_in_cycles<N, E>(g: &Graph<N, E>) -> BTreeSet<EdgeKey> {
    let mut scc_of: BTreeMap<&str, usize> = BTreeMap::new();
    let cycles = find_cycles(g);
    for (idx, cycle) in cycles.iter().enumerate() {
        for v in cycle {
            scc_of.insert(v.as_str(), idx);
        }
    }
    g.edges()
        .filter(|e| {
            matches!(
                (scc_of.get(e.v.as_str()), scc_of.get(e.w.as_str())),
                (Some(a), Some(b)) if a == b
            )
        })
        .cloned()
        .collect()
}

/// Number of distinct walks from `starts` to a sink.
///
/// Starts missing from the graph are ignored; with none left, the sources are used, and a
/// graph without sources starts from every node. A walk that comes back to a node still on
/// the stack contributes nothing, so cycles never make the count diverge. Saturates at
/// `usize::MAX`.
pub fn count_paths<N, E>(g: &Graph<N, E>, starts: &[&str]) -> usize {
    fn dfs<'g, N, E>(
        g: &'g Graph<N, E>,
        v: &'g str,
        memo: &mut BTreeMap<&'g str, usize>,
        active: &mut BTreeSet<&'g str>,
    ) -> usize {
        if let Some(&n) = memo.get(v) {
            return n;
        }
        if active.contains(v) {
            return 0;
        }
        let successors = g.successors(v);
        if successors.is_empty() {
            memo.insert(v, 1);
            return 1;
        }
        active.insert(v);
        let total = successors
            .into_iter()
            .fold(0usize, |acc, w| acc.saturating_add(dfs(g, w, memo, active)));
        active.remove(v);
        memo.insert(v, total);
        total
    }

    // Re-borrow the starts from the graph so the memo can key on them.
    let mut roots: Vec<&str> = starts
        .iter()
        .filter_map(|s| g.nodes().find(|v| v == s))
        .collect();
    if roots.is_empty() {
        roots = g.sources();
    }
    if roots.is_empty() {
        roots = g.nodes().collect();
    }
    let mut memo: BTreeMap<&str, usize> = BTreeMap::new();
    let mut active: BTreeSet<&str> = BTreeSet::new();
    roots.into_iter().fold(0usize, |acc, v| {
        acc.saturating_add(dfs(g, v, &mut memo, &mut active))
    })
}

/// DFS back edges (a feedback arc set). Removing them leaves the graph acyclic.
///
/// Roots are visited in `roots` order first, then any unvisited node in insertion order.
pub fn back_edges<N, E>(g: &Graph<N, E>, roots: &[&str]) -> BTreeSet<EdgeKey> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }

    fn dfs<N, E>(
        g: &Graph<N, E>,
        v: &str,
        marks: &mut BTreeMap<String, Mark>,
        out: &mut BTreeSet<EdgeKey>,
    ) {
        marks.insert(v.to_string(), Mark::Active);
        for w in g.successors(v) {
            match marks.get(w).copied() {
                None => dfs(g, w, marks, out),
                Some(Mark::Active) => {
                    out.insert(EdgeKey::new(v, w));
                }
                Some(Mark::Done) => {}
            }
        }
        marks.insert(v.to_string(), Mark::Done);
    }

    let mut marks: BTreeMap<String, Mark> = BTreeMap::new();
    let mut out: BTreeSet<EdgeKey> = BTreeSet::new();
    let ordered = roots
        .iter()
        .copied()
        .filter(|r| g.has_node(r))
        .chain(g.nodes());
    for v in ordered {
        if !marks.contains_key(v) {
            dfs(g, v, &mut marks, &mut out);
        }
    }
    out
}

/// Longest-path levels over the graph minus `ignored` edges (normally [`back_edges`]).
///
/// Nodes without remaining inbound edges sit at level 0 and every remaining edge `v -> w`
/// satisfies `level(w) >= level(v) + 1`. The returned vector follows Kahn's order with ties
/// broken by insertion order.
pub fn longest_path_levels<N, E>(
    g: &Graph<N, E>,
    ignored: &BTreeSet<EdgeKey>,
) -> Vec<(String, usize)> {
    let keep = |v: &str, w: &str| !ignored.contains(&EdgeKey::new(v, w));

    let mut indegree: BTreeMap<&str, usize> = g.nodes().map(|v| (v, 0)).collect();
    for e in g.edges() {
        if keep(&e.v, &e.w) {
            *indegree.entry(e.w.as_str()).or_insert(0) += 1;
        }
    }

    // Ready queue ordered by insertion position.
    let mut ready: BTreeSet<(usize, &str)> = g
        .nodes()
        .filter(|v| indegree.get(v).copied().unwrap_or(0) == 0)
        .map(|v| (g.node_order(v).unwrap_or(usize::MAX), v))
        .collect();
    let mut levels: BTreeMap<&str, usize> = BTreeMap::new();
    let mut out: Vec<(String, usize)> = Vec::with_capacity(g.node_count());

    while let Some(first) = ready.iter().next().copied() {
        ready.remove(&first);
        let (_, v) = first;
        let level = levels.get(v).copied().unwrap_or(0);
        out.push((v.to_string(), level));
        for w in g.successors(v) {
            if !keep(v, w) {
                continue;
            }
            let slot = levels.entry(w).or_insert(0);
            *slot = (*slot).max(level + 1);
            if let Some(deg) = indegree.get_mut(w) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    ready.insert((g.node_order(w).unwrap_or(usize::MAX), w));
                }
            }
        }
    }

    // Nodes left over only when `ignored` does not break every cycle; keep them visible.
    if out.len() < g.node_count() {
        let placed: BTreeSet<String> = out.iter().map(|(v, _)| v.clone()).collect();
        for v in g.nodes() {
            if !placed.contains(v) {
                out.push((v.to_string(), levels.get(v).copied().unwrap_or(0)));
            }
        }
    }
    out
}

/// [`longest_path_levels`] after breaking cycles with [`back_edges`] rooted at the sources.
///
/// Procedure arrangement on the canvas and the merge drilldown ordering both use this, so
/// the two views assign the same level to every procedure.
pub fn acyclic_levels<N, E>(g: &Graph<N, E>) -> Vec<(String, usize)> {
    let roots = g.sources();
    let back = back_edges(g, &roots);
    longest_path_levels(g, &back)
}
