#![forbid(unsafe_code)]

//! Directed graph container used by `cjm-layout` and the merge builder in `cjm-core`.
//!
//! Nodes and edges keep their insertion order. Every algorithm in [`alg`] walks them in that
//! order, which is what makes layouts and merge metrics reproducible across runs.

pub mod alg;

use rustc_hash::FxBuildHasher;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

#[derive(Debug, Clone)]
struct AdjCache {
    generation: u64,
    out: Vec<Vec<usize>>,
    in_: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, Hash)]
struct EdgeKeyView<'a> {
    v: &'a str,
    w: &'a str,
}

impl<'a> hashbrown::Equivalent<EdgeKey> for EdgeKeyView<'a> {
    fn equivalent(&self, key: &EdgeKey) -> bool {
        key.v == self.v && key.w == self.w
    }
}

/// A directed edge `v -> w`.
#[derive(Debug, Clone)]
pub struct EdgeKey {
    pub v: String,
    pub w: String,
}

impl EdgeKey {
    pub fn new(v: impl Into<String>, w: impl Into<String>) -> Self {
        Self {
            v: v.into(),
            w: w.into(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.v == self.w
    }
}

impl PartialEq for EdgeKey {
    fn eq(&self, other: &Self) -> bool {
        self.v == other.v && self.w == other.w
    }
}

impl Eq for EdgeKey {}

// Must agree with `EdgeKeyView`'s derived hash so lookups by view hit the same bucket.
impl Hash for EdgeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.v.as_str().hash(state);
        self.w.as_str().hash(state);
    }
}

impl PartialOrd for EdgeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.v.as_str(), self.w.as_str()).cmp(&(other.v.as_str(), other.w.as_str()))
    }
}

#[derive(Debug, Clone)]
struct NodeEntry<N> {
    id: String,
    label: N,
}

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    key: EdgeKey,
    label: E,
}

/// Simple (non-multi, non-compound) directed graph keyed by string ids.
#[derive(Debug, Clone)]
pub struct Graph<N = (), E = ()> {
    nodes: Vec<NodeEntry<N>>,
    node_index: HashMap<String, usize>,

    edges: Vec<EdgeEntry<E>>,
    edge_index: HashMap<EdgeKey, usize>,

    // Traversals call `successors` / `predecessors` many times per node. The adjacency lists
    // are rebuilt lazily after any mutation so that query APIs stay on `&self`.
    adj_gen: u64,
    adj_cache: RefCell<Option<AdjCache>>,
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::default(),
            edges: Vec::new(),
            edge_index: HashMap::default(),
            adj_gen: 0,
            adj_cache: RefCell::new(None),
        }
    }
}

impl<N, E> Graph<N, E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate_adj(&mut self) {
        self.adj_gen = self.adj_gen.wrapping_add(1);
        *self.adj_cache.get_mut() = None;
    }

    fn with_adj<R>(&self, f: impl FnOnce(&AdjCache) -> R) -> R {
        let generation = self.adj_gen;
        let mut cache = self.adj_cache.borrow_mut();
        let stale = cache
            .as_ref()
            .map(|c| c.generation != generation)
            .unwrap_or(true);
        if stale {
            let mut out: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
            let mut in_: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
            for (edge_idx, e) in self.edges.iter().enumerate() {
                let Some(&v_idx) = self.node_index.get(&e.key.v) else {
                    continue;
                };
                let Some(&w_idx) = self.node_index.get(&e.key.w) else {
                    continue;
                };
                out[v_idx].push(edge_idx);
                in_[w_idx].push(edge_idx);
            }
            *cache = Some(AdjCache {
                generation,
                out,
                in_,
            });
        }
        match cache.as_ref() {
            Some(c) => f(c),
            None => f(&AdjCache {
                generation,
                out: Vec::new(),
                in_: Vec::new(),
            }),
        }
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn set_node(&mut self, id: impl Into<String>, label: N) -> &mut Self {
        let id = id.into();
        if let Some(&idx) = self.node_index.get(&id) {
            self.nodes[idx].label = label;
            return self;
        }
        self.invalidate_adj();
        let idx = self.nodes.len();
        self.nodes.push(NodeEntry {
            id: id.clone(),
            label,
        });
        self.node_index.insert(id, idx);
        self
    }

    pub fn node(&self, id: &str) -> Option<&N> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx].label)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut N> {
        self.node_index
            .get(id)
            .copied()
            .map(move |idx| &mut self.nodes[idx].label)
    }

    /// Insertion position of `id`, used as the deterministic tie-breaker by [`alg`].
    pub fn node_order(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeKey> {
        self.edges.iter().map(|e| &e.key)
    }

    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        self.edges.iter().map(|e| e.key.clone()).collect()
    }

    pub fn has_edge(&self, v: &str, w: &str) -> bool {
        self.edge_index.get(&EdgeKeyView { v, w }).is_some()
    }

    pub fn edge(&self, v: &str, w: &str) -> Option<&E> {
        let idx = *self.edge_index.get(&EdgeKeyView { v, w })?;
        Some(&self.edges[idx].label)
    }

    pub fn edge_mut(&mut self, v: &str, w: &str) -> Option<&mut E> {
        let idx = *self.edge_index.get(&EdgeKeyView { v, w })?;
        Some(&mut self.edges[idx].label)
    }

    pub fn remove_edge(&mut self, v: &str, w: &str) -> bool {
        let Some(idx) = self.edge_index.get(&EdgeKeyView { v, w }).copied() else {
            return false;
        };
        self.invalidate_adj();
        let removed = self.edges.remove(idx);
        self.edge_index.remove(&removed.key);
        for i in idx..self.edges.len() {
            if let Some(slot) = self.edge_index.get_mut(&self.edges[i].key) {
                *slot = i;
            }
        }
        true
    }

    pub fn successors(&self, v: &str) -> Vec<&str> {
        let Some(&v_idx) = self.node_index.get(v) else {
            return Vec::new();
        };
        self.with_adj(|cache| {
            let Some(out_edges) = cache.out.get(v_idx) else {
                return Vec::new();
            };
            out_edges
                .iter()
                .map(|&edge_idx| self.edges[edge_idx].key.w.as_str())
                .collect()
        })
    }

    pub fn predecessors(&self, v: &str) -> Vec<&str> {
        let Some(&v_idx) = self.node_index.get(v) else {
            return Vec::new();
        };
        self.with_adj(|cache| {
            let Some(in_edges) = cache.in_.get(v_idx) else {
                return Vec::new();
            };
            in_edges
                .iter()
                .map(|&edge_idx| self.edges[edge_idx].key.v.as_str())
                .collect()
        })
    }

    pub fn out_degree(&self, v: &str) -> usize {
        self.successors(v).len()
    }

    pub fn in_degree(&self, v: &str) -> usize {
        self.predecessors(v).len()
    }

    /// Nodes without inbound edges, in insertion order.
    pub fn sources(&self) -> Vec<&str> {
        self.nodes()
            .filter(|v| self.predecessors(v).is_empty())
            .collect()
    }

    /// Nodes without outbound edges, in insertion order.
    pub fn sinks(&self) -> Vec<&str> {
        self.nodes().filter(|v| self.successors(v).is_empty()).collect()
    }
}

impl<N: Default, E> Graph<N, E> {
    pub fn ensure_node(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if self.node_index.contains_key(&id) {
            return self;
        }
        self.set_node(id, N::default())
    }

    pub fn set_edge_with_label(
        &mut self,
        v: impl Into<String>,
        w: impl Into<String>,
        label: E,
    ) -> &mut Self {
        let v = v.into();
        let w = w.into();
        self.ensure_node(v.clone());
        self.ensure_node(w.clone());

        if let Some(&idx) = self.edge_index.get(&EdgeKeyView { v: &v, w: &w }) {
            self.edges[idx].label = label;
            return self;
        }

        self.invalidate_adj();
        let key = EdgeKey { v, w };
        let idx = self.edges.len();
        self.edges.push(EdgeEntry {
            key: key.clone(),
            label,
        });
        self.edge_index.insert(key, idx);
        self
    }
}

impl<N: Default, E: Default> Graph<N, E> {
    pub fn set_edge(&mut self, v: impl Into<String>, w: impl Into<String>) -> &mut Self {
        self.set_edge_with_label(v, w, E::default())
    }

    pub fn set_path(&mut self, nodes: &[&str]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.set_edge(pair[0], pair[1]);
        }
        self
    }

    /// Builds a graph from `(source, targets)` pairs. Sources are inserted before their
    /// targets, so node order follows the first mention in `adjacency`. Duplicate edges
    /// collapse into one.
    pub fn from_adjacency<'a, I, T>(adjacency: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, T)>,
        T: IntoIterator<Item = &'a str>,
    {
        let mut g = Self::new();
        for (source, targets) in adjacency {
            g.ensure_node(source);
            for target in targets {
                g.set_edge(source, target);
            }
        }
        g
    }
}
