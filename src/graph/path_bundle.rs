//! Compact predecessor-DAG representation of one or more s→t paths at a
//! single cost (C4).

use super::edge_select::EdgeKeys;
use super::{EdgeKey, NodeId};
use crate::types::Cost;
use indexmap::{IndexMap, IndexSet};

/// An immutable s→t predecessor DAG plus its derived node/edge sets.
#[derive(Debug, Clone)]
pub struct PathBundle {
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// `pred[node][prev] = edge_keys`, as produced by [`super::spf::shortest_paths`].
    pub pred: IndexMap<NodeId, IndexMap<NodeId, EdgeKeys>>,
    /// Total cost from `src` to `dst` along this DAG.
    pub cost: Cost,
    edges: IndexSet<EdgeKey>,
    nodes: IndexSet<NodeId>,
}

impl PathBundle {
    /// Build a bundle from a source, destination, predecessor map, and
    /// cost, caching the derived edge/node sets.
    pub fn new(src: NodeId, dst: NodeId, pred: IndexMap<NodeId, IndexMap<NodeId, EdgeKeys>>, cost: Cost) -> Self {
        let mut edges = IndexSet::new();
        let mut nodes: IndexSet<NodeId> = IndexSet::new();
        nodes.insert(src.clone());
        for (node, preds) in &pred {
            nodes.insert(node.clone());
            for (prev, keys) in preds {
                nodes.insert(prev.clone());
                edges.extend(keys.iter().copied());
            }
        }
        Self { src, dst, pred, cost, edges, nodes }
    }

    /// Build an empty bundle representing "destination unreachable".
    pub fn empty(src: NodeId, dst: NodeId) -> Self {
        Self::new(src, dst, IndexMap::new(), 0)
    }

    /// Whether this bundle actually reaches `dst` (or `src == dst`).
    pub fn is_empty(&self) -> bool {
        self.src != self.dst && !self.pred.contains_key(&self.dst)
    }

    /// Every edge key appearing anywhere in the DAG.
    pub fn edges(&self) -> &IndexSet<EdgeKey> {
        &self.edges
    }

    /// Every node appearing anywhere in the DAG.
    pub fn nodes(&self) -> &IndexSet<NodeId> {
        &self.nodes
    }

    /// Enumerate concrete `src -> dst` paths represented by this DAG, in
    /// depth-first, insertion order of `pred`.
    ///
    /// Each path is a sequence of `(node, edge_keys)`, the final node
    /// carrying an empty key list. When `keep_parallel_edges` is true, a
    /// predecessor step realized by several parallel edges fans out into
    /// one path per edge; otherwise all parallel edges are kept together
    /// as one step.
    pub fn resolve_to_paths(&self, keep_parallel_edges: bool) -> Vec<Vec<(NodeId, Vec<EdgeKey>)>> {
        if self.src == self.dst {
            return vec![vec![(self.dst.clone(), Vec::new())]];
        }
        if !self.pred.contains_key(&self.dst) {
            return Vec::new();
        }

        // Invert pred (keyed by successor) into a forward adjacency map
        // keyed by predecessor, preserving pred's insertion order.
        let mut succ: IndexMap<NodeId, Vec<(NodeId, EdgeKeys)>> = IndexMap::new();
        for (node, preds) in &self.pred {
            for (prev, keys) in preds {
                succ.entry(prev.clone()).or_default().push((node.clone(), keys.clone()));
            }
        }

        let mut paths = Vec::new();
        self.dfs_collect(&succ, self.src.clone(), Vec::new(), keep_parallel_edges, &mut paths);
        paths
    }

    fn dfs_collect(
        &self,
        succ: &IndexMap<NodeId, Vec<(NodeId, EdgeKeys)>>,
        node: NodeId,
        mut acc: Vec<(NodeId, Vec<EdgeKey>)>,
        keep_parallel_edges: bool,
        out: &mut Vec<Vec<(NodeId, Vec<EdgeKey>)>>,
    ) {
        if node == self.dst {
            acc.push((node, Vec::new()));
            out.push(acc);
            return;
        }
        let Some(next_steps) = succ.get(&node) else { return };
        for (next, keys) in next_steps {
            if keep_parallel_edges && keys.len() > 1 {
                for &k in keys {
                    let mut branch = acc.clone();
                    branch.push((node.clone(), vec![k]));
                    self.dfs_collect(succ, next.clone(), branch, keep_parallel_edges, out);
                }
            } else {
                let mut branch = acc.clone();
                branch.push((node.clone(), keys.iter().copied().collect()));
                self.dfs_collect(succ, next.clone(), branch, keep_parallel_edges, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn bundle() -> PathBundle {
        // S -> A -> T and S -> B -> T, single cost-2 DAG.
        let mut pred: IndexMap<NodeId, IndexMap<NodeId, EdgeKeys>> = IndexMap::new();
        let mut a_pred = IndexMap::new();
        a_pred.insert("S".to_string(), smallvec![1u64]);
        pred.insert("A".to_string(), a_pred);
        let mut b_pred = IndexMap::new();
        b_pred.insert("S".to_string(), smallvec![2u64]);
        pred.insert("B".to_string(), b_pred);
        let mut t_pred = IndexMap::new();
        t_pred.insert("A".to_string(), smallvec![3u64]);
        t_pred.insert("B".to_string(), smallvec![4u64]);
        pred.insert("T".to_string(), t_pred);
        PathBundle::new("S".to_string(), "T".to_string(), pred, 2)
    }

    #[test]
    fn derives_edges_and_nodes() {
        let b = bundle();
        assert_eq!(b.edges().len(), 4);
        assert_eq!(b.nodes().len(), 4);
    }

    #[test]
    fn resolves_both_paths() {
        let b = bundle();
        let paths = b.resolve_to_paths(false);
        assert_eq!(paths.len(), 2);
        for p in &paths {
            assert_eq!(p.last().unwrap().0, "T");
            assert!(p.last().unwrap().1.is_empty());
        }
    }

    #[test]
    fn unreachable_destination_yields_no_paths() {
        let b = PathBundle::empty("S".to_string(), "Z".to_string());
        assert!(b.resolve_to_paths(false).is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn self_loop_bundle_is_single_trivial_path() {
        let b = PathBundle::empty("S".to_string(), "S".to_string());
        let paths = b.resolve_to_paths(false);
        assert_eq!(paths, vec![vec![("S".to_string(), Vec::new())]]);
    }
}
