//! Partitioning of a network into independently solvable clusters.
//!
//! Two nodes share a cluster iff a chain of primitives connects them.
//! Nodes flagged "ignore for clustering" (normally the reference node)
//! never merge clusters, so two subcircuits that only share ground are
//! solved as separate systems.

use std::collections::HashMap;

use crate::eqn::{ContributesEquations, IntegrationMethod, LinearSolver};
use crate::types::{ClusterId, NodeId, PrimitiveId};

/// Disjoint-set forest over node ids with path halving and union by size.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the sets of `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

/// One independent linear system.
pub struct Cluster {
    pub(crate) id: ClusterId,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) primitive_ids: Vec<PrimitiveId>,
    pub(crate) primitives: Vec<Box<dyn ContributesEquations>>,
    pub(crate) solver: LinearSolver,
}

impl Cluster {
    pub(crate) fn new(id: ClusterId, method: IntegrationMethod, tolerance: f64) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            primitive_ids: Vec::new(),
            primitives: Vec::new(),
            solver: LinearSolver::new(id, Vec::new(), method, tolerance),
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Non-reference nodes solved by this cluster, in registration order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn primitive_ids(&self) -> &[PrimitiveId] {
        &self.primitive_ids
    }

    pub fn solver(&self) -> &LinearSolver {
        &self.solver
    }

    /// Unknown index of every node of the cluster after its first build.
    pub fn node_indices(&self) -> &HashMap<NodeId, usize> {
        self.solver.node_index()
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .field("primitive_ids", &self.primitive_ids)
            .field("dimension", &self.solver.dimension())
            .finish()
    }
}

/// Result of partitioning: cluster membership of nodes and primitives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Partition {
    /// Cluster of each node, `None` for reference nodes outside any cluster.
    pub node_cluster: Vec<Option<ClusterId>>,
    /// Cluster of each primitive, by primitive id.
    pub primitive_cluster: Vec<ClusterId>,
    pub cluster_count: usize,
}

/// Groups nodes and primitives.
///
/// `clustered[n]` tells whether node `n` takes part in merging; `unknown[n]`
/// whether it is solved for. Cluster ids follow the lowest node id of each
/// cluster; clusters holding only primitives without clustered terminals
/// come last.
pub(crate) fn partition(
    clustered: &[bool],
    unknown: &[bool],
    terminals: &[Vec<NodeId>],
) -> Partition {
    let n = clustered.len();
    let mut sets = UnionFind::new(n);
    for nodes in terminals {
        let mut joined = nodes.iter().copied().filter(|&node| clustered[node]);
        if let Some(first) = joined.next() {
            for other in joined {
                sets.union(first, other);
            }
        }
    }

    let mut roots: HashMap<usize, ClusterId> = HashMap::new();
    let mut count = 0;
    let mut intern = |root: usize| {
        *roots.entry(root).or_insert_with(|| {
            count += 1;
            count - 1
        })
    };

    let mut node_cluster = vec![None; n];
    for node in 0..n {
        if unknown[node] {
            node_cluster[node] = Some(intern(sets.find(node)));
        }
    }

    let mut primitive_cluster = Vec::with_capacity(terminals.len());
    let mut standalone = 0;
    for nodes in terminals {
        let root = nodes
            .iter()
            .copied()
            .find(|&node| clustered[node])
            .map(|node| sets.find(node));
        let cluster = match root {
            Some(root) => intern(root),
            None => {
                // No clustered terminal: a cluster of its own, keyed past the node range.
                standalone += 1;
                intern(n + standalone)
            }
        };
        primitive_cluster.push(cluster);
    }

    Partition {
        node_cluster,
        primitive_cluster,
        cluster_count: roots.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(1), uf.find(3));
        assert!(uf.union(1, 4));
        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(2), uf.find(0));
    }

    #[test]
    fn test_ground_does_not_merge() {
        // node 0 is ground; 1-2 and 3-4 only share ground.
        let clustered = [false, true, true, true, true];
        let unknown = [false, true, true, true, true];
        let terminals = vec![vec![1, 0], vec![1, 2], vec![2, 0], vec![3, 0], vec![3, 4], vec![4, 0]];
        let p = partition(&clustered, &unknown, &terminals);

        assert_eq!(p.cluster_count, 2);
        assert_eq!(p.node_cluster, vec![None, Some(0), Some(0), Some(1), Some(1)]);
        assert_eq!(p.primitive_cluster, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_clustered_reference_merges() {
        let clustered = [true, true, true];
        let unknown = [false, true, true];
        let terminals = vec![vec![1, 0], vec![2, 0]];
        let p = partition(&clustered, &unknown, &terminals);
        assert_eq!(p.cluster_count, 1);
    }

    #[test]
    fn test_reference_only_primitive_gets_own_cluster() {
        let clustered = [false, true];
        let unknown = [false, true];
        let terminals = vec![vec![1, 0], vec![0, 0]];
        let p = partition(&clustered, &unknown, &terminals);
        assert_eq!(p.cluster_count, 2);
        assert_eq!(p.primitive_cluster, vec![0, 1]);
    }
}
