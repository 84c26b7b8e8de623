//! Proximity graph over oscillator positions.
//!
//! Two agents are neighbors when the Euclidean distance between their
//! cells is strictly less than the configured threshold. The graph is
//! rebuilt from scratch (O(n²) over unordered pairs) at configuration time
//! and after every mobility pass; it is never updated incrementally and is
//! read-only while coupling runs.
//!
//! Internally an adjacency map indexes each agent's neighbor set:
//! `BTreeMap<AgentId, BTreeSet<AgentId>>`. Both levels are ordered, so
//! neighbor iteration is reproducible.

use std::collections::{BTreeMap, BTreeSet};

use fireflies_types::{AgentId, Position};

/// Symmetric neighbor relation, excluding self-loops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborGraph {
    /// Agent -> agents within range.
    adjacency: BTreeMap<AgentId, BTreeSet<AgentId>>,
}

impl NeighborGraph {
    /// Build the graph for agents at `positions` (index = agent id).
    ///
    /// Every unordered pair closer than `threshold` gets a mutual edge, so
    /// membership is symmetric regardless of iteration order.
    pub fn build(positions: &[Position], threshold: f64) -> Self {
        let mut adjacency: BTreeMap<AgentId, BTreeSet<AgentId>> = BTreeMap::new();
        let ids: Vec<(AgentId, Position)> = (0_u32..)
            .zip(positions.iter().copied())
            .map(|(index, position)| (AgentId(index), position))
            .collect();

        for &(id, _) in &ids {
            adjacency.entry(id).or_default();
        }

        for (offset, &(a, pos_a)) in ids.iter().enumerate() {
            for &(b, pos_b) in ids.iter().skip(offset.saturating_add(1)) {
                if pos_a.distance_to(pos_b) < threshold {
                    adjacency.entry(a).or_default().insert(b);
                    adjacency.entry(b).or_default().insert(a);
                }
            }
        }

        Self { adjacency }
    }

    /// Neighbors of `id` in id order. Empty for an unknown id.
    pub fn neighbors(&self, id: AgentId) -> impl Iterator<Item = AgentId> + '_ {
        self.adjacency
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Whether `a` and `b` are neighbors.
    pub fn are_neighbors(&self, a: AgentId, b: AgentId) -> bool {
        self.adjacency.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Number of neighbors of `id`.
    pub fn degree(&self, id: AgentId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    /// Number of agents in the graph.
    pub fn agent_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        let directed: usize = self.adjacency.values().map(BTreeSet::len).sum();
        directed.checked_div(2).unwrap_or(0)
    }

    /// Mean number of neighbors per agent (0 for an empty graph).
    pub fn average_degree(&self) -> f64 {
        let agents = u32::try_from(self.adjacency.len()).unwrap_or(u32::MAX);
        if agents == 0 {
            return 0.0;
        }
        let directed: usize = self.adjacency.values().map(BTreeSet::len).sum();
        let directed = u32::try_from(directed).unwrap_or(u32::MAX);
        f64::from(directed) / f64::from(agents)
    }
}
