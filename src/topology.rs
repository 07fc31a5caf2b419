use std::collections::{BTreeSet, HashMap};

use derive_more::Display;
use log::trace;
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::problem::{TimeValue, Waypoint};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeIdx(u32);

impl From<NodeIdx> for usize {
    fn from(v: NodeIdx) -> Self {
        v.0 as usize
    }
}

impl From<usize> for NodeIdx {
    fn from(x: usize) -> Self {
        NodeIdx(x as u32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub from: Waypoint,
    pub to: Waypoint,
    pub min_travel_time: TimeValue,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum TopologyError {
    #[display(fmt = "topology has no sink")]
    NoSink,
    #[display(fmt = "expected exactly one source, found {}", _0)]
    SourceCount(usize),
    #[display(fmt = "topology contains a cycle through {}", _0)]
    Cyclic(Waypoint),
    #[display(fmt = "edge {} -> {} has minimum travel time {} < 1", _0, _1, _2)]
    InvalidTravelTime(Waypoint, Waypoint, TimeValue),
    #[display(fmt = "duplicate edge {} -> {}", _0, _1)]
    DuplicateEdge(Waypoint, Waypoint),
}

impl std::error::Error for TopologyError {}

/// The movement graph of one vehicle: a DAG over waypoints with exactly one
/// source, edges weighted by minimum travel time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RawTopology", into = "RawTopology")]
pub struct Topology {
    waypoints: TiVec<NodeIdx, Waypoint>,
    index: HashMap<Waypoint, NodeIdx>,
    successors: TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>>,
    predecessors: TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>>,
    order: Vec<NodeIdx>,
    source: NodeIdx,
    sinks: Vec<NodeIdx>,
}

/// Edge-list form used for (de)serialization. Isolated nodes can be given in
/// `nodes`, every edge endpoint is added implicitly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawTopology {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Waypoint>,
    pub edges: Vec<Edge>,
}

impl TryFrom<RawTopology> for Topology {
    type Error = TopologyError;

    fn try_from(raw: RawTopology) -> Result<Self, Self::Error> {
        Topology::from_parts(raw.nodes, raw.edges)
    }
}

impl From<Topology> for RawTopology {
    fn from(topo: Topology) -> Self {
        let isolated = topo
            .waypoints()
            .filter(|w| topo.successors(w).next().is_none() && topo.predecessors(w).next().is_none())
            .collect();
        RawTopology {
            nodes: isolated,
            edges: topo.edges().collect(),
        }
    }
}

impl Topology {
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Result<Self, TopologyError> {
        Self::from_parts(std::iter::empty(), edges)
    }

    /// Path-like topologies where every edge takes the same time, as produced
    /// for flatland agents with a fixed speed.
    pub fn with_uniform_travel_time(
        edges: impl IntoIterator<Item = (Waypoint, Waypoint)>,
        min_travel_time: TimeValue,
    ) -> Result<Self, TopologyError> {
        Self::from_edges(edges.into_iter().map(|(from, to)| Edge {
            from,
            to,
            min_travel_time,
        }))
    }

    pub fn from_parts(
        nodes: impl IntoIterator<Item = Waypoint>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, TopologyError> {
        let mut waypoints: TiVec<NodeIdx, Waypoint> = TiVec::new();
        let mut index: HashMap<Waypoint, NodeIdx> = HashMap::new();
        let mut successors: TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>> = TiVec::new();
        let mut predecessors: TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>> = TiVec::new();

        let mut node = |w: Waypoint,
                        succs: &mut TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>>,
                        preds: &mut TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>>| {
            *index.entry(w).or_insert_with(|| {
                succs.push(Vec::new());
                preds.push(Vec::new());
                waypoints.push_and_get_key(w)
            })
        };

        for w in nodes {
            node(w, &mut successors, &mut predecessors);
        }

        for edge in edges {
            if edge.min_travel_time < 1 {
                return Err(TopologyError::InvalidTravelTime(
                    edge.from,
                    edge.to,
                    edge.min_travel_time,
                ));
            }
            if edge.from == edge.to {
                return Err(TopologyError::Cyclic(edge.from));
            }
            let a = node(edge.from, &mut successors, &mut predecessors);
            let b = node(edge.to, &mut successors, &mut predecessors);
            if successors[a].iter().any(|(n, _)| *n == b) {
                return Err(TopologyError::DuplicateEdge(edge.from, edge.to));
            }
            successors[a].push((b, edge.min_travel_time));
            predecessors[b].push((a, edge.min_travel_time));
        }

        if waypoints.is_empty() {
            return Err(TopologyError::NoSink);
        }

        // Kahn's algorithm. Popping from the back of the ready list makes the
        // order depend only on insertion order, so it is reproducible.
        let mut in_degree: TiVec<NodeIdx, usize> = predecessors.iter().map(Vec::len).collect();
        let mut ready: Vec<NodeIdx> = in_degree
            .iter_enumerated()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n)
            .rev()
            .collect();
        let n_sources = ready.len();
        let mut order = Vec::with_capacity(waypoints.len());
        while let Some(n) = ready.pop() {
            order.push(n);
            for (next, _) in successors[n].iter().rev() {
                in_degree[*next] -= 1;
                if in_degree[*next] == 0 {
                    ready.push(*next);
                }
            }
        }

        if order.len() < waypoints.len() {
            let on_cycle = in_degree
                .iter_enumerated()
                .find(|(_, d)| **d > 0)
                .map(|(n, _)| waypoints[n])
                .unwrap_or(waypoints[NodeIdx(0)]);
            return Err(TopologyError::Cyclic(on_cycle));
        }

        if n_sources != 1 {
            return Err(TopologyError::SourceCount(n_sources));
        }
        let source = order[0];

        let sinks: Vec<NodeIdx> = successors
            .iter_enumerated()
            .filter(|(_, s)| s.is_empty())
            .map(|(n, _)| n)
            .collect();
        if sinks.is_empty() {
            return Err(TopologyError::NoSink);
        }

        trace!(
            "topology with {} nodes, source {}, {} sinks",
            waypoints.len(),
            waypoints[source],
            sinks.len()
        );

        Ok(Topology {
            waypoints,
            index,
            successors,
            predecessors,
            order,
            source,
            sinks,
        })
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn contains(&self, w: &Waypoint) -> bool {
        self.index.contains_key(w)
    }

    pub fn source(&self) -> Waypoint {
        self.waypoints[self.source]
    }

    pub fn sinks(&self) -> impl Iterator<Item = Waypoint> + '_ {
        self.sinks.iter().map(move |n| self.waypoints[*n])
    }

    pub fn is_sink(&self, w: &Waypoint) -> bool {
        self.index
            .get(w)
            .map(|n| self.successors[*n].is_empty())
            .unwrap_or(false)
    }

    pub fn waypoints(&self) -> impl Iterator<Item = Waypoint> + '_ {
        self.waypoints.iter().copied()
    }

    /// Waypoints in topological order, starting with the source.
    pub fn topological_order(&self) -> impl DoubleEndedIterator<Item = Waypoint> + '_ {
        self.order.iter().map(move |n| self.waypoints[*n])
    }

    pub fn successors(&self, w: &Waypoint) -> impl Iterator<Item = (Waypoint, TimeValue)> + '_ {
        self.neighbours(&self.successors, w)
    }

    pub fn predecessors(&self, w: &Waypoint) -> impl Iterator<Item = (Waypoint, TimeValue)> + '_ {
        self.neighbours(&self.predecessors, w)
    }

    fn neighbours<'a>(
        &'a self,
        adjacency: &'a TiVec<NodeIdx, Vec<(NodeIdx, TimeValue)>>,
        w: &Waypoint,
    ) -> impl Iterator<Item = (Waypoint, TimeValue)> + 'a {
        self.index
            .get(w)
            .into_iter()
            .flat_map(move |n| adjacency[*n].iter())
            .map(move |(m, dt)| (self.waypoints[*m], *dt))
    }

    pub fn min_travel_time(&self, from: &Waypoint, to: &Waypoint) -> Option<TimeValue> {
        self.successors(from)
            .find(|(w, _)| w == to)
            .map(|(_, dt)| dt)
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.successors
            .iter_enumerated()
            .flat_map(move |(a, nexts)| {
                nexts.iter().map(move |(b, dt)| Edge {
                    from: self.waypoints[a],
                    to: self.waypoints[*b],
                    min_travel_time: *dt,
                })
            })
    }

    /// All waypoints reachable from `w`, excluding `w` itself.
    pub fn descendants(&self, w: &Waypoint) -> BTreeSet<Waypoint> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeIdx> = self.index.get(w).copied().into_iter().collect();
        while let Some(n) = stack.pop() {
            for (next, _) in self.successors[n].iter() {
                if seen.insert(self.waypoints[*next]) {
                    stack.push(*next);
                }
            }
        }
        seen
    }

    pub(crate) fn node_order(&self) -> &[NodeIdx] {
        &self.order
    }

    pub(crate) fn node_waypoint(&self, n: NodeIdx) -> Waypoint {
        self.waypoints[n]
    }

    pub(crate) fn node_successors(&self, n: NodeIdx) -> &[(NodeIdx, TimeValue)] {
        &self.successors[n]
    }

    pub(crate) fn node_predecessors(&self, n: NodeIdx) -> &[(NodeIdx, TimeValue)] {
        &self.predecessors[n]
    }

    pub(crate) fn node_source(&self) -> NodeIdx {
        self.source
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::problem::Direction;

    pub(crate) fn wp(column: i32) -> Waypoint {
        Waypoint::new(0, column, Direction::East)
    }

    /// `0 -> 1 -> ... -> n-1`, one time unit per edge.
    pub(crate) fn line(n: i32) -> Topology {
        Topology::with_uniform_travel_time((0..n - 1).map(|i| (wp(i), wp(i + 1))), 1).unwrap()
    }

    #[test]
    pub fn line_topology() {
        let topo = line(3);
        assert_eq!(topo.len(), 3);
        assert_eq!(topo.source(), wp(0));
        assert_eq!(topo.sinks().collect::<Vec<_>>(), vec![wp(2)]);
        assert_eq!(
            topo.topological_order().collect::<Vec<_>>(),
            vec![wp(0), wp(1), wp(2)]
        );
        assert_eq!(topo.min_travel_time(&wp(0), &wp(1)), Some(1));
        assert_eq!(topo.min_travel_time(&wp(0), &wp(2)), None);
        assert_eq!(topo.descendants(&wp(0)).len(), 2);
    }

    #[test]
    pub fn rejects_malformed() {
        let e = |a, b| Edge {
            from: wp(a),
            to: wp(b),
            min_travel_time: 1,
        };

        assert_eq!(
            Topology::from_edges(vec![e(0, 1), e(1, 2), e(2, 1)]).unwrap_err(),
            TopologyError::Cyclic(wp(1))
        );
        assert_eq!(
            Topology::from_edges(vec![e(0, 2), e(1, 2)]).unwrap_err(),
            TopologyError::SourceCount(2)
        );
        assert_eq!(
            Topology::from_edges(vec![]).unwrap_err(),
            TopologyError::NoSink
        );
        assert_eq!(
            Topology::from_edges(vec![e(0, 1), e(0, 1)]).unwrap_err(),
            TopologyError::DuplicateEdge(wp(0), wp(1))
        );
        assert!(matches!(
            Topology::from_edges(vec![Edge {
                from: wp(0),
                to: wp(1),
                min_travel_time: 0
            }]),
            Err(TopologyError::InvalidTravelTime(_, _, 0))
        ));
    }

    #[test]
    pub fn single_node_is_its_own_sink() {
        let topo = Topology::from_parts(vec![wp(5)], vec![]).unwrap();
        assert_eq!(topo.source(), wp(5));
        assert!(topo.is_sink(&wp(5)));

        let back: Topology = serde_json::from_str(&serde_json::to_string(&topo).unwrap()).unwrap();
        assert_eq!(back.source(), wp(5));
    }

    #[test]
    pub fn roundtrips_through_json() {
        let topo = line(4);
        let json = serde_json::to_string(&topo).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(back.edges().collect::<Vec<_>>(), topo.edges().collect::<Vec<_>>());

        let cyclic = r#"{"edges":[
            {"from":{"position":[0,0],"direction":"East"},"to":{"position":[0,1],"direction":"East"},"min_travel_time":1},
            {"from":{"position":[0,1],"direction":"East"},"to":{"position":[0,0],"direction":"East"},"min_travel_time":1}]}"#;
        assert!(serde_json::from_str::<Topology>(cyclic).is_err());
    }
}
