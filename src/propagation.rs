use std::collections::BTreeMap;

use log::trace;
use typed_index_collections::TiVec;

use crate::{
    constraints::Freeze,
    problem::{TimeValue, Waypoint},
    topology::{NodeIdx, Topology},
};

/// Forward pass: the earliest time each waypoint can be occupied.
///
/// Forced visits are taken as given and propagated from, earliest-only facts
/// raise the bound of their waypoint. A waypoint without a non-banned,
/// reachable predecessor is left out, unless it is the source.
pub fn propagate_earliest(
    topo: &Topology,
    freeze: &Freeze,
    source_earliest: TimeValue,
) -> BTreeMap<Waypoint, TimeValue> {
    let _p = hprof::enter("propagate earliest");
    let mut earliest: TiVec<NodeIdx, Option<TimeValue>> = vec![None; topo.len()].into();

    for &n in topo.node_order() {
        let w = topo.node_waypoint(n);
        if freeze.banned.contains(&w) {
            continue;
        }
        if let Some(t) = freeze.visit.get(&w) {
            earliest[n] = Some(*t);
            continue;
        }

        let from_predecessors = topo
            .node_predecessors(n)
            .iter()
            .filter_map(|(p, dt)| earliest[*p].map(|t| t + dt))
            .max();

        let reached = if n == topo.node_source() {
            Some(from_predecessors.map_or(source_earliest, |t| t.max(source_earliest)))
        } else {
            from_predecessors
        };

        earliest[n] = reached.map(|t| match freeze.earliest.get(&w) {
            Some(lb) => t.max(*lb),
            None => t,
        });
    }

    collect(topo, earliest)
}

/// Backward pass: the latest time each waypoint can be occupied such that a
/// sink is still reached in time.
///
/// Sinks are due at `latest_arrival - 1`. Latest facts in `freeze` are upper
/// bounds on top of that. With a window
/// size and the earliest times, no waypoint is given more than
/// `earliest + max_window_size` as its latest time.
pub fn propagate_latest(
    topo: &Topology,
    freeze: &Freeze,
    latest_arrival: TimeValue,
    earliest: Option<&BTreeMap<Waypoint, TimeValue>>,
    max_window_size_from_earliest: Option<TimeValue>,
) -> BTreeMap<Waypoint, TimeValue> {
    let _p = hprof::enter("propagate latest");
    let mut latest: TiVec<NodeIdx, Option<TimeValue>> = vec![None; topo.len()].into();

    for &n in topo.node_order().iter().rev() {
        let w = topo.node_waypoint(n);
        if freeze.banned.contains(&w) {
            continue;
        }
        if let Some(t) = freeze.visit.get(&w) {
            latest[n] = Some(*t);
            continue;
        }

        let successors = topo.node_successors(n);
        let bound = if successors.is_empty() {
            Some(match freeze.latest.get(&w) {
                Some(ub) => (*ub).min(latest_arrival - 1),
                None => latest_arrival - 1,
            })
        } else {
            successors
                .iter()
                .filter_map(|(s, dt)| latest[*s].map(|t| t - dt))
                .min()
                .map(|t| match freeze.latest.get(&w) {
                    Some(ub) => t.min(*ub),
                    None => t,
                })
        };

        let capped = match (bound, earliest, max_window_size_from_earliest) {
            (Some(l), Some(earliest), Some(window)) => match earliest.get(&w) {
                Some(e) => Some(l.min(e + window)),
                None => Some(l),
            },
            (bound, _, _) => bound,
        };

        if capped.is_none() {
            trace!("{} does not reach a sink", w);
        }
        latest[n] = capped;
    }

    collect(topo, latest)
}

fn collect(topo: &Topology, times: TiVec<NodeIdx, Option<TimeValue>>) -> BTreeMap<Waypoint, TimeValue> {
    times
        .into_iter_enumerated()
        .filter_map(|(n, t)| t.map(|t| (topo.node_waypoint(n), t)))
        .collect()
}
