use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::{ReschedulingConfig, SolverHeuristic},
    constraints::{assemble, ConstraintError, Freeze, RouteDagConstraints},
    problem::{TimeValue, TrainrunWaypoint, VehicleId, Waypoint},
    propagation::{propagate_earliest, propagate_latest},
    topology::Topology,
};

pub mod reschedule_delta;
pub mod reschedule_full;
pub mod schedule;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleInfrastructure {
    pub topology: Topology,
    /// The vehicle may not leave its source before this time.
    #[serde(default)]
    pub earliest_departure: TimeValue,
}

/// The movement graphs of all vehicles and the episode horizon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Infrastructure {
    pub max_episode_steps: TimeValue,
    pub vehicles: BTreeMap<VehicleId, VehicleInfrastructure>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RouteSectionPenalty {
    pub from: Waypoint,
    pub to: Waypoint,
    pub penalty: i64,
}

/// Everything the solver is given for one scheduling or rescheduling run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleProblemDescription {
    pub max_episode_steps: TimeValue,
    pub topologies: BTreeMap<VehicleId, Topology>,
    pub constraints: BTreeMap<VehicleId, RouteDagConstraints>,
    /// Vehicles left without a feasible constraint set.
    #[serde(default)]
    pub infeasible: BTreeMap<VehicleId, ConstraintError>,
    #[serde(default)]
    pub route_section_penalties: BTreeMap<VehicleId, Vec<RouteSectionPenalty>>,
    pub weight_lateness_seconds: i64,
    pub delay_model_resolution: TimeValue,
    pub heuristics: Vec<SolverHeuristic>,
    pub propagate_partial: bool,
}

impl ScheduleProblemDescription {
    pub fn from_results(
        infrastructure: &Infrastructure,
        results: BTreeMap<VehicleId, Result<RouteDagConstraints, ConstraintError>>,
        route_section_penalties: BTreeMap<VehicleId, Vec<RouteSectionPenalty>>,
        max_episode_steps: TimeValue,
        config: &ReschedulingConfig,
    ) -> Self {
        let mut constraints = BTreeMap::new();
        let mut infeasible = BTreeMap::new();
        for (vehicle, result) in results {
            match result {
                Ok(c) => {
                    constraints.insert(vehicle, c);
                }
                Err(e) => {
                    warn!("{}", e);
                    infeasible.insert(vehicle, e);
                }
            }
        }

        ScheduleProblemDescription {
            max_episode_steps,
            topologies: infrastructure
                .vehicles
                .iter()
                .map(|(v, i)| (*v, i.topology.clone()))
                .collect(),
            constraints,
            infeasible,
            route_section_penalties,
            weight_lateness_seconds: config.weight_lateness_seconds,
            delay_model_resolution: config.delay_model_resolution,
            heuristics: config.heuristics.clone(),
            propagate_partial: config.propagate_partial,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.infeasible.is_empty()
    }
}

/// Propagation input of one vehicle.
#[derive(Clone, Debug, Default)]
pub struct VehicleFacts {
    pub freeze: Freeze,
    pub source_earliest: TimeValue,
    pub latest_arrival: TimeValue,
}

/// Earliest pass, latest pass and assembly for a single vehicle.
pub fn derive_constraints(
    vehicle: VehicleId,
    topo: &Topology,
    facts: &VehicleFacts,
    max_window_size_from_earliest: Option<TimeValue>,
) -> Result<RouteDagConstraints, ConstraintError> {
    let earliest = propagate_earliest(topo, &facts.freeze, facts.source_earliest);
    let latest = propagate_latest(
        topo,
        &facts.freeze,
        facts.latest_arrival,
        Some(&earliest),
        max_window_size_from_earliest,
    );
    assemble(vehicle, topo, &facts.freeze, &earliest, &latest)
}

/// Derives the constraints of all vehicles in parallel.
pub fn constraints_per_vehicle<F>(
    infrastructure: &Infrastructure,
    max_window_size_from_earliest: Option<TimeValue>,
    facts: F,
) -> BTreeMap<VehicleId, Result<RouteDagConstraints, ConstraintError>>
where
    F: Fn(VehicleId, &VehicleInfrastructure) -> VehicleFacts + Sync,
{
    infrastructure
        .vehicles
        .par_iter()
        .map(|(vehicle, infra)| {
            let facts = facts(*vehicle, infra);
            let result =
                derive_constraints(*vehicle, &infra.topology, &facts, max_window_size_from_earliest);
            (*vehicle, result)
        })
        .collect()
}

/// Every topology edge not on `trainrun` costs `weight_route_change`.
pub fn route_section_penalties(
    topo: &Topology,
    trainrun: &[TrainrunWaypoint],
    weight_route_change: i64,
) -> Vec<RouteSectionPenalty> {
    let used: BTreeSet<(Waypoint, Waypoint)> = trainrun
        .iter()
        .zip(trainrun.iter().skip(1))
        .map(|(a, b)| (a.waypoint, b.waypoint))
        .collect();
    topo.edges()
        .filter(|e| !used.contains(&(e.from, e.to)))
        .map(|e| RouteSectionPenalty {
            from: e.from,
            to: e.to,
            penalty: weight_route_change,
        })
        .collect()
}

/// Bans every waypoint that is neither in `keep` nor reachable from `from`.
pub(crate) fn ban_all_but_descendants(
    topo: &Topology,
    freeze: &mut Freeze,
    keep: &BTreeSet<Waypoint>,
    from: &Waypoint,
) {
    let reachable = topo.descendants(from);
    for w in topo.waypoints() {
        if !keep.contains(&w) && !reachable.contains(&w) {
            freeze.ban(w);
        }
    }
    debug!("banned {} waypoints behind {}", freeze.banned.len(), from);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::{line, wp};

    #[test]
    pub fn penalties_for_unused_edges() {
        let topo = Topology::with_uniform_travel_time(
            vec![(wp(0), wp(1)), (wp(1), wp(2)), (wp(0), wp(3)), (wp(3), wp(2))],
            1,
        )
        .unwrap();
        let run = vec![
            TrainrunWaypoint {
                waypoint: wp(0),
                scheduled_at: 0,
            },
            TrainrunWaypoint {
                waypoint: wp(1),
                scheduled_at: 1,
            },
            TrainrunWaypoint {
                waypoint: wp(2),
                scheduled_at: 2,
            },
        ];
        let mut penalized = route_section_penalties(&topo, &run, 30)
            .into_iter()
            .map(|p| (p.from, p.to, p.penalty))
            .collect::<Vec<_>>();
        penalized.sort();
        assert_eq!(penalized, vec![(wp(0), wp(3), 30), (wp(3), wp(2), 30)]);
    }

    #[test]
    pub fn parallel_map_keeps_failures_per_vehicle() {
        let mut vehicles = BTreeMap::new();
        for v in 0..4u32 {
            vehicles.insert(
                VehicleId(v),
                VehicleInfrastructure {
                    topology: line(3),
                    earliest_departure: v as TimeValue * 2,
                },
            );
        }
        let infrastructure = Infrastructure {
            max_episode_steps: 8,
            vehicles,
        };
        let results = constraints_per_vehicle(&infrastructure, None, |_, infra| VehicleFacts {
            source_earliest: infra.earliest_departure,
            latest_arrival: 8,
            ..Default::default()
        });
        // Departing at 6 cannot reach the sink by 7.
        assert!(results[&VehicleId(0)].is_ok());
        assert!(results[&VehicleId(1)].is_ok());
        assert!(results[&VehicleId(2)].is_ok());
        assert_eq!(
            results[&VehicleId(3)].as_ref().unwrap_err().vehicle(),
            VehicleId(3)
        );

        let problem = ScheduleProblemDescription::from_results(
            &infrastructure,
            results,
            BTreeMap::new(),
            8,
            &ReschedulingConfig::default(),
        );
        assert!(!problem.is_feasible());
        assert_eq!(problem.constraints.len(), 3);
        assert_eq!(problem.topologies.len(), 4);
    }
}
