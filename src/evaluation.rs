use std::collections::BTreeSet;

use derive_more::Display;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::ReschedulingConfig,
    constraints::{RouteDagConstraints, WaypointConstraint},
    generators::ScheduleProblemDescription,
    occupation::{extract_resource_occupations, ResourceConflict},
    problem::{TimeValue, TrainrunDict, TrainrunWaypoint, VehicleId, Waypoint},
    topology::Topology,
};

/// Something wrong with a solver's schedule.
#[derive(Clone, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Violation {
    #[display(fmt = "vehicle {} has no trainrun", _0)]
    MissingVehicle(VehicleId),
    #[display(fmt = "vehicle {} has an empty trainrun", _0)]
    EmptyTrainrun(VehicleId),
    #[display(fmt = "vehicle {} starts at {} instead of its source", vehicle, waypoint)]
    NotAtSource { vehicle: VehicleId, waypoint: Waypoint },
    #[display(fmt = "vehicle {} ends at {} which is not a sink", vehicle, waypoint)]
    NotAtSink { vehicle: VehicleId, waypoint: Waypoint },
    #[display(fmt = "vehicle {} moves {} -> {} without an edge", vehicle, from, to)]
    NoEdge {
        vehicle: VehicleId,
        from: Waypoint,
        to: Waypoint,
    },
    #[display(
        fmt = "vehicle {} moves {} -> {} in {} < {}",
        vehicle,
        from,
        to,
        actual,
        min_travel_time
    )]
    TooFast {
        vehicle: VehicleId,
        from: Waypoint,
        to: Waypoint,
        min_travel_time: TimeValue,
        actual: TimeValue,
    },
    #[display(
        fmt = "vehicle {} at {} at time {} violates {:?}",
        vehicle,
        waypoint,
        time,
        constraint
    )]
    ConstraintViolated {
        vehicle: VehicleId,
        waypoint: Waypoint,
        time: TimeValue,
        constraint: WaypointConstraint,
    },
    #[display(fmt = "vehicle {} never visits {} at {}", vehicle, waypoint, time)]
    MissingVisit {
        vehicle: VehicleId,
        waypoint: Waypoint,
        time: TimeValue,
    },
    #[display(fmt = "{}", _0)]
    Conflict(ResourceConflict),
}

/// Checks one trainrun against its vehicle's topology and constraints.
pub fn verify_trainrun(
    vehicle: VehicleId,
    topo: &Topology,
    constraints: &RouteDagConstraints,
    trainrun: &[TrainrunWaypoint],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let (first, last) = match (trainrun.first(), trainrun.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return vec![Violation::EmptyTrainrun(vehicle)],
    };

    if first.waypoint != topo.source() {
        violations.push(Violation::NotAtSource {
            vehicle,
            waypoint: first.waypoint,
        });
    }
    if !topo.is_sink(&last.waypoint) {
        violations.push(Violation::NotAtSink {
            vehicle,
            waypoint: last.waypoint,
        });
    }

    for (a, b) in trainrun.iter().zip(trainrun.iter().skip(1)) {
        match topo.min_travel_time(&a.waypoint, &b.waypoint) {
            None => violations.push(Violation::NoEdge {
                vehicle,
                from: a.waypoint,
                to: b.waypoint,
            }),
            Some(mt) if b.scheduled_at - a.scheduled_at < mt => {
                violations.push(Violation::TooFast {
                    vehicle,
                    from: a.waypoint,
                    to: b.waypoint,
                    min_travel_time: mt,
                    actual: b.scheduled_at - a.scheduled_at,
                })
            }
            Some(_) => {}
        }
    }

    for w in trainrun.iter() {
        let constraint = constraints
            .get(&w.waypoint)
            .copied()
            .unwrap_or(WaypointConstraint::Banned);
        if !constraint.admits(w.scheduled_at) {
            violations.push(Violation::ConstraintViolated {
                vehicle,
                waypoint: w.waypoint,
                time: w.scheduled_at,
                constraint,
            });
        }
    }

    for (waypoint, time) in constraints.visits() {
        if !trainrun.iter().any(|w| w.waypoint == waypoint) {
            violations.push(Violation::MissingVisit {
                vehicle,
                waypoint,
                time,
            });
        }
    }

    violations
}

/// All violations of `trainruns` as a solution of `problem`, including
/// resource conflicts between vehicles.
pub fn verify_schedule(
    problem: &ScheduleProblemDescription,
    trainruns: &TrainrunDict,
    release_time: TimeValue,
) -> Vec<Violation> {
    let _p = hprof::enter("verify schedule");
    let mut violations = Vec::new();
    for (vehicle, constraints) in problem.constraints.iter() {
        let topo = match problem.topologies.get(vehicle) {
            Some(t) => t,
            None => continue,
        };
        match trainruns.get(vehicle) {
            Some(trainrun) => violations.extend(verify_trainrun(*vehicle, topo, constraints, trainrun)),
            None => violations.push(Violation::MissingVehicle(*vehicle)),
        }
    }

    let occupations = extract_resource_occupations(trainruns, release_time);
    violations.extend(occupations.conflicts().into_iter().map(Violation::Conflict));

    for v in violations.iter() {
        warn!("{}", v);
    }
    violations
}

fn arrival(trainrun: &[TrainrunWaypoint]) -> Option<TimeValue> {
    trainrun.last().map(|w| w.scheduled_at)
}

/// Sum over vehicles of the positive delay at their target.
pub fn total_delay_at_target(schedule: &TrainrunDict, reschedule: &TrainrunDict) -> TimeValue {
    reschedule
        .iter()
        .filter_map(|(vehicle, trainrun)| {
            let planned = arrival(schedule.get(vehicle)?)?;
            let actual = arrival(trainrun)?;
            Some((actual - planned).max(0))
        })
        .sum()
}

fn sections(trainrun: &[TrainrunWaypoint]) -> BTreeSet<(Waypoint, Waypoint)> {
    trainrun
        .iter()
        .zip(trainrun.iter().skip(1))
        .map(|(a, b)| (a.waypoint, b.waypoint))
        .collect()
}

/// Number of edges used in `reschedule` that `schedule` did not use.
pub fn changed_route_sections(schedule: &TrainrunDict, reschedule: &TrainrunDict) -> usize {
    reschedule
        .iter()
        .map(|(vehicle, trainrun)| {
            let before = schedule
                .get(vehicle)
                .map(|t| sections(t))
                .unwrap_or_default();
            sections(trainrun).difference(&before).count()
        })
        .sum()
}

pub fn reschedule_cost(
    schedule: &TrainrunDict,
    reschedule: &TrainrunDict,
    config: &ReschedulingConfig,
) -> i64 {
    let delay = total_delay_at_target(schedule, reschedule) as i64;
    let changed = changed_route_sections(schedule, reschedule) as i64;
    let cost = config.weight_lateness_seconds * delay + config.weight_route_change * changed;
    debug!("delay {} changed sections {} cost {}", delay, changed, cost);
    cost
}
