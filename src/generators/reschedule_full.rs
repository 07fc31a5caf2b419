use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use super::{
    ban_all_but_descendants, constraints_per_vehicle, route_section_penalties, Infrastructure,
    ScheduleProblemDescription, VehicleFacts, VehicleInfrastructure,
};
use crate::{
    config::ReschedulingConfig,
    problem::{Malfunction, TimeValue, TrainrunDict, TrainrunWaypoint, VehicleId, Waypoint},
};

/// Deadline of rescheduling problems.
pub fn reschedule_latest_arrival(
    infrastructure: &Infrastructure,
    malfunction: &Malfunction,
    config: &ReschedulingConfig,
) -> TimeValue {
    if config.stretch_latest_arrival_by_malfunction {
        infrastructure.max_episode_steps + malfunction.duration
    } else {
        infrastructure.max_episode_steps
    }
}

/// Freeze facts of one vehicle after the malfunction: what already happened
/// is fixed, what can no longer happen is banned, and the malfunctioning
/// vehicle cannot move on before the malfunction is over.
pub fn full_reschedule_facts(
    vehicle: VehicleId,
    infra: &VehicleInfrastructure,
    baseline: &[TrainrunWaypoint],
    malfunction: &Malfunction,
    latest_arrival: TimeValue,
) -> VehicleFacts {
    let topo = &infra.topology;
    let is_malfunctioning = vehicle == malfunction.vehicle;
    let t_m = malfunction.time_step;

    let mut facts = VehicleFacts {
        source_earliest: infra.earliest_departure,
        latest_arrival,
        ..Default::default()
    };

    let done: Vec<&TrainrunWaypoint> = baseline
        .iter()
        .filter(|w| {
            if is_malfunctioning {
                w.scheduled_at <= t_m
            } else {
                w.scheduled_at < t_m
            }
        })
        .filter(|w| {
            let known = topo.contains(&w.waypoint);
            if !known {
                warn!("vehicle {}: baseline visits {} outside its topology", vehicle, w.waypoint);
            }
            known
        })
        .collect();

    for w in done.iter() {
        facts.freeze.force(w.waypoint, w.scheduled_at);
    }

    match done.last() {
        Some(occupied) => {
            let keep: BTreeSet<Waypoint> = done.iter().map(|w| w.waypoint).collect();
            ban_all_but_descendants(topo, &mut facts.freeze, &keep, &occupied.waypoint);
            // Still at `occupied` when the malfunction starts.
            for (s, mt) in topo.successors(&occupied.waypoint) {
                let bound = if is_malfunctioning {
                    malfunction.end() + mt
                } else {
                    (occupied.scheduled_at + mt).max(t_m)
                };
                facts.freeze.bound_earliest(s, bound);
            }
        }
        None => {
            let bound = if is_malfunctioning {
                malfunction.end()
            } else {
                infra.earliest_departure.max(t_m)
            };
            facts.freeze.bound_earliest(topo.source(), bound);
        }
    }

    debug!(
        "vehicle {}: {} forced, {} banned",
        vehicle,
        facts.freeze.visit.len(),
        facts.freeze.banned.len()
    );
    facts
}

/// The rescheduling problem after `malfunction`, without knowledge of the
/// outcome.
pub fn full_reschedule_problem_description(
    infrastructure: &Infrastructure,
    schedule: &TrainrunDict,
    malfunction: &Malfunction,
    config: &ReschedulingConfig,
) -> ScheduleProblemDescription {
    let _p = hprof::enter("full reschedule problem");
    if !infrastructure.vehicles.contains_key(&malfunction.vehicle) {
        warn!("malfunction of unknown vehicle {}", malfunction.vehicle);
    }
    let latest_arrival = reschedule_latest_arrival(infrastructure, malfunction, config);

    let results = constraints_per_vehicle(
        infrastructure,
        config.max_window_size_from_earliest,
        |vehicle, infra| {
            let baseline = schedule.get(&vehicle).map(|t| t.as_slice()).unwrap_or(&[]);
            full_reschedule_facts(vehicle, infra, baseline, malfunction, latest_arrival)
        },
    );

    let penalties: BTreeMap<_, _> = infrastructure
        .vehicles
        .iter()
        .map(|(vehicle, infra)| {
            let baseline = schedule.get(vehicle).map(|t| t.as_slice()).unwrap_or(&[]);
            (
                *vehicle,
                route_section_penalties(&infra.topology, baseline, config.weight_route_change),
            )
        })
        .collect();

    info!(
        "full reschedule problem for {} vehicles, malfunction of {} at {} for {}",
        results.len(),
        malfunction.vehicle,
        malfunction.time_step,
        malfunction.duration
    );
    ScheduleProblemDescription::from_results(
        infrastructure,
        results,
        penalties,
        latest_arrival,
        config,
    )
}
