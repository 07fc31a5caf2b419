use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{
    constraints_per_vehicle, reschedule_full::full_reschedule_facts,
    reschedule_full::reschedule_latest_arrival, route_section_penalties, Infrastructure,
    ScheduleProblemDescription, VehicleFacts,
};
use crate::{
    config::ReschedulingConfig,
    occupation::{changed_vehicles, diff_occupations, extract_resource_occupations, OccupationChange},
    problem::{route, Malfunction, Trainrun, TrainrunDict, TrainrunWaypoint, VehicleId},
    topology::Topology,
};

/// The delta rescheduling problem together with what it was derived from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeltaReschedule {
    pub problem: ScheduleProblemDescription,
    pub affected: BTreeSet<VehicleId>,
    pub changes: Vec<OccupationChange>,
    /// The baseline with the malfunctioning vehicle pushed back just as much
    /// as it has to be.
    pub expected: TrainrunDict,
}

/// Pushes the part of `baseline` after the malfunction start back until the
/// vehicle can have waited out the malfunction, keeping minimum travel times.
pub fn delay_by_malfunction(
    topo: &Topology,
    baseline: &[TrainrunWaypoint],
    malfunction: &Malfunction,
) -> Trainrun {
    let mut expected: Trainrun = baseline.to_vec();
    let first_moving = baseline
        .iter()
        .position(|w| w.scheduled_at > malfunction.time_step)
        .unwrap_or(baseline.len());

    for k in first_moving..expected.len() {
        let here = expected[k].waypoint;
        let earliest = match k.checked_sub(1).map(|p| expected[p]) {
            Some(prev) => {
                let mt = topo
                    .min_travel_time(&prev.waypoint, &here)
                    .unwrap_or(baseline[k].scheduled_at - baseline[k - 1].scheduled_at);
                let after_prev = prev.scheduled_at + mt;
                if k == first_moving {
                    after_prev.max(malfunction.end() + mt)
                } else {
                    after_prev
                }
            }
            None => malfunction.end(),
        };
        expected[k].scheduled_at = expected[k].scheduled_at.max(earliest);
    }
    expected
}

/// The rescheduling problem as it would be posed by an oracle that knows the
/// full reschedule: vehicles that are not affected by the malfunction keep
/// their full-reschedule trainrun, affected vehicles are bounded by it.
pub fn delta_reschedule_problem_description(
    infrastructure: &Infrastructure,
    schedule: &TrainrunDict,
    full_reschedule: &TrainrunDict,
    malfunction: &Malfunction,
    config: &ReschedulingConfig,
) -> DeltaReschedule {
    let _p = hprof::enter("delta reschedule problem");

    let mut expected = schedule.clone();
    if let (Some(infra), Some(baseline)) = (
        infrastructure.vehicles.get(&malfunction.vehicle),
        schedule.get(&malfunction.vehicle),
    ) {
        expected.insert(
            malfunction.vehicle,
            delay_by_malfunction(&infra.topology, baseline, malfunction),
        );
    }

    let changes = diff_occupations(
        &extract_resource_occupations(&expected, config.release_time),
        &extract_resource_occupations(full_reschedule, config.release_time),
    );
    let mut affected = changed_vehicles(&changes);
    for vehicle in infrastructure.vehicles.keys() {
        let expected_route = expected.get(vehicle).map(|t| route(t));
        let full_route = full_reschedule.get(vehicle).map(|t| route(t));
        if expected_route != full_route {
            debug!("vehicle {} changed its route", vehicle);
            affected.insert(*vehicle);
        }
    }
    info!(
        "{} of {} vehicles affected by the malfunction",
        affected.len(),
        infrastructure.vehicles.len()
    );

    let latest_arrival = reschedule_latest_arrival(infrastructure, malfunction, config);
    let results = constraints_per_vehicle(
        infrastructure,
        config.max_window_size_from_earliest,
        |vehicle, infra| {
            let realized = full_reschedule.get(&vehicle).map(|t| t.as_slice()).unwrap_or(&[]);
            if affected.contains(&vehicle) {
                let baseline = schedule.get(&vehicle).map(|t| t.as_slice()).unwrap_or(&[]);
                let mut facts =
                    full_reschedule_facts(vehicle, infra, baseline, malfunction, latest_arrival);
                for w in realized.iter().filter(|w| w.scheduled_at > malfunction.time_step) {
                    facts.freeze.bound_latest(w.waypoint, w.scheduled_at);
                }
                facts
            } else {
                let mut facts = VehicleFacts {
                    source_earliest: infra.earliest_departure,
                    latest_arrival,
                    ..Default::default()
                };
                for w in realized.iter() {
                    facts.freeze.force(w.waypoint, w.scheduled_at);
                }
                for w in infra.topology.waypoints() {
                    if !facts.freeze.visit.contains_key(&w) {
                        facts.freeze.ban(w);
                    }
                }
                facts
            }
        },
    );

    let penalties: BTreeMap<_, _> = infrastructure
        .vehicles
        .iter()
        .filter(|(vehicle, _)| affected.contains(vehicle))
        .map(|(vehicle, infra)| {
            let baseline = schedule.get(vehicle).map(|t| t.as_slice()).unwrap_or(&[]);
            (
                *vehicle,
                route_section_penalties(&infra.topology, baseline, config.weight_route_change),
            )
        })
        .collect();

    DeltaReschedule {
        problem: ScheduleProblemDescription::from_results(
            infrastructure,
            results,
            penalties,
            latest_arrival,
            config,
        ),
        affected,
        changes,
        expected,
    }
}
