use std::collections::BTreeMap;

use log::info;

use super::{constraints_per_vehicle, Infrastructure, ScheduleProblemDescription, VehicleFacts};
use crate::config::ReschedulingConfig;

/// The undisrupted scheduling problem: each vehicle leaves its source no
/// earlier than its departure time and reaches a sink before the horizon.
pub fn schedule_problem_description(
    infrastructure: &Infrastructure,
    config: &ReschedulingConfig,
) -> ScheduleProblemDescription {
    let _p = hprof::enter("schedule problem");
    let horizon = infrastructure.max_episode_steps;
    let results = constraints_per_vehicle(infrastructure, None, |_, infra| VehicleFacts {
        source_earliest: infra.earliest_departure,
        latest_arrival: horizon,
        ..Default::default()
    });
    info!("schedule problem for {} vehicles", results.len());
    ScheduleProblemDescription::from_results(
        infrastructure,
        results,
        BTreeMap::new(),
        horizon,
        config,
    )
}
