use std::collections::BTreeMap;

use log::{debug, trace};
use serde::Serialize;

use crate::{
    constraints::{RouteDagConstraints, WaypointConstraint},
    generators::ScheduleProblemDescription,
    problem::VehicleId,
};

/// How tightly a vehicle is constrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintStatistics {
    pub visits: usize,
    pub earliest_only: usize,
    pub windows: usize,
    pub banned: usize,
    pub total_window_size: i64,
}

impl ConstraintStatistics {
    pub fn of(constraints: &RouteDagConstraints) -> Self {
        let mut stats = ConstraintStatistics::default();
        for (_, c) in constraints.iter() {
            match c {
                WaypointConstraint::Visit(_) => stats.visits += 1,
                WaypointConstraint::EarliestOnly(_) => stats.earliest_only += 1,
                WaypointConstraint::Banned => stats.banned += 1,
                WaypointConstraint::Window { earliest, latest } => {
                    stats.windows += 1;
                    stats.total_window_size += (latest - earliest) as i64;
                }
            }
        }
        stats
    }
}

pub fn problem_statistics(
    problem: &ScheduleProblemDescription,
) -> BTreeMap<VehicleId, ConstraintStatistics> {
    problem
        .constraints
        .iter()
        .map(|(vehicle, c)| (*vehicle, ConstraintStatistics::of(c)))
        .collect()
}

/// Dumps every constraint of `problem` to the trace log.
pub fn log_problem(problem: &ScheduleProblemDescription) {
    for (vehicle, constraints) in problem.constraints.iter() {
        debug!("vehicle {}: {:?}", vehicle, ConstraintStatistics::of(constraints));
        for (w, c) in constraints.iter() {
            trace!("  {} {:?}", w, c);
        }
    }
    for error in problem.infeasible.values() {
        debug!("{}", error);
    }
}
