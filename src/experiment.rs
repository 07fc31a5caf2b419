use std::time::Instant;

use derive_more::Display;
use log::info;
use serde::Serialize;

use crate::{
    config::ReschedulingConfig,
    constraints::ConstraintError,
    evaluation::{reschedule_cost, total_delay_at_target, verify_schedule, Violation},
    generators::{
        reschedule_delta::{delta_reschedule_problem_description, DeltaReschedule},
        reschedule_full::full_reschedule_problem_description,
        schedule::schedule_problem_description,
        Infrastructure, ScheduleProblemDescription,
    },
    occupation::extract_resource_occupations,
    problem::{Malfunction, TimeValue, TrainrunDict},
    solvers::{Solver, SolverError},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum Stage {
    #[display(fmt = "schedule")]
    Schedule,
    #[display(fmt = "full reschedule")]
    FullReschedule,
    #[display(fmt = "delta reschedule")]
    DeltaReschedule,
}

#[derive(Debug, Display)]
pub enum ExperimentError {
    #[display(
        fmt = "{}: {} vehicles have infeasible constraints",
        stage,
        "errors.len()"
    )]
    Infeasible {
        stage: Stage,
        errors: Vec<ConstraintError>,
    },
    #[display(fmt = "{}: {}", stage, error)]
    Solver { stage: Stage, error: SolverError },
    #[display(fmt = "{}: solution has {} violations", stage, "violations.len()")]
    InvalidSolution {
        stage: Stage,
        violations: Vec<Violation>,
    },
}

impl std::error::Error for ExperimentError {}

#[derive(Clone, Debug, Serialize)]
pub struct StageResult {
    pub solution: TrainrunDict,
    pub solve_time: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExperimentResults {
    pub malfunction: Malfunction,
    pub problem_schedule: ScheduleProblemDescription,
    pub problem_full_after_malfunction: ScheduleProblemDescription,
    pub delta: DeltaReschedule,
    pub results_schedule: StageResult,
    pub results_full_after_malfunction: StageResult,
    pub results_delta_after_malfunction: StageResult,
    pub delay_full_after_malfunction: TimeValue,
    pub delay_delta_after_malfunction: TimeValue,
    pub costs_full_after_malfunction: i64,
    pub costs_delta_after_malfunction: i64,
    /// Conflicts caused by the malfunction if no other vehicle reacted.
    pub nb_resource_conflicts_after_malfunction: usize,
}

fn solve_stage(
    stage: Stage,
    problem: &ScheduleProblemDescription,
    solver: &mut impl Solver,
    release_time: TimeValue,
) -> Result<StageResult, ExperimentError> {
    if !problem.is_feasible() {
        return Err(ExperimentError::Infeasible {
            stage,
            errors: problem.infeasible.values().cloned().collect(),
        });
    }

    let start_time = Instant::now();
    let solution = {
        let _p = hprof::enter("solve");
        solver
            .solve(problem)
            .map_err(|error| ExperimentError::Solver { stage, error })?
    };
    let solve_time = start_time.elapsed().as_secs_f64();
    info!("{} solved in {:.3}s", stage, solve_time);

    let violations = verify_schedule(problem, &solution, release_time);
    if !violations.is_empty() {
        return Err(ExperimentError::InvalidSolution { stage, violations });
    }
    Ok(StageResult {
        solution,
        solve_time,
    })
}

/// Schedule, full reschedule and delta reschedule of one malfunction, each
/// solved by `solver` and verified.
pub fn run_experiment_trial(
    infrastructure: &Infrastructure,
    malfunction: &Malfunction,
    solver: &mut impl Solver,
    config: &ReschedulingConfig,
) -> Result<ExperimentResults, ExperimentError> {
    let _p = hprof::enter("experiment trial");

    let problem_schedule = schedule_problem_description(infrastructure, config);
    let results_schedule = solve_stage(
        Stage::Schedule,
        &problem_schedule,
        solver,
        config.release_time,
    )?;
    let schedule = &results_schedule.solution;

    let problem_full =
        full_reschedule_problem_description(infrastructure, schedule, malfunction, config);
    let results_full = solve_stage(
        Stage::FullReschedule,
        &problem_full,
        solver,
        config.release_time,
    )?;

    let delta = delta_reschedule_problem_description(
        infrastructure,
        schedule,
        &results_full.solution,
        malfunction,
        config,
    );
    let results_delta = solve_stage(
        Stage::DeltaReschedule,
        &delta.problem,
        solver,
        config.release_time,
    )?;

    let nb_resource_conflicts_after_malfunction =
        extract_resource_occupations(&delta.expected, config.release_time)
            .conflicts()
            .len();

    let results = ExperimentResults {
        malfunction: *malfunction,
        delay_full_after_malfunction: total_delay_at_target(schedule, &results_full.solution),
        delay_delta_after_malfunction: total_delay_at_target(schedule, &results_delta.solution),
        costs_full_after_malfunction: reschedule_cost(schedule, &results_full.solution, config),
        costs_delta_after_malfunction: reschedule_cost(schedule, &results_delta.solution, config),
        nb_resource_conflicts_after_malfunction,
        problem_schedule,
        problem_full_after_malfunction: problem_full,
        delta,
        results_schedule,
        results_full_after_malfunction: results_full,
        results_delta_after_malfunction: results_delta,
    };
    info!(
        "costs full {} delta {}, {} affected vehicles",
        results.costs_full_after_malfunction,
        results.costs_delta_after_malfunction,
        results.delta.affected.len()
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        generators::reschedule_full::tests::infrastructure,
        problem::{Direction, TrainrunWaypoint, VehicleId, Waypoint},
        topology::{tests::line, Topology},
    };

    /// Follows the first non-banned successor at the earliest allowed time.
    fn earliest_path(problem: &ScheduleProblemDescription) -> Result<TrainrunDict, SolverError> {
        let mut solution = TrainrunDict::new();
        for (vehicle, c) in problem.constraints.iter() {
            let topo = &problem.topologies[vehicle];
            let mut w = topo.source();
            let mut t = c.earliest(&w).ok_or(SolverError::NoSolution)?;
            let mut run = vec![TrainrunWaypoint {
                waypoint: w,
                scheduled_at: t,
            }];
            while let Some((next, mt)) = topo
                .successors(&w)
                .find(|(s, _)| c.get(s).map_or(false, |c| !c.is_banned()))
            {
                t = (t + mt).max(c.earliest(&next).ok_or(SolverError::NoSolution)?);
                w = next;
                run.push(TrainrunWaypoint {
                    waypoint: w,
                    scheduled_at: t,
                });
            }
            solution.insert(*vehicle, run);
        }
        Ok(solution)
    }

    fn two_rows(horizon: TimeValue) -> Infrastructure {
        let lower = Topology::with_uniform_travel_time(
            (0..2).map(|i| {
                (
                    Waypoint::new(1, i, Direction::East),
                    Waypoint::new(1, i + 1, Direction::East),
                )
            }),
            1,
        )
        .unwrap();
        infrastructure(vec![line(3), lower], horizon)
    }

    #[test]
    pub fn trial_with_earliest_path_solver() {
        let malfunction = Malfunction {
            time_step: 0,
            vehicle: VehicleId(0),
            duration: 3,
        };
        let mut solver = earliest_path;
        let results = run_experiment_trial(
            &two_rows(20),
            &malfunction,
            &mut solver,
            &ReschedulingConfig::default(),
        )
        .unwrap();

        let arrival = |s: &TrainrunDict, v: u32| s[&VehicleId(v)].last().unwrap().scheduled_at;
        assert_eq!(arrival(&results.results_schedule.solution, 0), 2);
        assert_eq!(arrival(&results.results_full_after_malfunction.solution, 0), 5);
        assert_eq!(arrival(&results.results_delta_after_malfunction.solution, 1), 2);
        assert_eq!(results.delay_full_after_malfunction, 3);
        assert_eq!(results.delay_delta_after_malfunction, 3);
        assert_eq!(results.costs_full_after_malfunction, 3);
        assert!(results.delta.affected.is_empty());
        assert_eq!(results.nb_resource_conflicts_after_malfunction, 0);
        assert!(serde_json::to_string(&results).is_ok());
    }

    #[test]
    pub fn invalid_solution_is_rejected() {
        let malfunction = Malfunction {
            time_step: 0,
            vehicle: VehicleId(0),
            duration: 3,
        };
        let mut solver =
            |_: &ScheduleProblemDescription| -> Result<TrainrunDict, SolverError> { Ok(TrainrunDict::new()) };
        match run_experiment_trial(
            &two_rows(20),
            &malfunction,
            &mut solver,
            &ReschedulingConfig::default(),
        ) {
            Err(ExperimentError::InvalidSolution { stage, violations }) => {
                assert_eq!(stage, Stage::Schedule);
                assert_eq!(violations.len(), 2);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    pub fn infeasible_reschedule_stops_the_trial() {
        // Fits in the horizon, but not with the malfunction on top.
        let malfunction = Malfunction {
            time_step: 0,
            vehicle: VehicleId(1),
            duration: 10,
        };
        let mut solver = earliest_path;
        let err = run_experiment_trial(
            &two_rows(6),
            &malfunction,
            &mut solver,
            &ReschedulingConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "full reschedule: 1 vehicles have infeasible constraints"
        );
        match err {
            ExperimentError::Infeasible { stage, errors } => {
                assert_eq!(stage, Stage::FullReschedule);
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].vehicle(), VehicleId(1));
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    pub fn solver_failure_names_the_stage() {
        let malfunction = Malfunction {
            time_step: 0,
            vehicle: VehicleId(0),
            duration: 1,
        };
        let mut solver = |_: &ScheduleProblemDescription| -> Result<TrainrunDict, SolverError> {
            Err(SolverError::Timeout(60))
        };
        let err = run_experiment_trial(
            &two_rows(20),
            &malfunction,
            &mut solver,
            &ReschedulingConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "schedule: timeout after 60 s");
    }
}
