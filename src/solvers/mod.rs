use derive_more::Display;

use crate::{generators::ScheduleProblemDescription, problem::TrainrunDict};

#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum SolverError {
    #[display(fmt = "no solution")]
    NoSolution,
    #[display(fmt = "timeout after {} s", _0)]
    Timeout(u64),
    #[display(fmt = "solver failed: {}", _0)]
    Other(String),
}

impl std::error::Error for SolverError {}

/// A combinatorial solver finding one trainrun per vehicle that respects the
/// constraints of a [ScheduleProblemDescription].
pub trait Solver {
    fn solve(&mut self, problem: &ScheduleProblemDescription) -> Result<TrainrunDict, SolverError>;
}

impl<F> Solver for F
where
    F: FnMut(&ScheduleProblemDescription) -> Result<TrainrunDict, SolverError>,
{
    fn solve(&mut self, problem: &ScheduleProblemDescription) -> Result<TrainrunDict, SolverError> {
        self(problem)
    }
}
