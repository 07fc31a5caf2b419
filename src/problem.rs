use std::collections::BTreeMap;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

pub type TimeValue = i32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
#[display(fmt = "{}", _0)]
pub struct VehicleId(pub u32);

impl From<usize> for VehicleId {
    fn from(x: usize) -> Self {
        VehicleId(x as u32)
    }
}

/// Heading of a vehicle in a grid cell.
///
/// `SourceTarget` is not a physical heading: it marks the virtual nodes some
/// topologies use as a single entry or exit of the movement graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    SourceTarget,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(Serialize, Deserialize)]
#[display(fmt = "({}, {})", row, column)]
pub struct Resource {
    pub row: i32,
    pub column: i32,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: (i32, i32),
    pub direction: Direction,
}

impl Waypoint {
    pub fn new(row: i32, column: i32, direction: Direction) -> Self {
        Waypoint {
            position: (row, column),
            direction,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.direction == Direction::SourceTarget
    }

    /// The grid cell occupied when a vehicle is at this waypoint. Virtual
    /// waypoints occupy nothing.
    pub fn resource(&self) -> Option<Resource> {
        (!self.is_virtual()).then(|| Resource {
            row: self.position.0,
            column: self.position.1,
        })
    }
}

impl std::fmt::Display for Waypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{},{:?})",
            self.position.0, self.position.1, self.direction
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TrainrunWaypoint {
    pub waypoint: Waypoint,
    pub scheduled_at: TimeValue,
}

pub type Trainrun = Vec<TrainrunWaypoint>;
pub type TrainrunDict = BTreeMap<VehicleId, Trainrun>;

/// The route of a trainrun, i.e. its waypoints without times.
pub fn route(trainrun: &[TrainrunWaypoint]) -> Vec<Waypoint> {
    trainrun.iter().map(|w| w.waypoint).collect()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Malfunction {
    pub time_step: TimeValue,
    pub vehicle: VehicleId,
    pub duration: TimeValue,
}

impl Malfunction {
    pub fn end(&self) -> TimeValue {
        self.time_step + self.duration
    }
}
