use derive_more::{Display, From};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    generators::Infrastructure,
    problem::{Malfunction, TrainrunDict},
};

#[derive(Debug, Display, From)]
pub enum ParseError {
    #[display(fmt = "i/o error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "invalid json: {}", _0)]
    Json(serde_json::Error),
    #[display(fmt = "instance has no {}", _0)]
    #[from(ignore)]
    Missing(&'static str),
    #[display(fmt = "invalid configuration: {}", _0)]
    #[from(ignore)]
    InvalidConfig(String),
}

impl std::error::Error for ParseError {}

/// An infrastructure with, depending on the use, a baseline schedule, a
/// malfunction and the full reschedule solving it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub infrastructure: Infrastructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<TrainrunDict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malfunction: Option<Malfunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_reschedule: Option<TrainrunDict>,
}

impl Instance {
    pub fn schedule(&self) -> Result<&TrainrunDict, ParseError> {
        self.schedule.as_ref().ok_or(ParseError::Missing("schedule"))
    }

    pub fn malfunction(&self) -> Result<&Malfunction, ParseError> {
        self.malfunction.as_ref().ok_or(ParseError::Missing("malfunction"))
    }

    pub fn full_reschedule(&self) -> Result<&TrainrunDict, ParseError> {
        self.full_reschedule
            .as_ref()
            .ok_or(ParseError::Missing("full_reschedule"))
    }
}

pub fn parse_instance(s: &str) -> Result<Instance, ParseError> {
    let _p = hprof::enter("parse instance");
    let instance: Instance = serde_json::from_str(s)?;
    debug!(
        "instance with {} vehicles, horizon {}",
        instance.infrastructure.vehicles.len(),
        instance.infrastructure.max_episode_steps
    );
    Ok(instance)
}

pub fn read_instance(path: &str) -> Result<Instance, ParseError> {
    let contents = std::fs::read_to_string(path)?;
    parse_instance(&contents)
}

pub fn read_trainruns(path: &str) -> Result<TrainrunDict, ParseError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Direction, VehicleId, Waypoint};

    const INSTANCE: &str = r#"{
        "infrastructure": {
            "max_episode_steps": 10,
            "vehicles": {
                "0": {
                    "topology": {
                        "edges": [
                            {"from": {"position": [0, 0], "direction": "East"},
                             "to": {"position": [0, 1], "direction": "East"},
                             "min_travel_time": 2}
                        ]
                    },
                    "earliest_departure": 3
                }
            }
        },
        "malfunction": {"time_step": 4, "vehicle": 0, "duration": 2}
    }"#;

    #[test]
    pub fn reads_instance() {
        let instance = parse_instance(INSTANCE).unwrap();
        let v0 = &instance.infrastructure.vehicles[&VehicleId(0)];
        assert_eq!(v0.earliest_departure, 3);
        assert_eq!(v0.topology.source(), Waypoint::new(0, 0, Direction::East));
        assert_eq!(
            v0.topology.min_travel_time(
                &Waypoint::new(0, 0, Direction::East),
                &Waypoint::new(0, 1, Direction::East)
            ),
            Some(2)
        );
        assert_eq!(instance.malfunction().unwrap().end(), 6);
        assert!(matches!(instance.schedule(), Err(ParseError::Missing("schedule"))));
    }

    #[test]
    pub fn topology_errors_surface_as_json_errors() {
        let cyclic = INSTANCE.replace(
            r#""edges": ["#,
            r#""edges": [
                {"from": {"position": [0, 1], "direction": "East"},
                 "to": {"position": [0, 0], "direction": "East"},
                 "min_travel_time": 1},"#,
        );
        let err = parse_instance(&cyclic).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
        assert!(err.to_string().contains("cycle"));
    }
}
