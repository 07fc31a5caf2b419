use serde::{Deserialize, Serialize};

use crate::{parser::ParseError, problem::TimeValue};

/// Search heuristics the solver may be asked to enable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum SolverHeuristic {
    /// Prefer keeping the baseline order of vehicles on each resource.
    Seq,
}

/// Tunables of the rescheduling pipeline. Passed explicitly to every builder
/// that needs them.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReschedulingConfig {
    /// Time steps a resource stays blocked after a vehicle leaves it.
    pub release_time: TimeValue,
    /// Caps each window at `earliest + max_window_size_from_earliest`.
    pub max_window_size_from_earliest: Option<TimeValue>,
    pub weight_route_change: i64,
    pub weight_lateness_seconds: i64,
    pub delay_model_resolution: TimeValue,
    pub heuristics: Vec<SolverHeuristic>,
    pub propagate_partial: bool,
    /// Move the deadline of rescheduling problems back by the malfunction
    /// duration.
    pub stretch_latest_arrival_by_malfunction: bool,
}

impl Default for ReschedulingConfig {
    fn default() -> Self {
        ReschedulingConfig {
            release_time: 1,
            max_window_size_from_earliest: None,
            weight_route_change: 30,
            weight_lateness_seconds: 1,
            delay_model_resolution: 1,
            heuristics: Vec::new(),
            propagate_partial: true,
            stretch_latest_arrival_by_malfunction: false,
        }
    }
}

impl ReschedulingConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ParseError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// A negative release time would invert occupation intervals.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.release_time < 0 {
            return Err(ParseError::InvalidConfig(format!(
                "release_time {} is negative",
                self.release_time
            )));
        }
        if let Some(window) = self.max_window_size_from_earliest {
            if window < 0 {
                return Err(ParseError::InvalidConfig(format!(
                    "max_window_size_from_earliest {} is negative",
                    window
                )));
            }
        }
        Ok(())
    }

    pub fn from_file(path: &str) -> Result<Self, ParseError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn missing_fields_take_defaults() {
        let c = ReschedulingConfig::from_json_str(
            r#"{"max_window_size_from_earliest": 60, "heuristics": ["Seq"]}"#,
        )
        .unwrap();
        assert_eq!(c.release_time, 1);
        assert_eq!(c.max_window_size_from_earliest, Some(60));
        assert_eq!(c.heuristics, vec![SolverHeuristic::Seq]);
        assert_eq!(c.weight_route_change, 30);
    }

    #[test]
    pub fn rejects_negative_release_time() {
        let err = ReschedulingConfig::from_json_str(r#"{"release_time": -1}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidConfig(_)));
        assert_eq!(
            err.to_string(),
            "invalid configuration: release_time -1 is negative"
        );
        assert!(ReschedulingConfig::from_json_str(r#"{"release_time": 0}"#).is_ok());

        let mut config = ReschedulingConfig::default();
        config.max_window_size_from_earliest = Some(-5);
        assert!(config.validate().is_err());
    }

    #[test]
    pub fn rejects_garbage() {
        assert!(ReschedulingConfig::from_json_str(r#"{"release_time": "soon"}"#).is_err());
    }
}
