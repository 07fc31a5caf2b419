use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    problem::{TimeValue, VehicleId, Waypoint},
    topology::Topology,
};

/// What the solver is told about one waypoint of one vehicle.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum WaypointConstraint {
    /// The waypoint must be visited at exactly this time.
    Visit(TimeValue),
    /// The waypoint may be skipped; if visited, not before this time.
    EarliestOnly(TimeValue),
    Banned,
    Window {
        earliest: TimeValue,
        latest: TimeValue,
    },
}

impl WaypointConstraint {
    pub fn earliest(&self) -> Option<TimeValue> {
        match self {
            WaypointConstraint::Visit(t) | WaypointConstraint::EarliestOnly(t) => Some(*t),
            WaypointConstraint::Window { earliest, .. } => Some(*earliest),
            WaypointConstraint::Banned => None,
        }
    }

    pub fn latest(&self) -> Option<TimeValue> {
        match self {
            WaypointConstraint::Visit(t) => Some(*t),
            WaypointConstraint::Window { latest, .. } => Some(*latest),
            WaypointConstraint::EarliestOnly(_) | WaypointConstraint::Banned => None,
        }
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, WaypointConstraint::Banned)
    }

    /// Whether visiting the waypoint at `t` is allowed.
    pub fn admits(&self, t: TimeValue) -> bool {
        match *self {
            WaypointConstraint::Visit(v) => t == v,
            WaypointConstraint::EarliestOnly(e) => t >= e,
            WaypointConstraint::Window { earliest, latest } => earliest <= t && t <= latest,
            WaypointConstraint::Banned => false,
        }
    }
}

/// Freeze facts for one vehicle, the input to propagation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Freeze {
    pub visit: BTreeMap<Waypoint, TimeValue>,
    pub earliest: BTreeMap<Waypoint, TimeValue>,
    pub latest: BTreeMap<Waypoint, TimeValue>,
    pub banned: BTreeSet<Waypoint>,
}

impl Freeze {
    pub fn force(&mut self, w: Waypoint, t: TimeValue) {
        self.visit.insert(w, t);
    }

    pub fn bound_earliest(&mut self, w: Waypoint, t: TimeValue) {
        let e = self.earliest.entry(w).or_insert(t);
        *e = (*e).max(t);
    }

    pub fn bound_latest(&mut self, w: Waypoint, t: TimeValue) {
        let l = self.latest.entry(w).or_insert(t);
        *l = (*l).min(t);
    }

    pub fn ban(&mut self, w: Waypoint) {
        self.banned.insert(w);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum InfeasibleReason {
    #[display(fmt = "earliest {} > latest {} at {}", earliest, latest, waypoint)]
    ContradictoryWindow {
        waypoint: Waypoint,
        earliest: TimeValue,
        latest: TimeValue,
    },
    #[display(fmt = "no feasible route from {}", _0)]
    NoRoute(Waypoint),
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ConstraintError {
    #[display(fmt = "infeasible constraints for vehicle {}: {}", vehicle, reason)]
    Infeasible {
        vehicle: VehicleId,
        reason: InfeasibleReason,
    },
}

impl std::error::Error for ConstraintError {}

impl ConstraintError {
    pub fn vehicle(&self) -> VehicleId {
        match self {
            ConstraintError::Infeasible { vehicle, .. } => *vehicle,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub waypoint: Waypoint,
    pub constraint: WaypointConstraint,
}

/// One [WaypointConstraint] per waypoint of a vehicle's topology.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ConstraintEntry>", into = "Vec<ConstraintEntry>")]
pub struct RouteDagConstraints {
    constraints: BTreeMap<Waypoint, WaypointConstraint>,
}

impl From<Vec<ConstraintEntry>> for RouteDagConstraints {
    fn from(entries: Vec<ConstraintEntry>) -> Self {
        RouteDagConstraints {
            constraints: entries
                .into_iter()
                .map(|e| (e.waypoint, e.constraint))
                .collect(),
        }
    }
}

impl From<RouteDagConstraints> for Vec<ConstraintEntry> {
    fn from(c: RouteDagConstraints) -> Self {
        c.constraints
            .into_iter()
            .map(|(waypoint, constraint)| ConstraintEntry {
                waypoint,
                constraint,
            })
            .collect()
    }
}

impl RouteDagConstraints {
    pub fn get(&self, w: &Waypoint) -> Option<&WaypointConstraint> {
        self.constraints.get(w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Waypoint, &WaypointConstraint)> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn earliest(&self, w: &Waypoint) -> Option<TimeValue> {
        self.get(w).and_then(WaypointConstraint::earliest)
    }

    pub fn latest(&self, w: &Waypoint) -> Option<TimeValue> {
        self.get(w).and_then(WaypointConstraint::latest)
    }

    pub fn visits(&self) -> impl Iterator<Item = (Waypoint, TimeValue)> + '_ {
        self.constraints.iter().filter_map(|(w, c)| match c {
            WaypointConstraint::Visit(t) => Some((*w, *t)),
            _ => None,
        })
    }

    pub fn earliest_only(&self) -> impl Iterator<Item = (Waypoint, TimeValue)> + '_ {
        self.constraints.iter().filter_map(|(w, c)| match c {
            WaypointConstraint::EarliestOnly(t) => Some((*w, *t)),
            _ => None,
        })
    }

    pub fn banned(&self) -> impl Iterator<Item = Waypoint> + '_ {
        self.constraints
            .iter()
            .filter(|(_, c)| c.is_banned())
            .map(|(w, _)| *w)
    }

    pub fn windows(&self) -> impl Iterator<Item = (Waypoint, TimeValue, TimeValue)> + '_ {
        self.constraints.iter().filter_map(|(w, c)| match c {
            WaypointConstraint::Window { earliest, latest } => Some((*w, *earliest, *latest)),
            _ => None,
        })
    }
}

/// Merges the propagation results and the freeze facts of one vehicle into
/// its constraint record.
pub fn assemble(
    vehicle: VehicleId,
    topo: &Topology,
    freeze: &Freeze,
    earliest: &BTreeMap<Waypoint, TimeValue>,
    latest: &BTreeMap<Waypoint, TimeValue>,
) -> Result<RouteDagConstraints, ConstraintError> {
    let _p = hprof::enter("assemble constraints");
    let infeasible = |reason| ConstraintError::Infeasible { vehicle, reason };

    let mut constraints = BTreeMap::new();
    for w in topo.topological_order() {
        let constraint = if freeze.banned.contains(&w) {
            WaypointConstraint::Banned
        } else if let Some(t) = freeze.visit.get(&w) {
            WaypointConstraint::Visit(*t)
        } else {
            match (earliest.get(&w), latest.get(&w)) {
                (Some(&e), Some(&l)) if e > l => {
                    return Err(infeasible(InfeasibleReason::ContradictoryWindow {
                        waypoint: w,
                        earliest: e,
                        latest: l,
                    }));
                }
                (Some(&e), Some(_))
                    if freeze.earliest.contains_key(&w) && !freeze.latest.contains_key(&w) =>
                {
                    WaypointConstraint::EarliestOnly(e)
                }
                (Some(&earliest), Some(&latest)) => WaypointConstraint::Window { earliest, latest },
                _ => WaypointConstraint::Banned,
            }
        };
        constraints.insert(w, constraint);
    }

    let source = topo.source();
    let source_banned = constraints[&source].is_banned();
    let all_sinks_banned = topo.sinks().all(|s| constraints[&s].is_banned());
    if source_banned || all_sinks_banned {
        debug!("vehicle {} has no feasible route left", vehicle);
        return Err(infeasible(InfeasibleReason::NoRoute(source)));
    }

    Ok(RouteDagConstraints { constraints })
}
