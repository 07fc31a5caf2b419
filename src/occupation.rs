use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{
    interval::LeftClosedInterval,
    problem::{Direction, Resource, TimeValue, TrainrunDict, VehicleId},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(Serialize, Deserialize)]
#[display(fmt = "vehicle {} on {} during {}", vehicle, resource, interval)]
pub struct ResourceOccupation {
    pub interval: LeftClosedInterval,
    pub vehicle: VehicleId,
    pub resource: Resource,
    pub direction: Direction,
}

/// Two vehicles holding the same resource at the same time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
#[derive(Serialize, Deserialize)]
#[display(fmt = "conflict on {}: {} and {}", resource, first, second)]
pub struct ResourceConflict {
    pub resource: Resource,
    pub first: ResourceOccupation,
    pub second: ResourceOccupation,
}

/// An occupation that one schedule has and another has not.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
#[derive(Serialize, Deserialize)]
#[display(fmt = "({}, {}, {})", vehicle, resource, interval)]
pub struct OccupationChange {
    pub vehicle: VehicleId,
    pub resource: Resource,
    pub interval: LeftClosedInterval,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleAsResourceOccupations {
    pub per_resource: BTreeMap<Resource, Vec<ResourceOccupation>>,
    pub per_vehicle: BTreeMap<VehicleId, Vec<ResourceOccupation>>,
    pub per_vehicle_and_time_step: BTreeMap<(VehicleId, TimeValue), Vec<ResourceOccupation>>,
}

/// The k-th waypoint of a trainrun holds its resource from its own time until
/// the time of waypoint k+1 plus `release_time`. The last waypoint and virtual
/// waypoints hold nothing.
pub fn extract_resource_occupations(
    schedule: &TrainrunDict,
    release_time: TimeValue,
) -> ScheduleAsResourceOccupations {
    let _p = hprof::enter("extract occupations");
    let mut occupations = ScheduleAsResourceOccupations::default();

    for (vehicle, trainrun) in schedule.iter() {
        let list = occupations.per_vehicle.entry(*vehicle).or_default();
        for (here, next) in trainrun.iter().zip(trainrun.iter().skip(1)) {
            let resource = match here.waypoint.resource() {
                Some(r) => r,
                None => continue,
            };
            let occ = ResourceOccupation {
                interval: LeftClosedInterval::new(here.scheduled_at, next.scheduled_at + release_time),
                vehicle: *vehicle,
                resource,
                direction: here.waypoint.direction,
            };
            trace!("{}", occ);
            list.push(occ);
        }
        list.sort();
    }

    for occ in occupations.per_vehicle.values().flatten() {
        occupations
            .per_resource
            .entry(occ.resource)
            .or_default()
            .push(*occ);
        for t in occ.interval.time_steps() {
            occupations
                .per_vehicle_and_time_step
                .entry((occ.vehicle, t))
                .or_default()
                .push(*occ);
        }
    }
    for list in occupations.per_resource.values_mut() {
        list.sort();
    }

    occupations
}

impl ScheduleAsResourceOccupations {
    pub fn active(&self, vehicle: VehicleId, t: TimeValue) -> &[ResourceOccupation] {
        self.per_vehicle_and_time_step
            .get(&(vehicle, t))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every pair of overlapping occupations of different vehicles on the same
    /// resource.
    pub fn conflicts(&self) -> Vec<ResourceConflict> {
        let mut conflicts = Vec::new();
        for (resource, list) in self.per_resource.iter() {
            for (i, a) in list.iter().enumerate() {
                for b in list[i + 1..]
                    .iter()
                    .take_while(|b| b.interval.from < a.interval.to)
                {
                    if a.vehicle != b.vehicle && a.interval.overlap(&b.interval) {
                        conflicts.push(ResourceConflict {
                            resource: *resource,
                            first: *a,
                            second: *b,
                        });
                    }
                }
            }
        }
        if !conflicts.is_empty() {
            debug!("{} resource conflicts", conflicts.len());
        }
        conflicts
    }

    fn intervals_by_vehicle_and_resource(
        &self,
    ) -> BTreeMap<(VehicleId, Resource), Vec<LeftClosedInterval>> {
        let mut map: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for occ in self.per_vehicle.values().flatten() {
            map.entry((occ.vehicle, occ.resource))
                .or_default()
                .push(occ.interval);
        }
        map
    }
}

/// For every (vehicle, resource) whose occupation intervals differ between the
/// two schedules: the intervals of `candidate` that `baseline` does not have.
/// If `candidate` only drops intervals, the dropped baseline intervals.
pub fn diff_occupations(
    baseline: &ScheduleAsResourceOccupations,
    candidate: &ScheduleAsResourceOccupations,
) -> Vec<OccupationChange> {
    let _p = hprof::enter("diff occupations");
    let base = baseline.intervals_by_vehicle_and_resource();
    let cand = candidate.intervals_by_vehicle_and_resource();
    let keys: BTreeSet<_> = base.keys().chain(cand.keys()).copied().collect();

    let mut changes = Vec::new();
    for (vehicle, resource) in keys {
        let b = base.get(&(vehicle, resource)).map(|v| v.as_slice()).unwrap_or(&[]);
        let c = cand.get(&(vehicle, resource)).map(|v| v.as_slice()).unwrap_or(&[]);
        if b == c {
            continue;
        }
        let mut reported: Vec<LeftClosedInterval> =
            c.iter().filter(|i| !b.contains(i)).copied().collect();
        if reported.is_empty() {
            reported = b.iter().filter(|i| !c.contains(i)).copied().collect();
        }
        changes.extend(reported.into_iter().map(|interval| OccupationChange {
            vehicle,
            resource,
            interval,
        }));
    }
    changes
}

/// Vehicles with at least one reported change.
pub fn changed_vehicles(changes: &[OccupationChange]) -> BTreeSet<VehicleId> {
    changes.iter().map(|c| c.vehicle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Trainrun, TrainrunWaypoint, Waypoint};

    fn run(stops: &[(i32, i32, TimeValue)]) -> Trainrun {
        stops
            .iter()
            .map(|&(row, column, t)| TrainrunWaypoint {
                waypoint: Waypoint::new(row, column, Direction::East),
                scheduled_at: t,
            })
            .collect()
    }

    const X: (i32, i32) = (0, 0);
    const A: (i32, i32) = (1, 0);
    const B: (i32, i32) = (2, 0);

    fn shared_start(v1_delay: TimeValue) -> TrainrunDict {
        let mut s = TrainrunDict::new();
        s.insert(VehicleId(0), run(&[(X.0, X.1, 0), (A.0, A.1, 1)]));
        s.insert(
            VehicleId(1),
            run(&[(X.0, X.1, v1_delay), (B.0, B.1, v1_delay + 1)]),
        );
        s
    }

    #[test]
    pub fn release_time_extends_occupation() {
        let occ = extract_resource_occupations(&shared_start(0), 1);
        let v0 = &occ.per_vehicle[&VehicleId(0)];
        assert_eq!(v0.len(), 1);
        assert_eq!(v0[0].interval, LeftClosedInterval::new(0, 2));
        assert_eq!(v0[0].resource, Resource { row: 0, column: 0 });
        assert_eq!(occ.per_resource[&Resource { row: 0, column: 0 }].len(), 2);
        assert!(!occ.per_resource.contains_key(&Resource { row: 1, column: 0 }));
    }

    #[test]
    pub fn time_step_index() {
        let occ = extract_resource_occupations(&shared_start(2), 1);
        assert_eq!(occ.active(VehicleId(1), 1).len(), 0);
        assert_eq!(occ.active(VehicleId(1), 2).len(), 1);
        assert_eq!(occ.active(VehicleId(1), 3).len(), 1);
        assert_eq!(occ.active(VehicleId(1), 4).len(), 0);
        assert_eq!(occ.active(VehicleId(0), 1)[0].vehicle, VehicleId(0));
    }

    #[test]
    pub fn virtual_waypoints_hold_nothing() {
        let mut s = TrainrunDict::new();
        s.insert(
            VehicleId(0),
            vec![
                TrainrunWaypoint {
                    waypoint: Waypoint::new(0, 0, Direction::SourceTarget),
                    scheduled_at: 0,
                },
                TrainrunWaypoint {
                    waypoint: Waypoint::new(0, 0, Direction::East),
                    scheduled_at: 1,
                },
                TrainrunWaypoint {
                    waypoint: Waypoint::new(0, 1, Direction::East),
                    scheduled_at: 2,
                },
            ],
        );
        let occ = extract_resource_occupations(&s, 1);
        assert_eq!(occ.per_vehicle[&VehicleId(0)].len(), 1);
        assert_eq!(
            occ.per_vehicle[&VehicleId(0)][0].interval,
            LeftClosedInterval::new(1, 3)
        );
    }

    #[test]
    pub fn conflict_resolved_by_reschedule() {
        let baseline = extract_resource_occupations(&shared_start(0), 1);
        let conflicts = baseline.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resource, Resource { row: 0, column: 0 });

        let candidate = extract_resource_occupations(&shared_start(2), 1);
        assert!(candidate.conflicts().is_empty());

        let changes = diff_occupations(&baseline, &candidate);
        assert_eq!(
            changes,
            vec![OccupationChange {
                vehicle: VehicleId(1),
                resource: Resource { row: 0, column: 0 },
                interval: LeftClosedInterval::new(2, 4),
            }]
        );
        assert_eq!(
            changed_vehicles(&changes).into_iter().collect::<Vec<_>>(),
            vec![VehicleId(1)]
        );
    }

    #[test]
    pub fn release_time_makes_followers_conflict() {
        // Vehicle 1 enters X the moment vehicle 0 leaves it.
        let s = shared_start(1);
        assert_eq!(extract_resource_occupations(&s, 0).conflicts().len(), 0);
        assert_eq!(extract_resource_occupations(&s, 1).conflicts().len(), 1);
    }

    #[test]
    pub fn abandoned_resource_reports_baseline_intervals() {
        let baseline = shared_start(0);
        let mut candidate = baseline.clone();
        candidate.insert(VehicleId(1), run(&[(B.0, B.1, 0), (A.0, A.1, 1)]));
        let changes = diff_occupations(
            &extract_resource_occupations(&baseline, 1),
            &extract_resource_occupations(&candidate, 1),
        );
        assert_eq!(
            changes,
            vec![
                OccupationChange {
                    vehicle: VehicleId(1),
                    resource: Resource { row: 0, column: 0 },
                    interval: LeftClosedInterval::new(0, 2),
                },
                OccupationChange {
                    vehicle: VehicleId(1),
                    resource: Resource { row: 2, column: 0 },
                    interval: LeftClosedInterval::new(0, 2),
                },
            ]
        );
    }

    #[test]
    pub fn dropped_revisit_is_reported() {
        const Y: (i32, i32) = (0, 1);
        const Z: (i32, i32) = (0, 2);
        let mut baseline = TrainrunDict::new();
        baseline.insert(
            VehicleId(0),
            run(&[(X.0, X.1, 0), (Y.0, Y.1, 1), (X.0, X.1, 2), (Z.0, Z.1, 3)]),
        );
        let mut candidate = TrainrunDict::new();
        candidate.insert(
            VehicleId(0),
            run(&[(X.0, X.1, 0), (Y.0, Y.1, 1), (Z.0, Z.1, 2)]),
        );
        let changes = diff_occupations(
            &extract_resource_occupations(&baseline, 1),
            &extract_resource_occupations(&candidate, 1),
        );
        assert_eq!(
            changes,
            vec![OccupationChange {
                vehicle: VehicleId(0),
                resource: Resource { row: 0, column: 0 },
                interval: LeftClosedInterval::new(2, 4),
            }]
        );
    }

    #[test]
    pub fn identical_schedules_have_no_diff() {
        let occ = extract_resource_occupations(&shared_start(3), 1);
        assert!(diff_occupations(&occ, &occ).is_empty());
    }
}
