use crate::error::DispatchError;
use crate::geo;
use crate::model::{Coordinate, RouteResult};
use crate::registry::ResponderDirectory;
use std::sync::Arc;

/// Offset applied to the straight-line midpoint so the drawn path bends.
const MIDPOINT_OFFSET: Coordinate = Coordinate::new(0.001, -0.002);

pub const DEFAULT_SPEED_KMH: f64 = 12.0;

pub trait RoutePlanner: Send + Sync {
    fn plan(&self, responder_id: &str, destination: &str) -> Result<RouteResult, DispatchError>;
}

/// Straight great-circle estimate at a fixed travel speed.
#[derive(Clone)]
pub struct GreatCircleRoutePlanner {
    directory: Arc<dyn ResponderDirectory>,
    speed_kmh: f64,
}

impl GreatCircleRoutePlanner {
    pub fn new(directory: Arc<dyn ResponderDirectory>) -> Self {
        Self::with_speed(directory, DEFAULT_SPEED_KMH)
    }

    pub fn with_speed(directory: Arc<dyn ResponderDirectory>, speed_kmh: f64) -> Self {
        let speed_kmh = if speed_kmh.is_finite() && speed_kmh > 0.0 {
            speed_kmh
        } else {
            DEFAULT_SPEED_KMH
        };
        Self {
            directory,
            speed_kmh,
        }
    }
}

impl RoutePlanner for GreatCircleRoutePlanner {
    fn plan(&self, responder_id: &str, destination: &str) -> Result<RouteResult, DispatchError> {
        let responder = self
            .directory
            .responder(responder_id)
            .ok_or_else(|| DispatchError::UnknownResponder(responder_id.to_string()))?;
        let target = self
            .directory
            .location(destination)
            .ok_or_else(|| DispatchError::UnknownLocation(destination.to_string()))?;

        let start = responder.position;
        let distance_m = geo::distance_m(start, target);
        let eta_minutes = eta_minutes(distance_m, self.speed_kmh);
        let heading = geo::compass_point(geo::bearing_deg(start, target));

        Ok(RouteResult {
            route: format!(
                "Head {heading} for {} to reach {destination}.",
                geo::format_distance(distance_m)
            ),
            eta: format_eta(eta_minutes),
            eta_minutes,
            distance_m,
            polyline: polyline(start, target),
        })
    }
}

pub fn eta_minutes(distance_m: f64, speed_kmh: f64) -> u32 {
    let meters_per_minute = speed_kmh * 1000.0 / 60.0;
    let minutes = (distance_m / meters_per_minute).ceil();
    (minutes as u32).max(1)
}

pub fn format_eta(minutes: u32) -> String {
    if minutes == 1 {
        "1 minute".into()
    } else {
        format!("{minutes} minutes")
    }
}

fn polyline(start: Coordinate, end: Coordinate) -> Vec<Coordinate> {
    let mid = Coordinate::new(
        (start.lat + end.lat) / 2.0 + MIDPOINT_OFFSET.lat,
        (start.lng + end.lng) / 2.0 + MIDPOINT_OFFSET.lng,
    );
    vec![start, mid, end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticDirectory;

    fn planner() -> (Arc<StaticDirectory>, GreatCircleRoutePlanner) {
        let dir = Arc::new(StaticDirectory::seeded());
        let planner = GreatCircleRoutePlanner::new(dir.clone());
        (dir, planner)
    }

    #[test]
    fn polyline_runs_from_responder_to_destination() {
        let (dir, planner) = planner();
        for responder in dir.responders() {
            for loc in dir.locations() {
                let result = planner.plan(&responder.id, &loc.name).expect("plan");
                assert!(result.polyline.len() >= 3);
                assert_eq!(result.polyline.first(), Some(&responder.position));
                assert_eq!(result.polyline.last(), Some(&loc.position));
            }
        }
    }

    #[test]
    fn midpoint_is_offset_from_straight_line() {
        let (_dir, planner) = planner();
        let result = planner.plan("security-01", "Ghat 5").expect("plan");
        let (a, b) = (result.polyline[0], result.polyline[2]);
        let straight = Coordinate::new((a.lat + b.lat) / 2.0, (a.lng + b.lng) / 2.0);
        assert_ne!(result.polyline[1], straight);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (_dir, planner) = planner();
        assert!(matches!(
            planner.plan("medic-99", "Ghat 5"),
            Err(DispatchError::UnknownResponder(id)) if id == "medic-99"
        ));
        assert!(matches!(
            planner.plan("medic-01", "Nonexistent Ghat"),
            Err(DispatchError::UnknownLocation(name)) if name == "Nonexistent Ghat"
        ));
    }

    #[test]
    fn eta_is_deterministic_and_grows_with_distance() {
        assert_eq!(eta_minutes(0.0, 12.0), 1);
        assert_eq!(eta_minutes(200.0, 12.0), 1);
        assert_eq!(eta_minutes(201.0, 12.0), 2);
        assert!(eta_minutes(5_000.0, 12.0) > eta_minutes(1_000.0, 12.0));

        let (_dir, planner) = planner();
        let a = planner.plan("medic-01", "Market Area").expect("plan");
        let b = planner.plan("medic-01", "Market Area").expect("plan");
        assert_eq!(a, b);
        assert_eq!(a.eta, format_eta(a.eta_minutes));
    }

    #[test]
    fn invalid_speed_falls_back_to_default() {
        let dir = Arc::new(StaticDirectory::seeded());
        let planner = GreatCircleRoutePlanner::with_speed(dir, 0.0);
        assert_eq!(planner.speed_kmh, DEFAULT_SPEED_KMH);
    }
}
