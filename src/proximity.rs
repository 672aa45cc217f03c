use crate::aggregation::AggregatedBusState;
use crate::geo::distance_meters;
use crate::routes_catalog::RouteCatalog;
use ahash::AHashMap;
use serde::Serialize;

/// How close a user must be to a route endpoint before an alert fires.
pub const PROXIMITY_RADIUS_METERS: f64 = 400.0;
/// At most this many alerts are delivered per user, highest priority first.
pub const MAX_ALERTS: usize = 3;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProximityAlert {
    pub route_id: String,
    pub message: String,
    /// Lower is more urgent.
    pub priority: u8,
}

fn minutes_away(eta_seconds: u32) -> u32 {
    ((eta_seconds + 30) / 60).max(1)
}

/// Derive alerts for one user coordinate against the latest aggregated bus
/// state. Stateless: every call recomputes from the inputs alone.
///
/// Per route, the start-stop check wins over the terminus check and at most
/// one message fires. Output is sorted by priority and capped at
/// [`MAX_ALERTS`] across all routes.
pub fn alerts_for_user(
    user_lat: f64,
    user_lng: f64,
    catalog: &RouteCatalog,
    latest: &AHashMap<(String, String), AggregatedBusState>,
) -> Vec<ProximityAlert> {
    let mut alerts: Vec<ProximityAlert> = Vec::new();

    for route in catalog.routes() {
        let Some(start) = route.start_coord() else {
            continue;
        };
        let Some(terminus) = route.terminus_coord() else {
            continue;
        };

        let buses: Vec<&AggregatedBusState> = latest
            .values()
            .filter(|b| b.route_id == route.id)
            .collect();
        let sharer_count: usize = buses.iter().map(|b| b.sharer_count).sum();
        // Soonest arrival across this route's tracked buses
        let best_eta = buses.iter().filter_map(|b| b.eta_seconds).min();

        let dist_to_start = distance_meters(user_lat, user_lng, start[0], start[1]);
        let dist_to_terminus = distance_meters(user_lat, user_lng, terminus[0], terminus[1]);

        if dist_to_start <= PROXIMITY_RADIUS_METERS {
            if buses.is_empty() {
                alerts.push(ProximityAlert {
                    route_id: route.id.clone(),
                    message: format!(
                        "You are near the {} stop, but no bus is being tracked right now.",
                        route.name
                    ),
                    priority: 2,
                });
            } else {
                alerts.push(ProximityAlert {
                    route_id: route.id.clone(),
                    message: format!(
                        "A bus on {} is being tracked near you by {} sharer(s).",
                        route.name, sharer_count
                    ),
                    priority: 1,
                });
            }
        } else if dist_to_terminus <= PROXIMITY_RADIUS_METERS {
            match best_eta {
                Some(eta) => {
                    alerts.push(ProximityAlert {
                        route_id: route.id.clone(),
                        message: format!(
                            "The {} bus is about {} min from campus.",
                            route.name,
                            minutes_away(eta)
                        ),
                        priority: 1,
                    });
                }
                None => {
                    alerts.push(ProximityAlert {
                        route_id: route.id.clone(),
                        message: format!("No bus is currently tracked on {}.", route.name),
                        priority: 2,
                    });
                }
            }
        }
    }

    alerts.sort_by_key(|a| a.priority);
    alerts.truncate(MAX_ALERTS);
    alerts
}
