use crate::geo::distance_meters;
use crate::routes_catalog::RouteCatalog;
use crate::share_registry::ShareSession;
use ahash::AHashMap;
use serde::Serialize;

/// Reports within this distance of a cluster seed are folded together.
pub const CLUSTER_RADIUS_METERS: f64 = 20.0;
/// Clusters past this count (in formation order) are dropped from the final
/// position, bounding per-bus work and ignoring extreme outlier groups.
pub const MAX_CLUSTERS_PER_BUS: usize = 10;
/// Assumed average shuttle speed for the ETA, 30 km/h.
pub const ASSUMED_SPEED_MPS: f64 = 8.33;

/// One spatial cluster of concurrent reports. Recomputed from scratch every
/// tick, there is no cluster identity across ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub lat: f64,
    pub lng: f64,
    pub member_count: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AggregatedBusState {
    pub route_id: String,
    pub bus_number: String,
    pub lat: f64,
    pub lng: f64,
    pub sharer_count: usize,
    pub eta_seconds: Option<u32>,
}

/// Greedy single-pass clustering: each unassigned session seeds a cluster,
/// then every remaining unassigned session within 20 m of that seed joins
/// it. Deterministic for a fixed input order only.
fn cluster_positions(positions: &[(f64, f64)]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut assigned = vec![false; positions.len()];

    for i in 0..positions.len() {
        if assigned[i] {
            continue;
        }

        let (seed_lat, seed_lng) = positions[i];
        assigned[i] = true;

        let mut lat_sum = seed_lat;
        let mut lng_sum = seed_lng;
        let mut count = 1usize;

        for j in (i + 1)..positions.len() {
            if assigned[j] {
                continue;
            }
            let (lat, lng) = positions[j];
            if distance_meters(seed_lat, seed_lng, lat, lng) < CLUSTER_RADIUS_METERS {
                lat_sum += lat;
                lng_sum += lng;
                count += 1;
                assigned[j] = true;
            }
        }

        clusters.push(Cluster {
            lat: lat_sum / count as f64,
            lng: lng_sum / count as f64,
            member_count: count,
        });
    }

    clusters
}

fn eta_to_terminus(lat: f64, lng: f64, catalog: &RouteCatalog, route_id: &str) -> Option<u32> {
    let terminus = catalog.get(route_id)?.terminus_coord()?;
    let dist = distance_meters(lat, lng, terminus[0], terminus[1]);
    Some((dist / ASSUMED_SPEED_MPS).round() as u32)
}

/// One aggregation pass over a registry snapshot. Sessions that have never
/// reported a position are excluded; (route, bus) groups with no positioned
/// session are simply absent from the output.
pub fn aggregate(
    sessions: &[ShareSession],
    catalog: &RouteCatalog,
) -> AHashMap<(String, String), AggregatedBusState> {
    let mut grouped: AHashMap<(String, String), Vec<(f64, f64)>> = AHashMap::new();

    for session in sessions {
        if let Some(position) = session.position {
            grouped
                .entry((session.route_id.clone(), session.bus_number.clone()))
                .or_default()
                .push(position);
        }
    }

    let mut output: AHashMap<(String, String), AggregatedBusState> = AHashMap::new();

    for ((route_id, bus_number), positions) in grouped {
        let clusters = cluster_positions(&positions);
        let retained = &clusters[..clusters.len().min(MAX_CLUSTERS_PER_BUS)];
        if retained.is_empty() {
            continue;
        }

        // Each retained cluster contributes once, regardless of its size
        let lat = retained.iter().map(|c| c.lat).sum::<f64>() / retained.len() as f64;
        let lng = retained.iter().map(|c| c.lng).sum::<f64>() / retained.len() as f64;

        let eta_seconds = eta_to_terminus(lat, lng, catalog, &route_id);

        output.insert(
            (route_id.clone(), bus_number.clone()),
            AggregatedBusState {
                route_id,
                bus_number,
                lat,
                lng,
                sharer_count: positions.len(),
                eta_seconds,
            },
        );
    }

    output
}
