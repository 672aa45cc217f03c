use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A shuttle route as supplied by the static catalog. Coordinates are
/// ordered [lat, lng] pairs from the remote stop to the university terminus.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RouteDescriptor {
    pub id: String,
    pub name: String,
    pub color: String,
    pub coords: Vec<[f64; 2]>,
}

impl RouteDescriptor {
    /// First coordinate of the path, the remote stop riders board at.
    pub fn start_coord(&self) -> Option<[f64; 2]> {
        self.coords.first().copied()
    }

    /// Last coordinate of the path, the terminus the ETA is computed against.
    pub fn terminus_coord(&self) -> Option<[f64; 2]> {
        self.coords.last().copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("could not read route catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse route catalog json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("route catalog contains no routes")]
    Empty,
    #[error("route {0} has no coordinates")]
    RouteWithoutPath(String),
    #[error("duplicate route id {0}")]
    DuplicateRouteId(String),
}

/// Immutable for the process lifetime. Loaded once at startup, shared behind
/// an Arc between the http endpoint and the coordinator.
#[derive(Clone, Debug)]
pub struct RouteCatalog {
    routes: Vec<RouteDescriptor>,
    by_id: AHashMap<String, usize>,
}

impl RouteCatalog {
    pub fn new(routes: Vec<RouteDescriptor>) -> Result<RouteCatalog, CatalogError> {
        if routes.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_id: AHashMap<String, usize> = AHashMap::new();

        for (i, route) in routes.iter().enumerate() {
            if route.coords.is_empty() {
                return Err(CatalogError::RouteWithoutPath(route.id.clone()));
            }
            if by_id.insert(route.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateRouteId(route.id.clone()));
            }
        }

        Ok(RouteCatalog { routes, by_id })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<RouteCatalog, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let routes: Vec<RouteDescriptor> = serde_json::from_str(&raw)?;
        RouteCatalog::new(routes)
    }

    /// Default catalog of the three UIU shuttle routes.
    pub fn builtin() -> RouteCatalog {
        let routes = vec![
            RouteDescriptor {
                id: "kuril".to_string(),
                name: "Kuril → UIU".to_string(),
                color: "#FF0000".to_string(),
                coords: vec![
                    [23.820610868952375, 90.41957754437615],
                    [23.8251069967925, 90.42221383440064],
                    [23.830168129045163, 90.44791889543795],
                    [23.80396154887558, 90.45033218988371],
                    [23.80300039928186, 90.45003441862734],
                    [23.801919331835172, 90.44902257435265],
                    [23.801375977699635, 90.44858014148011],
                    [23.79711779787257, 90.44939124046348],
                    [23.797319850153688, 90.45023416569579],
                ],
            },
            RouteDescriptor {
                id: "aftab".to_string(),
                name: "Aftab Nagar → UIU".to_string(),
                color: "#008000".to_string(),
                coords: vec![
                    [23.767884498265367, 90.4258368692018],
                    [23.76405310289068, 90.4347952022164],
                    [23.76559756281525, 90.43753126655618],
                    [23.76447066141081, 90.45266923672],
                    [23.777247678885225, 90.45387573530141],
                    [23.776956890520168, 90.45774226691996],
                    [23.777060198172006, 90.45826532501356],
                    [23.787563611387714, 90.45830511961553],
                    [23.787744267955404, 90.45716978278523],
                    [23.78783821231135, 90.45689697151754],
                    [23.79605305306039, 90.45542726000716],
                    [23.79457946576137, 90.4499346634726],
                    [23.79711779787257, 90.44939124046348],
                    [23.797319850153688, 90.45023416569579],
                ],
            },
            RouteDescriptor {
                id: "notun".to_string(),
                name: "Notun Bazar → UIU".to_string(),
                color: "#0000FF".to_string(),
                coords: vec![
                    [23.797895742733147, 90.4247491033753],
                    [23.798118807771946, 90.4273954334202],
                    [23.79854761578896, 90.4317223024376],
                    [23.79873842031536, 90.43561955367018],
                    [23.800285967657903, 90.44870354597657],
                    [23.79711779787257, 90.44939124046348],
                    [23.797319850153688, 90.45023416569579],
                ],
            },
        ];

        RouteCatalog::new(routes).expect("builtin catalog is valid")
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn get(&self, route_id: &str) -> Option<&RouteDescriptor> {
        self.by_id.get(route_id).map(|i| &self.routes[*i])
    }
}
