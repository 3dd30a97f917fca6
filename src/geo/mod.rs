use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Axis-aligned latitude/longitude rectangle. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundingBox, GeoPoint};

    const NAIROBI: BoundingBox = BoundingBox {
        min_lat: -1.5,
        max_lat: -1.1,
        min_lng: 36.6,
        max_lng: 37.0,
    };

    #[test]
    fn city_centre_is_inside() {
        let cbd = GeoPoint {
            lat: -1.2864,
            lng: 36.8172,
        };
        assert!(NAIROBI.contains(&cbd));
    }

    #[test]
    fn edges_are_inclusive() {
        let corner = GeoPoint {
            lat: -1.5,
            lng: 37.0,
        };
        assert!(NAIROBI.contains(&corner));
    }

    #[test]
    fn mombasa_is_outside() {
        let mombasa = GeoPoint {
            lat: -4.0435,
            lng: 39.6682,
        };
        assert!(!NAIROBI.contains(&mombasa));
    }

    #[test]
    fn nan_coordinates_are_outside() {
        let broken = GeoPoint {
            lat: f64::NAN,
            lng: 36.8,
        };
        assert!(!NAIROBI.contains(&broken));
    }
}
