use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::PricingConfig;
use crate::geo::{BoundingBox, GeoPoint};

/// Two-tier flat pricing: one price when both ends lie in the metro area,
/// another for everything else.
#[derive(Debug, Clone)]
pub struct PricingRule {
    pub within_area: Decimal,
    pub outside_area: Decimal,
    pub area: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub price: Decimal,
    pub is_within_area: bool,
}

impl PricingRule {
    pub fn quote(&self, pickup: &GeoPoint, delivery: &GeoPoint) -> Quote {
        let is_within_area = self.area.contains(pickup) && self.area.contains(delivery);
        Quote {
            price: if is_within_area {
                self.within_area
            } else {
                self.outside_area
            },
            is_within_area,
        }
    }

    /// Quote when either end could not be located.
    pub fn quote_partial(&self, pickup: Option<&GeoPoint>, delivery: Option<&GeoPoint>) -> Quote {
        match (pickup, delivery) {
            (Some(pickup), Some(delivery)) => self.quote(pickup, delivery),
            _ => Quote {
                price: self.outside_area,
                is_within_area: false,
            },
        }
    }
}

impl From<&PricingConfig> for PricingRule {
    fn from(config: &PricingConfig) -> Self {
        Self {
            within_area: config.within_metro,
            outside_area: config.outside_metro,
            area: config.metro_area,
        }
    }
}

impl Default for PricingRule {
    /// Nairobi, KES 150 inside / 300 outside.
    fn default() -> Self {
        Self {
            within_area: Decimal::from(150),
            outside_area: Decimal::from(300),
            area: BoundingBox {
                min_lat: -1.5,
                max_lat: -1.1,
                min_lng: 36.6,
                max_lng: 37.0,
            },
        }
    }
}
