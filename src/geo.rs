use crate::store::Refuge;

/// Rectangular inclusion test over decimal degrees, inclusive at all edges.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

/// Rough cover of Isère, Savoie and Haute-Savoie.
pub const TARGET_AREA: BoundingBox = BoundingBox {
    lat_min: 45.0,
    lat_max: 46.5,
    lng_min: 5.0,
    lng_max: 7.5,
};

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lng_min..=self.lng_max).contains(&lng)
    }

    /// Inclusion test for a directory entry. Entries without coordinates
    /// pass the filter.
    pub fn retains(&self, refuge: &Refuge) -> bool {
        match (refuge.lat, refuge.lng) {
            (Some(lat), Some(lng)) => self.contains(lat, lng),
            _ => true,
        }
    }
}
