use std::collections::BTreeSet;

use uuid::Uuid;

use crate::aggregate::{group_by_cell, mean};
use crate::models::{CellAggregate, CellResolution, VenueCellAggregate, VenueMatch, VenueRecord};
use crate::spatial::SpatialIndexer;

const EARTH_RADIUS_KM: f64 = 6371.0088;

struct VenueSeed {
    id: u128,
    name: &'static str,
    venue_type: &'static str,
    street: &'static str,
    city: &'static str,
    zip_code: &'static str,
    latitude: f64,
    longitude: f64,
    capacity: i32,
    price_range: &'static str,
    rating: f64,
    website: Option<&'static str>,
}

const CATALOG: [VenueSeed; 8] = [
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a01,
        name: "Peace Center",
        venue_type: "Performing Arts",
        street: "300 S Main St",
        city: "Greenville",
        zip_code: "29601",
        latitude: 34.8466,
        longitude: -82.4017,
        capacity: 2100,
        price_range: "$$$",
        rating: 4.8,
        website: Some("https://www.peacecenter.org"),
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a02,
        name: "Hyatt Regency Greenville",
        venue_type: "Hotel",
        street: "220 N Main St",
        city: "Greenville",
        zip_code: "29601",
        latitude: 34.8541,
        longitude: -82.3987,
        capacity: 800,
        price_range: "$$$",
        rating: 4.4,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a03,
        name: "Greenville Convention Center",
        venue_type: "Conference Center",
        street: "1 Exposition Dr",
        city: "Greenville",
        zip_code: "29607",
        latitude: 34.8093,
        longitude: -82.3278,
        capacity: 5000,
        price_range: "$$",
        rating: 4.3,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a04,
        name: "Embassy Suites Golf Resort",
        venue_type: "Hotel",
        street: "670 Verdae Blvd",
        city: "Greenville",
        zip_code: "29607",
        latitude: 34.8145,
        longitude: -82.3315,
        capacity: 600,
        price_range: "$$$",
        rating: 4.2,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a05,
        name: "Larkin's on the River",
        venue_type: "Restaurant",
        street: "318 S Main St",
        city: "Greenville",
        zip_code: "29601",
        latitude: 34.8458,
        longitude: -82.4023,
        capacity: 200,
        price_range: "$$$$",
        rating: 4.6,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a06,
        name: "Fluor Field",
        venue_type: "Stadium",
        street: "945 S Main St",
        city: "Greenville",
        zip_code: "29601",
        latitude: 34.8418,
        longitude: -82.4078,
        capacity: 6700,
        price_range: "$$",
        rating: 4.7,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a07,
        name: "Greer Station Event Hall",
        venue_type: "Event Hall",
        street: "106 S Main St",
        city: "Greer",
        zip_code: "29650",
        latitude: 34.9373,
        longitude: -82.2270,
        capacity: 250,
        price_range: "$$",
        rating: 4.1,
        website: None,
    },
    VenueSeed {
        id: 0x6f1c2a0e_3b7d_4e21_9a55_0c1d2e3f4a08,
        name: "Heritage Park Amphitheatre",
        venue_type: "Outdoor",
        street: "861 SE Main St",
        city: "Simpsonville",
        zip_code: "29681",
        latitude: 34.7263,
        longitude: -82.2386,
        capacity: 4000,
        price_range: "$$",
        rating: 4.5,
        website: None,
    },
];

/// The fixed venue reference set, indexed with `indexer`.
pub fn catalog(indexer: &SpatialIndexer) -> Vec<VenueRecord> {
    CATALOG
        .iter()
        .map(|seed| VenueRecord {
            id: Uuid::from_u128(seed.id),
            name: seed.name.to_string(),
            venue_type: seed.venue_type.to_string(),
            street: seed.street.to_string(),
            city: seed.city.to_string(),
            state: "SC".to_string(),
            zip_code: seed.zip_code.to_string(),
            latitude: seed.latitude,
            longitude: seed.longitude,
            capacity: seed.capacity,
            price_range: seed.price_range.to_string(),
            rating: seed.rating,
            website: seed.website.map(str::to_string),
            cells: indexer
                .index(Some(seed.latitude), Some(seed.longitude))
                .ok()
                .map(|indexed| indexed.cells),
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct VenueFilter {
    pub venue_types: BTreeSet<String>,
    pub price_ranges: BTreeSet<String>,
    pub min_capacity: i32,
}

impl VenueFilter {
    pub fn matches(&self, venue: &VenueRecord) -> bool {
        (self.venue_types.is_empty() || self.venue_types.contains(&venue.venue_type))
            && (self.price_ranges.is_empty() || self.price_ranges.contains(&venue.price_range))
            && venue.capacity >= self.min_capacity
    }
}

pub fn aggregate_venues(
    venues: &[VenueRecord],
    resolution: CellResolution,
    filter: &VenueFilter,
) -> Vec<VenueCellAggregate> {
    let groups = group_by_cell(
        venues.iter().filter(|venue| filter.matches(venue)),
        resolution,
        |venue| venue.cells.as_ref(),
    );

    let mut cells: Vec<VenueCellAggregate> = groups
        .into_iter()
        .map(|(cell_id, members)| {
            let count = members.len();
            VenueCellAggregate {
                resolution,
                cell_id: cell_id.to_string(),
                venue_count: count,
                total_capacity: members.iter().map(|v| i64::from(v.capacity)).sum(),
                avg_rating: mean(members.iter().map(|v| v.rating).sum(), count),
                center_lat: mean(members.iter().map(|v| v.latitude).sum(), count),
                center_lon: mean(members.iter().map(|v| v.longitude).sum(), count),
                approximate: members
                    .iter()
                    .any(|v| v.cells.as_ref().is_some_and(|c| c.approximate)),
            }
        })
        .collect();

    cells.sort_by(|a, b| b.venue_count.cmp(&a.venue_count));
    cells
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Pair the largest donor cells with venues inside the same cell and the
/// venue nearest to the donors' centroid.
pub fn match_venues(
    donor_cells: &[CellAggregate],
    venues: &[VenueRecord],
    filter: &VenueFilter,
    limit: usize,
) -> Vec<VenueMatch> {
    let candidates: Vec<&VenueRecord> = venues.iter().filter(|venue| filter.matches(venue)).collect();

    donor_cells
        .iter()
        .take(limit)
        .map(|cell| {
            let venues_in_cell = candidates
                .iter()
                .filter(|venue| {
                    venue
                        .cells
                        .as_ref()
                        .is_some_and(|cells| cells.at(cell.resolution) == cell.cell_id)
                })
                .map(|venue| venue.name.clone())
                .collect();

            let nearest = candidates
                .iter()
                .map(|&venue| {
                    let distance = haversine_km(
                        cell.center_lat,
                        cell.center_lon,
                        venue.latitude,
                        venue.longitude,
                    );
                    (venue, distance)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));

            VenueMatch {
                cell_id: cell.cell_id.clone(),
                donor_count: cell.donor_count,
                total_annual: cell.total_annual,
                venues_in_cell,
                nearest_venue: nearest.map(|(venue, _)| venue.name.clone()),
                nearest_distance_km: nearest.map(|(_, distance)| distance),
            }
        })
        .collect()
}
