use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub id: Uuid,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Address {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stratum {
    Target,
    Other,
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => f.write_str("target"),
            Self::Other => f.write_str("other"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CellResolution {
    Coarse,
    Medium,
    Fine,
}

impl CellResolution {
    pub const ALL: [CellResolution; 3] = [Self::Coarse, Self::Medium, Self::Fine];

    /// H3 level backing this resolution.
    pub fn level(self) -> u8 {
        match self {
            Self::Coarse => 7,
            Self::Medium => 8,
            Self::Fine => 9,
        }
    }
}

impl fmt::Display for CellResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coarse => f.write_str("coarse"),
            Self::Medium => f.write_str("medium"),
            Self::Fine => f.write_str("fine"),
        }
    }
}

/// One cell id per resolution, all drawn from the same grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellIds {
    pub coarse: String,
    pub medium: String,
    pub fine: String,
    pub approximate: bool,
}

impl CellIds {
    pub fn at(&self, resolution: CellResolution) -> &str {
        match resolution {
            CellResolution::Coarse => &self.coarse,
            CellResolution::Medium => &self.medium,
            CellResolution::Fine => &self.fine,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum DonorSegment {
    #[serde(rename = "Major Donor")]
    #[value(name = "major")]
    Major,
    #[serde(rename = "Mid-Level Donor")]
    #[value(name = "mid-level")]
    MidLevel,
    #[serde(rename = "Annual Donor")]
    #[value(name = "annual")]
    Annual,
}

impl DonorSegment {
    pub const MAJOR_THRESHOLD: f64 = 10_000.0;
    pub const MID_LEVEL_THRESHOLD: f64 = 1_000.0;

    pub fn classify(annual_donation: f64) -> Self {
        if annual_donation >= Self::MAJOR_THRESHOLD {
            Self::Major
        } else if annual_donation >= Self::MID_LEVEL_THRESHOLD {
            Self::MidLevel
        } else {
            Self::Annual
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Major => "Major Donor",
            Self::MidLevel => "Mid-Level Donor",
            Self::Annual => "Annual Donor",
        }
    }
}

impl fmt::Display for DonorSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonorSegment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Major Donor" => Ok(Self::Major),
            "Mid-Level Donor" => Ok(Self::MidLevel),
            "Annual Donor" => Ok(Self::Annual),
            other => Err(format!("unknown donor segment {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonorRecord {
    pub donor_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub address_id: Uuid,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub graduation_year: i32,
    pub degree: String,
    pub major: String,
    pub age: i32,
    pub annual_donation_amount: f64,
    pub cumulative_donation_amount: f64,
    pub last_donation_date: NaiveDate,
    pub donor_segment: DonorSegment,
    pub cells: Option<CellIds>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueRecord {
    pub id: Uuid,
    pub name: String,
    pub venue_type: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: i32,
    pub price_range: String,
    pub rating: f64,
    pub website: Option<String>,
    pub cells: Option<CellIds>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellAggregate {
    pub resolution: CellResolution,
    pub cell_id: String,
    pub donor_count: usize,
    pub total_annual: f64,
    pub avg_annual: f64,
    pub total_cumulative: f64,
    pub avg_cumulative: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    pub approximate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueCellAggregate {
    pub resolution: CellResolution,
    pub cell_id: String,
    pub venue_count: usize,
    pub total_capacity: i64,
    pub avg_rating: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    pub approximate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub donor_count: usize,
    pub total_annual: f64,
    pub avg_annual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorOverview {
    pub total_donors: usize,
    pub total_annual: f64,
    pub avg_annual: f64,
    pub total_cumulative: f64,
    pub avg_cumulative: f64,
    pub major_donors: usize,
    pub major_share: f64,
    pub top_zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueMatch {
    pub cell_id: String,
    pub donor_count: usize,
    pub total_annual: f64,
    pub venues_in_cell: Vec<String>,
    pub nearest_venue: Option<String>,
    pub nearest_distance_km: Option<f64>,
}
