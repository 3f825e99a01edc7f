use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;

use crate::models::DonorSegment;

const MAX_DAYS_SINCE_DONATION: i64 = 730;

/// Career stage by years since graduation. Bands are disjoint and checked
/// from longest tenure down, so exactly one applies to any record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenureBand {
    Veteran,
    Senior,
    MidCareer,
    EarlyCareer,
}

impl TenureBand {
    pub fn for_tenure(tenure: i32) -> Self {
        match tenure {
            t if t >= 25 => Self::Veteran,
            t if t >= 15 => Self::Senior,
            t if t >= 5 => Self::MidCareer,
            _ => Self::EarlyCareer,
        }
    }

    /// Uniform base range for the annual gift before growth.
    pub fn base_range(self) -> (f64, f64) {
        match self {
            Self::Veteran => (500.0, 50_000.0),
            Self::Senior => (250.0, 25_000.0),
            Self::MidCareer => (100.0, 10_000.0),
            Self::EarlyCareer => (25.0, 2_500.0),
        }
    }

    pub fn growth_factor(self, tenure: i32) -> f64 {
        match self {
            Self::Veteran => 1.0 + 0.02 * f64::from(tenure - 25),
            Self::Senior => 1.0 + 0.03 * f64::from(tenure - 15),
            Self::MidCareer => 1.0 + 0.05 * f64::from(tenure - 5),
            Self::EarlyCareer => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonationProfile {
    pub annual_donation_amount: f64,
    pub cumulative_donation_amount: f64,
    pub last_donation_date: NaiveDate,
    pub donor_segment: DonorSegment,
}

pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn age_at(reference_year: i32, graduation_year: i32) -> i32 {
    reference_year - graduation_year + 22
}

pub fn model_donation<R: Rng + ?Sized>(
    rng: &mut R,
    graduation_year: i32,
    reference_date: NaiveDate,
) -> DonationProfile {
    let tenure = reference_date.year() - graduation_year;
    let band = TenureBand::for_tenure(tenure);

    let (low, high) = band.base_range();
    let annual = round_currency(rng.gen_range(low..high) * band.growth_factor(tenure));

    let multiplier = rng.gen_range(0.8..1.5);
    let cumulative = round_currency(annual * f64::from(tenure.max(1)) * multiplier).max(annual);

    let days_ago = rng.gen_range(1..=MAX_DAYS_SINCE_DONATION);
    let last_donation_date = reference_date - Duration::days(days_ago);

    DonationProfile {
        annual_donation_amount: annual,
        cumulative_donation_amount: cumulative,
        last_donation_date,
        donor_segment: DonorSegment::classify(annual),
    }
}
