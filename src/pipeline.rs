use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::attributes::AttributeSynthesizer;
use crate::config::AppConfig;
use crate::donations::{age_at, model_donation};
use crate::error::{PipelineError, PipelineWarning};
use crate::models::{Address, CellResolution, DonorRecord};
use crate::spatial::SpatialIndexer;
use crate::stratify::stratify;

/// Stream 0 drives stratification; record `i` draws from stream `i + 1`.
const STRATIFY_STREAM: u64 = 0;

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub seed: u64,
    pub reference_date: NaiveDate,
    pub target_count: usize,
    pub other_count: usize,
    pub donors: Vec<DonorRecord>,
    pub warnings: Vec<PipelineWarning>,
}

fn stream_rng(seed: u64, stream: u64) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

const DONOR_ID_MIN_DIGITS: usize = 6;

/// `D` plus the sequence zero-padded to the width of the largest id in the
/// run, so ids sort lexically in generation order.
pub fn donor_id(sequence: usize, total: usize) -> String {
    let width = total.to_string().len().max(DONOR_ID_MIN_DIGITS);
    format!("D{sequence:0width$}")
}

pub fn generate(
    addresses: &[Address],
    config: &AppConfig,
    indexer: &SpatialIndexer,
) -> Result<GenerationOutcome, PipelineError> {
    let generation = &config.generation;
    let seed = generation.seed.unwrap_or_else(rand::random);
    let reference_date = generation
        .reference_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let reference_year = reference_date.year();
    info!(seed, %reference_date, requested = generation.record_count, "generating donors");

    let synthesizer = AttributeSynthesizer::new(&config.attributes, &generation.email_domain)?;
    let target_zips: HashSet<String> = generation.target_zips.iter().cloned().collect();

    let sample = stratify(
        &mut stream_rng(seed, STRATIFY_STREAM),
        addresses,
        &target_zips,
        generation.record_count,
        generation.target_fraction,
    )?;
    let mut warnings = sample.warnings;

    let total = sample.addresses.len();
    let synthesized: Vec<(DonorRecord, Option<PipelineError>)> = sample
        .addresses
        .par_iter()
        .enumerate()
        .map(|(index, address)| {
            let mut rng = stream_rng(seed, index as u64 + 1);
            let attributes = synthesizer.synthesize(&mut rng);
            let donation = model_donation(&mut rng, attributes.graduation_year, reference_date);

            let (cells, problem) = match indexer.index(address.latitude, address.longitude) {
                Ok(indexed) => (Some(indexed.cells), indexed.fallback),
                Err(err) => (None, Some(err)),
            };

            let donor = DonorRecord {
                donor_id: donor_id(index + 1, total),
                first_name: attributes.first_name,
                last_name: attributes.last_name,
                full_name: attributes.full_name,
                email: attributes.email,
                address_id: address.id,
                street: address.street.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                zip_code: address.zip_code.clone(),
                latitude: address.latitude.unwrap_or_default(),
                longitude: address.longitude.unwrap_or_default(),
                graduation_year: attributes.graduation_year,
                degree: attributes.degree,
                major: attributes.major,
                age: age_at(reference_year, attributes.graduation_year),
                annual_donation_amount: donation.annual_donation_amount,
                cumulative_donation_amount: donation.cumulative_donation_amount,
                last_donation_date: donation.last_donation_date,
                donor_segment: donation.donor_segment,
                cells,
            };
            (donor, problem)
        })
        .collect();

    let mut donors = Vec::with_capacity(synthesized.len());
    let mut fallbacks: Vec<CellResolution> = Vec::new();
    for (donor, problem) in synthesized {
        match problem {
            Some(PipelineError::SpatialFunctionUnavailable { resolution, .. }) => {
                fallbacks.push(resolution)
            }
            Some(PipelineError::InvalidCoordinate { .. }) => {
                warnings.push(PipelineWarning::InvalidCoordinate {
                    address_id: donor.address_id.to_string(),
                    latitude: donor.latitude,
                    longitude: donor.longitude,
                });
            }
            Some(other) => return Err(other),
            None => {}
        }
        donors.push(donor);
    }

    for resolution in CellResolution::ALL {
        let affected_records = fallbacks.iter().filter(|r| **r == resolution).count();
        if affected_records > 0 {
            warnings.push(PipelineWarning::SpatialFunctionUnavailable {
                resolution,
                affected_records,
            });
        }
    }

    for warning in warnings.iter().filter(|w| !matches!(w, PipelineWarning::MissingData { .. })) {
        warn!(%warning, "generation warning");
    }
    info!(
        donors = donors.len(),
        target = sample.target_count,
        other = sample.other_count,
        warnings = warnings.len(),
        "donor generation complete"
    );

    Ok(GenerationOutcome {
        seed,
        reference_date,
        target_count: sample.target_count,
        other_count: sample.other_count,
        donors,
        warnings,
    })
}
