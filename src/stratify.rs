use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineWarning};
use crate::models::{Address, Stratum};

#[derive(Debug, Clone)]
pub struct StratifiedSample {
    pub addresses: Vec<Address>,
    pub target_count: usize,
    pub other_count: usize,
    pub warnings: Vec<PipelineWarning>,
}

/// Requested sizes for the target and other strata: `floor(n * f)` and the
/// remainder, which equals `ceil(n * (1 - f))` without the rounding drift of
/// computing `1 - f` in floating point.
pub fn stratum_sizes(total: usize, target_fraction: f64) -> (usize, usize) {
    let fraction = target_fraction.clamp(0.0, 1.0);
    let exact = total as f64 * fraction;
    // Products within a few ulps of an integer are that integer (0.29 * 100).
    let nearest = exact.round();
    let target = if (exact - nearest).abs() <= exact * 4.0 * f64::EPSILON {
        nearest
    } else {
        exact.floor()
    };
    let target = (target as usize).min(total);
    (target, total - target)
}

pub fn stratify<R: Rng + ?Sized>(
    rng: &mut R,
    source: &[Address],
    target_zips: &HashSet<String>,
    total: usize,
    target_fraction: f64,
) -> Result<StratifiedSample, PipelineError> {
    let (target_requested, other_requested) = stratum_sizes(total, target_fraction);

    let (target_pool, other_pool): (Vec<&Address>, Vec<&Address>) = source
        .iter()
        .filter(|address| address.coordinates().is_some())
        .partition(|address| target_zips.contains(&address.zip_code));

    if target_pool.is_empty() && other_pool.is_empty() {
        return Err(PipelineError::InsufficientSourceData { requested: total });
    }

    let mut warnings = Vec::new();
    let target = draw(rng, &target_pool, target_requested, Stratum::Target, &mut warnings);
    let other = draw(rng, &other_pool, other_requested, Stratum::Other, &mut warnings);

    let target_count = target.len();
    let other_count = other.len();
    if target_count + other_count == 0 {
        return Err(PipelineError::InsufficientSourceData { requested: total });
    }

    let mut addresses = target;
    addresses.extend(other);
    addresses.shuffle(rng);

    info!(
        target = target_count,
        other = other_count,
        eligible = target_pool.len() + other_pool.len(),
        "stratified address sample"
    );

    Ok(StratifiedSample {
        addresses,
        target_count,
        other_count,
        warnings,
    })
}

fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    pool: &[&Address],
    requested: usize,
    stratum: Stratum,
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<Address> {
    if pool.len() < requested {
        let warning = PipelineWarning::MissingData {
            stratum,
            requested,
            available: pool.len(),
        };
        warn!(%warning, "stratum under-filled");
        warnings.push(warning);
    }

    pool.choose_multiple(rng, requested)
        .map(|address| (*address).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use uuid::Uuid;

    fn address(zip: &str, index: usize) -> Address {
        Address {
            id: Uuid::new_v4(),
            street: format!("{index} Main St"),
            city: "Greenville".to_string(),
            state: "SC".to_string(),
            zip_code: zip.to_string(),
            latitude: Some(34.80 + index as f64 * 1e-5),
            longitude: Some(-82.35 - index as f64 * 1e-5),
        }
    }

    fn source(target: usize, other: usize) -> Vec<Address> {
        let mut addresses: Vec<Address> = (0..target).map(|i| address("29680", i)).collect();
        addresses.extend((0..other).map(|i| address("29601", i)));
        addresses
    }

    fn targets() -> HashSet<String> {
        HashSet::from(["29680".to_string()])
    }

    #[test]
    fn sizes_split_exactly() {
        assert_eq!(stratum_sizes(10_000, 0.70), (7000, 3000));
        assert_eq!(stratum_sizes(10, 0.35), (3, 7));
        assert_eq!(stratum_sizes(5, 1.0), (5, 0));
        assert_eq!(stratum_sizes(5, 0.0), (0, 5));
        assert_eq!(stratum_sizes(100, 0.29), (29, 71));
        assert_eq!(stratum_sizes(3, 1.0 / 3.0), (1, 2));
    }

    #[test]
    fn near_integer_products_below_the_boundary_still_floor() {
        assert_eq!(stratum_sizes(3, 0.333_333_333_3), (0, 3));
        assert_eq!(stratum_sizes(1_000, 0.699_999_999_9), (699, 301));
    }

    #[test]
    fn fills_both_strata_when_source_is_sufficient() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let source = source(8000, 4000);
        let sample = stratify(&mut rng, &source, &targets(), 10_000, 0.70).unwrap();

        assert_eq!(sample.target_count, 7000);
        assert_eq!(sample.other_count, 3000);
        assert!(sample.warnings.is_empty());
        let in_target = sample
            .addresses
            .iter()
            .filter(|address| address.zip_code == "29680")
            .count();
        assert_eq!(in_target, 7000);
        assert_eq!(sample.addresses.len() - in_target, 3000);

        let unique: HashSet<Uuid> = sample.addresses.iter().map(|address| address.id).collect();
        assert_eq!(unique.len(), 10_000);
    }

    #[test]
    fn under_filled_stratum_is_flagged_with_shortfall() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let source = source(50, 100);
        let sample = stratify(&mut rng, &source, &targets(), 100, 0.70).unwrap();

        assert_eq!(sample.target_count, 50);
        assert_eq!(sample.other_count, 30);
        assert_eq!(sample.warnings.len(), 1);
        assert_eq!(
            sample.warnings[0],
            PipelineWarning::MissingData {
                stratum: Stratum::Target,
                requested: 70,
                available: 50,
            }
        );
        assert_eq!(sample.warnings[0].shortfall(), 20);
    }

    #[test]
    fn addresses_without_coordinates_are_not_eligible() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let mut source = source(10, 0);
        for address in source.iter_mut().take(4) {
            address.longitude = None;
        }
        let sample = stratify(&mut rng, &source, &targets(), 10, 1.0).unwrap();
        assert_eq!(sample.target_count, 6);
        assert!(sample.addresses.iter().all(|a| a.coordinates().is_some()));
    }

    #[test]
    fn empty_source_is_insufficient() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let err = stratify(&mut rng, &[], &targets(), 10, 0.7).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_SOURCE_DATA");
    }

    #[test]
    fn output_order_is_shuffled() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let source = source(500, 500);
        let sample = stratify(&mut rng, &source, &targets(), 1000, 0.5).unwrap();
        let first_half_targets = sample.addresses[..500]
            .iter()
            .filter(|address| address.zip_code == "29680")
            .count();
        assert!(first_half_targets > 150 && first_half_targets < 350);
    }

    #[test]
    fn same_seed_same_sample() {
        let source = source(300, 300);
        let a = stratify(&mut ChaCha20Rng::seed_from_u64(9), &source, &targets(), 200, 0.7).unwrap();
        let b = stratify(&mut ChaCha20Rng::seed_from_u64(9), &source, &targets(), 200, 0.7).unwrap();
        assert_eq!(a.addresses, b.addresses);
    }
}
