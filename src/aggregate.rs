use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{CellAggregate, CellIds, CellResolution, DonorRecord, DonorSegment};

/// Attribute predicate applied before grouping. Empty sets and `None`
/// ranges leave that attribute unconstrained.
#[derive(Debug, Clone, Default)]
pub struct DonorFilter {
    pub zip_codes: BTreeSet<String>,
    pub graduation_years: Option<(i32, i32)>,
    pub donation_range: Option<(f64, f64)>,
    pub segments: BTreeSet<DonorSegment>,
}

impl DonorFilter {
    pub fn matches(&self, donor: &DonorRecord) -> bool {
        if !self.zip_codes.is_empty() && !self.zip_codes.contains(&donor.zip_code) {
            return false;
        }
        if let Some((min, max)) = self.graduation_years {
            if donor.graduation_year < min || donor.graduation_year > max {
                return false;
            }
        }
        if let Some((min, max)) = self.donation_range {
            if donor.annual_donation_amount < min || donor.annual_donation_amount > max {
                return false;
            }
        }
        if !self.segments.is_empty() && !self.segments.contains(&donor.donor_segment) {
            return false;
        }
        true
    }

    pub fn apply<'a>(&'a self, donors: &'a [DonorRecord]) -> impl Iterator<Item = &'a DonorRecord> + 'a {
        donors.iter().filter(move |donor| self.matches(donor))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellAggregation {
    pub resolution: CellResolution,
    pub cells: Vec<CellAggregate>,
    /// Records that passed the filter.
    pub filtered: usize,
    /// Filtered records without cell ids (invalid coordinates).
    pub unindexed: usize,
}

impl CellAggregation {
    pub fn approximate(&self) -> bool {
        self.cells.iter().any(|cell| cell.approximate)
    }
}

/// Group items by their cell id at `resolution`. Items without cells are
/// left out. Keys come back in ascending order.
pub(crate) fn group_by_cell<'a, T, F>(
    items: impl IntoIterator<Item = &'a T>,
    resolution: CellResolution,
    cells_of: F,
) -> BTreeMap<&'a str, Vec<&'a T>>
where
    T: 'a,
    F: Fn(&'a T) -> Option<&'a CellIds>,
{
    let mut groups: BTreeMap<&'a str, Vec<&'a T>> = BTreeMap::new();
    for item in items {
        if let Some(cells) = cells_of(item) {
            groups.entry(cells.at(resolution)).or_default().push(item);
        }
    }
    groups
}

pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn aggregate_donors(
    donors: &[DonorRecord],
    resolution: CellResolution,
    filter: &DonorFilter,
) -> CellAggregation {
    let filtered: Vec<&DonorRecord> = filter.apply(donors).collect();
    let unindexed = filtered.iter().filter(|donor| donor.cells.is_none()).count();

    let groups = group_by_cell(filtered.iter().copied(), resolution, |donor| {
        donor.cells.as_ref()
    });

    let mut cells: Vec<CellAggregate> = groups
        .into_iter()
        .map(|(cell_id, members)| {
            let count = members.len();
            let total_annual: f64 = members.iter().map(|d| d.annual_donation_amount).sum();
            let total_cumulative: f64 = members.iter().map(|d| d.cumulative_donation_amount).sum();
            let lat_sum: f64 = members.iter().map(|d| d.latitude).sum();
            let lon_sum: f64 = members.iter().map(|d| d.longitude).sum();

            CellAggregate {
                resolution,
                cell_id: cell_id.to_string(),
                donor_count: count,
                total_annual,
                avg_annual: mean(total_annual, count),
                total_cumulative,
                avg_cumulative: mean(total_cumulative, count),
                center_lat: mean(lat_sum, count),
                center_lon: mean(lon_sum, count),
                approximate: members
                    .iter()
                    .any(|d| d.cells.as_ref().is_some_and(|c| c.approximate)),
            }
        })
        .collect();

    // Stable sort keeps ascending cell ids within equal counts.
    cells.sort_by(|a, b| b.donor_count.cmp(&a.donor_count));

    debug!(
        %resolution,
        cells = cells.len(),
        filtered = filtered.len(),
        unindexed,
        "aggregated donors by cell"
    );

    CellAggregation {
        resolution,
        cells,
        filtered: filtered.len(),
        unindexed,
    }
}
