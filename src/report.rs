use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::aggregate::{mean, CellAggregation};
use crate::models::{DonorOverview, DonorRecord, DonorSegment, GroupSummary, VenueMatch};

pub fn summarize_by<F>(donors: &[&DonorRecord], key: F) -> Vec<GroupSummary>
where
    F: Fn(&DonorRecord) -> String,
{
    let mut map: HashMap<String, (usize, f64)> = HashMap::new();

    for donor in donors {
        let entry = map.entry(key(donor)).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += donor.annual_donation_amount;
    }

    let mut summaries: Vec<GroupSummary> = map
        .into_iter()
        .map(|(key, (donor_count, total_annual))| GroupSummary {
            key,
            donor_count,
            total_annual,
            avg_annual: mean(total_annual, donor_count),
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_annual
            .total_cmp(&a.total_annual)
            .then_with(|| a.key.cmp(&b.key))
    });
    summaries
}

pub fn summarize_by_zip(donors: &[&DonorRecord]) -> Vec<GroupSummary> {
    summarize_by(donors, |donor| donor.zip_code.clone())
}

pub fn summarize_by_segment(donors: &[&DonorRecord]) -> Vec<GroupSummary> {
    summarize_by(donors, |donor| donor.donor_segment.to_string())
}

pub fn summarize_by_graduation_year(donors: &[&DonorRecord]) -> Vec<GroupSummary> {
    summarize_by(donors, |donor| donor.graduation_year.to_string())
}

pub fn summarize_by_major(donors: &[&DonorRecord]) -> Vec<GroupSummary> {
    summarize_by(donors, |donor| donor.major.clone())
}

pub fn overview(donors: &[&DonorRecord]) -> DonorOverview {
    let total_donors = donors.len();
    let total_annual: f64 = donors.iter().map(|d| d.annual_donation_amount).sum();
    let total_cumulative: f64 = donors.iter().map(|d| d.cumulative_donation_amount).sum();
    let major_donors = donors
        .iter()
        .filter(|d| d.donor_segment == DonorSegment::Major)
        .count();

    DonorOverview {
        total_donors,
        total_annual,
        avg_annual: mean(total_annual, total_donors),
        total_cumulative,
        avg_cumulative: mean(total_cumulative, total_donors),
        major_donors,
        major_share: mean(major_donors as f64, total_donors),
        top_zip: summarize_by_zip(donors).into_iter().next().map(|s| s.key),
    }
}

pub fn build_report(
    scope: Option<&str>,
    generated_on: NaiveDate,
    donors: &[&DonorRecord],
    aggregation: &CellAggregation,
    matches: &[VenueMatch],
) -> String {
    let overview = overview(donors);
    let zips = summarize_by_zip(donors);
    let segments = summarize_by_segment(donors);
    let years = summarize_by_graduation_year(donors);
    let majors = summarize_by_major(donors);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all donors");

    let _ = writeln!(output, "# Alumni Event Targeting Report");
    let _ = writeln!(output, "Generated {} for {}", generated_on, scope_label);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if donors.is_empty() {
        let _ = writeln!(output, "No donors match this scope.");
        return output;
    }

    let _ = writeln!(output, "- Donors: {}", overview.total_donors);
    let _ = writeln!(
        output,
        "- Annual giving: ${:.2} total, ${:.2} average",
        overview.total_annual, overview.avg_annual
    );
    let _ = writeln!(
        output,
        "- Lifetime giving: ${:.2} total, ${:.2} average",
        overview.total_cumulative, overview.avg_cumulative
    );
    let _ = writeln!(
        output,
        "- Major donors: {} ({:.1}%)",
        overview.major_donors,
        overview.major_share * 100.0
    );
    if let Some(zip) = &overview.top_zip {
        let _ = writeln!(output, "- Top zip code by annual giving: {}", zip);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Geographic Distribution");
    for summary in zips.iter().take(10) {
        let _ = writeln!(
            output,
            "- {}: {} donors, ${:.2} annual (avg ${:.2})",
            summary.key, summary.donor_count, summary.total_annual, summary.avg_annual
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Donor Segments");
    for summary in segments.iter() {
        let _ = writeln!(
            output,
            "- {}: {} donors, ${:.2} annual (avg ${:.2})",
            summary.key, summary.donor_count, summary.total_annual, summary.avg_annual
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Graduation Years");
    for summary in years.iter().take(5) {
        let _ = writeln!(
            output,
            "- {}: {} donors, ${:.2} annual",
            summary.key, summary.donor_count, summary.total_annual
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Majors");
    for summary in majors.iter().take(5) {
        let _ = writeln!(
            output,
            "- {}: {} donors, ${:.2} annual",
            summary.key, summary.donor_count, summary.total_annual
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Largest Cells ({} resolution)",
        aggregation.resolution
    );
    if aggregation.approximate() {
        let _ = writeln!(
            output,
            "Some cells come from the approximate grid; boundaries are not hexagonal."
        );
    }
    if aggregation.cells.is_empty() {
        let _ = writeln!(output, "No indexed donors in this scope.");
    } else {
        for cell in aggregation.cells.iter().take(10) {
            let _ = writeln!(
                output,
                "- {}: {} donors, ${:.2} annual, center ({:.4}, {:.4})",
                cell.cell_id, cell.donor_count, cell.total_annual, cell.center_lat, cell.center_lon
            );
        }
    }
    if aggregation.unindexed > 0 {
        let _ = writeln!(
            output,
            "{} donors have no cell (invalid coordinates).",
            aggregation.unindexed
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Venue Matches");
    if matches.is_empty() {
        let _ = writeln!(output, "No venue matches.");
    } else {
        for venue_match in matches {
            let inside = if venue_match.venues_in_cell.is_empty() {
                "none in cell".to_string()
            } else {
                venue_match.venues_in_cell.join(", ")
            };
            let nearest = match (&venue_match.nearest_venue, venue_match.nearest_distance_km) {
                (Some(name), Some(km)) => format!("{name} ({km:.1} km)"),
                _ => "n/a".to_string(),
            };
            let _ = writeln!(
                output,
                "- {} ({} donors): {}; nearest {}",
                venue_match.cell_id, venue_match.donor_count, inside, nearest
            );
        }
    }

    output
}

#[derive(serde::Serialize)]
struct DonorCsvRow<'a> {
    donor_id: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    full_name: &'a str,
    email: &'a str,
    address_id: String,
    street: &'a str,
    city: &'a str,
    state: &'a str,
    zip_code: &'a str,
    latitude: f64,
    longitude: f64,
    graduation_year: i32,
    degree: &'a str,
    major: &'a str,
    age: i32,
    annual_donation_amount: f64,
    cumulative_donation_amount: f64,
    last_donation_date: NaiveDate,
    donor_segment: &'static str,
    h3_level_7: Option<&'a str>,
    h3_level_8: Option<&'a str>,
    h3_level_9: Option<&'a str>,
    cells_approximate: bool,
}

pub fn write_donors_csv(path: &Path, donors: &[DonorRecord]) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;

    for donor in donors {
        let cells = donor.cells.as_ref();
        writer.serialize(DonorCsvRow {
            donor_id: &donor.donor_id,
            first_name: &donor.first_name,
            last_name: &donor.last_name,
            full_name: &donor.full_name,
            email: &donor.email,
            address_id: donor.address_id.to_string(),
            street: &donor.street,
            city: &donor.city,
            state: &donor.state,
            zip_code: &donor.zip_code,
            latitude: donor.latitude,
            longitude: donor.longitude,
            graduation_year: donor.graduation_year,
            degree: &donor.degree,
            major: &donor.major,
            age: donor.age,
            annual_donation_amount: donor.annual_donation_amount,
            cumulative_donation_amount: donor.cumulative_donation_amount,
            last_donation_date: donor.last_donation_date,
            donor_segment: donor.donor_segment.as_str(),
            h3_level_7: cells.map(|c| c.coarse.as_str()),
            h3_level_8: cells.map(|c| c.medium.as_str()),
            h3_level_9: cells.map(|c| c.fine.as_str()),
            cells_approximate: cells.is_some_and(|c| c.approximate),
        })?;
    }

    writer.flush()?;
    Ok(donors.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::donor;
    use crate::aggregate::{aggregate_donors, DonorFilter};
    use crate::models::CellResolution;

    fn fixture() -> Vec<DonorRecord> {
        vec![
            donor(1, "29680", Some("a"), 12_000.0),
            donor(2, "29680", Some("a"), 500.0),
            donor(3, "29650", Some("b"), 3_000.0),
            donor(4, "29601", None, 800.0),
        ]
    }

    #[test]
    fn zip_summary_orders_by_total_annual() {
        let donors = fixture();
        let refs: Vec<&DonorRecord> = donors.iter().collect();
        let summaries = summarize_by_zip(&refs);

        assert_eq!(summaries[0].key, "29680");
        assert_eq!(summaries[0].donor_count, 2);
        assert_eq!(summaries[0].total_annual, 12_500.0);
        assert_eq!(summaries[0].avg_annual, 6_250.0);
        assert_eq!(summaries[1].key, "29650");
        assert_eq!(summaries[2].key, "29601");
    }

    #[test]
    fn overview_counts_major_donors() {
        let donors = fixture();
        let refs: Vec<&DonorRecord> = donors.iter().collect();
        let overview = overview(&refs);

        assert_eq!(overview.total_donors, 4);
        assert_eq!(overview.major_donors, 1);
        assert!((overview.major_share - 0.25).abs() < 1e-9);
        assert_eq!(overview.top_zip.as_deref(), Some("29680"));
    }

    #[test]
    fn segment_and_year_summaries_cover_every_donor() {
        let donors = fixture();
        let refs: Vec<&DonorRecord> = donors.iter().collect();
        let by_segment = summarize_by_segment(&refs);
        let by_year = summarize_by_graduation_year(&refs);
        let by_major = summarize_by_major(&refs);

        for summaries in [by_segment, by_year, by_major] {
            let total: usize = summaries.iter().map(|s| s.donor_count).sum();
            assert_eq!(total, donors.len());
        }
    }

    #[test]
    fn report_includes_sections() {
        let donors = fixture();
        let refs: Vec<&DonorRecord> = donors.iter().collect();
        let aggregation = aggregate_donors(&donors, CellResolution::Medium, &DonorFilter::default());
        let matches = vec![VenueMatch {
            cell_id: "a-m".to_string(),
            donor_count: 2,
            total_annual: 12_500.0,
            venues_in_cell: vec!["Peace Center".to_string()],
            nearest_venue: Some("Peace Center".to_string()),
            nearest_distance_km: Some(0.4),
        }];
        let report = build_report(
            Some("zip 29680"),
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            &refs,
            &aggregation,
            &matches,
        );

        assert!(report.contains("# Alumni Event Targeting Report"));
        assert!(report.contains("## Geographic Distribution"));
        assert!(report.contains("## Top Majors"));
        assert!(report.contains("- Engineering: 4 donors"));
        assert!(report.contains("- Major Donor: 1 donors"));
        assert!(report.contains("- a-m: 2 donors"));
        assert!(report.contains("1 donors have no cell"));
        assert!(report.contains("Peace Center (0.4 km)"));
    }

    #[test]
    fn empty_report_says_so() {
        let aggregation = aggregate_donors(&[], CellResolution::Medium, &DonorFilter::default());
        let report = build_report(
            None,
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            &[],
            &aggregation,
            &[],
        );
        assert!(report.contains("No donors match this scope."));
    }

    #[test]
    fn csv_export_writes_header_and_blank_cells() {
        let donors = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donors.csv");

        let written = write_donors_csv(&path, &donors).unwrap();
        assert_eq!(written, 4);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "donor_id");
        assert!(headers.iter().any(|h| h == "h3_level_9"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        let fine_idx = headers.iter().position(|h| h == "h3_level_9").unwrap();
        assert_eq!(&rows[0][fine_idx], "a-f");
        assert_eq!(&rows[3][fine_idx], "");
        let segment_idx = headers.iter().position(|h| h == "donor_segment").unwrap();
        assert_eq!(&rows[0][segment_idx], "Major Donor");
    }
}
