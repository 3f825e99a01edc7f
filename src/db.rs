use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::{Address, CellIds, DonorRecord, DonorSegment, VenueRecord};
use crate::spatial::SpatialIndexer;
use crate::venues;

const DONOR_INSERT_CHUNK: usize = 1000;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upsert the venue reference set and a handful of sample addresses.
pub async fn seed(pool: &PgPool, indexer: &SpatialIndexer) -> anyhow::Result<(usize, usize)> {
    let venues = venues::catalog(indexer);
    for venue in &venues {
        let cells = venue.cells.as_ref();
        sqlx::query(
            r#"
            INSERT INTO alumni_targeting.venues
            (id, venue_name, venue_type, street, city, state, zip_code, latitude, longitude,
             capacity, price_range, rating, website, h3_level_7, h3_level_8, h3_level_9,
             cells_approximate)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE
            SET venue_name = EXCLUDED.venue_name,
                capacity = EXCLUDED.capacity,
                price_range = EXCLUDED.price_range,
                rating = EXCLUDED.rating,
                h3_level_7 = EXCLUDED.h3_level_7,
                h3_level_8 = EXCLUDED.h3_level_8,
                h3_level_9 = EXCLUDED.h3_level_9,
                cells_approximate = EXCLUDED.cells_approximate
            "#,
        )
        .bind(venue.id)
        .bind(&venue.name)
        .bind(&venue.venue_type)
        .bind(&venue.street)
        .bind(&venue.city)
        .bind(&venue.state)
        .bind(&venue.zip_code)
        .bind(venue.latitude)
        .bind(venue.longitude)
        .bind(venue.capacity)
        .bind(&venue.price_range)
        .bind(venue.rating)
        .bind(&venue.website)
        .bind(cells.map(|c| c.coarse.clone()))
        .bind(cells.map(|c| c.medium.clone()))
        .bind(cells.map(|c| c.fine.clone()))
        .bind(cells.is_some_and(|c| c.approximate))
        .execute(pool)
        .await?;
    }

    let addresses = vec![
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c01", "104 Weatherstone Ln", "Simpsonville", "29680", 34.7068, -82.2534),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c02", "211 Harrison Bridge Rd", "Simpsonville", "29680", 34.7342, -82.2701),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c03", "18 Fairview St", "Simpsonville", "29681", 34.7407, -82.2481),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c04", "402 Scuffletown Rd", "Simpsonville", "29681", 34.7563, -82.2207),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c05", "77 Trade St", "Greer", "29650", 34.9382, -82.2268),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c06", "15 Pelham Rd", "Greer", "29650", 34.8961, -82.2436),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c07", "1200 Woodruff Rd", "Greenville", "29607", 34.8261, -82.3013),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c08", "30 Haywood Rd", "Greenville", "29607", 34.8414, -82.3330),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c09", "12 Augusta St", "Greenville", "29601", 34.8422, -82.4005),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c10", "500 E North St", "Greenville", "29601", 34.8560, -82.3905),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c11", "9 Wade Hampton Blvd", "Greenville", "29609", 34.8717, -82.3760),
        ("5c3e8a52-1f0b-4b7e-8d7c-2a1f6e9b0c12", "220 Main St", "Travelers Rest", "29690", 34.9676, -82.4435),
    ];

    for (id, street, city, zip_code, latitude, longitude) in &addresses {
        sqlx::query(
            r#"
            INSERT INTO alumni_targeting.addresses
            (id, street, city, state, zip_code, latitude, longitude)
            VALUES ($1, $2, $3, 'SC', $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(street)
        .bind(city)
        .bind(zip_code)
        .bind(latitude)
        .bind(longitude)
        .execute(pool)
        .await?;
    }

    Ok((venues.len(), addresses.len()))
}

pub async fn import_addresses_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        id: Option<Uuid>,
        street: String,
        city: String,
        state: String,
        zip_code: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let result = sqlx::query(
            r#"
            INSERT INTO alumni_targeting.addresses
            (id, street, city, state, zip_code, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id.unwrap_or_else(Uuid::new_v4))
        .bind(&row.street)
        .bind(&row.city)
        .bind(&row.state)
        .bind(&row.zip_code)
        .bind(row.latitude)
        .bind(row.longitude)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_addresses(pool: &PgPool) -> anyhow::Result<Vec<Address>> {
    let rows = sqlx::query(
        "SELECT id, street, city, state, zip_code, latitude, longitude \
         FROM alumni_targeting.addresses ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Address {
            id: row.get("id"),
            street: row.get("street"),
            city: row.get("city"),
            state: row.get("state"),
            zip_code: row.get("zip_code"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
        })
        .collect())
}

/// Seeds span the full u64 range, wider than BIGINT, so they are stored as
/// decimal text and read back with `str::parse::<u64>`.
fn seed_column(seed: u64) -> String {
    seed.to_string()
}

/// Swap the whole donor table for a freshly generated population.
pub async fn replace_donors(
    pool: &PgPool,
    donors: &[DonorRecord],
    generation_seed: u64,
) -> anyhow::Result<()> {
    let seed = seed_column(generation_seed);
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM alumni_targeting.donors")
        .execute(&mut *tx)
        .await?;

    for chunk in donors.chunks(DONOR_INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO alumni_targeting.donors \
             (donor_id, first_name, last_name, full_name, email, address_id, street, city, \
              state, zip_code, latitude, longitude, graduation_year, degree, major, age, \
              annual_donation_amount, cumulative_donation_amount, last_donation_date, \
              donor_segment, h3_level_7, h3_level_8, h3_level_9, cells_approximate, \
              generation_seed) ",
        );
        builder.push_values(chunk, |mut row, donor| {
            let cells = donor.cells.as_ref();
            row.push_bind(&donor.donor_id)
                .push_bind(&donor.first_name)
                .push_bind(&donor.last_name)
                .push_bind(&donor.full_name)
                .push_bind(&donor.email)
                .push_bind(donor.address_id)
                .push_bind(&donor.street)
                .push_bind(&donor.city)
                .push_bind(&donor.state)
                .push_bind(&donor.zip_code)
                .push_bind(donor.latitude)
                .push_bind(donor.longitude)
                .push_bind(donor.graduation_year)
                .push_bind(&donor.degree)
                .push_bind(&donor.major)
                .push_bind(donor.age)
                .push_bind(donor.annual_donation_amount)
                .push_bind(donor.cumulative_donation_amount)
                .push_bind(donor.last_donation_date)
                .push_bind(donor.donor_segment.as_str())
                .push_bind(cells.map(|c| c.coarse.clone()))
                .push_bind(cells.map(|c| c.medium.clone()))
                .push_bind(cells.map(|c| c.fine.clone()))
                .push_bind(cells.is_some_and(|c| c.approximate))
                .push_bind(&seed);
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

fn cells_from_row(row: &PgRow) -> Option<CellIds> {
    let coarse: Option<String> = row.get("h3_level_7");
    let medium: Option<String> = row.get("h3_level_8");
    let fine: Option<String> = row.get("h3_level_9");
    Some(CellIds {
        coarse: coarse?,
        medium: medium?,
        fine: fine?,
        approximate: row.get("cells_approximate"),
    })
}

pub async fn fetch_donors(pool: &PgPool) -> anyhow::Result<Vec<DonorRecord>> {
    let rows = sqlx::query(
        "SELECT donor_id, first_name, last_name, full_name, email, address_id, street, city, \
         state, zip_code, latitude, longitude, graduation_year, degree, major, age, \
         annual_donation_amount, cumulative_donation_amount, last_donation_date, donor_segment, \
         h3_level_7, h3_level_8, h3_level_9, cells_approximate \
         FROM alumni_targeting.donors ORDER BY donor_id",
    )
    .fetch_all(pool)
    .await?;

    let mut donors = Vec::with_capacity(rows.len());
    for row in rows {
        let segment: String = row.get("donor_segment");
        let donor_segment = segment
            .parse::<DonorSegment>()
            .map_err(anyhow::Error::msg)?;
        donors.push(DonorRecord {
            donor_id: row.get("donor_id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            address_id: row.get("address_id"),
            street: row.get("street"),
            city: row.get("city"),
            state: row.get("state"),
            zip_code: row.get("zip_code"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            graduation_year: row.get("graduation_year"),
            degree: row.get("degree"),
            major: row.get("major"),
            age: row.get("age"),
            annual_donation_amount: row.get("annual_donation_amount"),
            cumulative_donation_amount: row.get("cumulative_donation_amount"),
            last_donation_date: row.get("last_donation_date"),
            donor_segment,
            cells: cells_from_row(&row),
        });
    }

    Ok(donors)
}

pub async fn fetch_venues(pool: &PgPool) -> anyhow::Result<Vec<VenueRecord>> {
    let rows = sqlx::query(
        "SELECT id, venue_name, venue_type, street, city, state, zip_code, latitude, longitude, \
         capacity, price_range, rating, website, h3_level_7, h3_level_8, h3_level_9, \
         cells_approximate \
         FROM alumni_targeting.venues ORDER BY venue_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| VenueRecord {
            id: row.get("id"),
            name: row.get("venue_name"),
            venue_type: row.get("venue_type"),
            street: row.get("street"),
            city: row.get("city"),
            state: row.get("state"),
            zip_code: row.get("zip_code"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            capacity: row.get("capacity"),
            price_range: row.get("price_range"),
            rating: row.get("rating"),
            website: row.get("website"),
            cells: cells_from_row(row),
        })
        .collect())
}
