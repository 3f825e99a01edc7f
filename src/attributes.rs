use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::config::{AttributeTables, WeightedChoice};
use crate::error::ConfigError;

pub const FIRST_GRADUATION_YEAR: i32 = 1990;
pub const LAST_GRADUATION_YEAR: i32 = 2024;

/// Graduation-year buckets and their share of the population.
const GRADUATION_BUCKETS: [(i32, i32, u32); 4] = [
    (1990, 1999, 20),
    (2000, 2009, 30),
    (2010, 2019, 30),
    (2020, LAST_GRADUATION_YEAR, 20),
];

#[derive(Debug, Clone)]
struct WeightedTable {
    values: Vec<String>,
    index: WeightedIndex<u32>,
}

impl WeightedTable {
    fn new(field: &str, choices: &[WeightedChoice]) -> Result<Self, ConfigError> {
        let index = WeightedIndex::new(choices.iter().map(|choice| choice.weight))
            .map_err(|e| ConfigError::validation(field, e.to_string()))?;
        Ok(Self {
            values: choices.iter().map(|choice| choice.value.clone()).collect(),
            index,
        })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.values[self.index.sample(rng)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlumniAttributes {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub major: String,
    pub degree: String,
    pub graduation_year: i32,
}

/// Draws categorical alumni attributes from weighted tables.
#[derive(Debug, Clone)]
pub struct AttributeSynthesizer {
    first_names: WeightedTable,
    last_names: WeightedTable,
    majors: WeightedTable,
    degrees: WeightedTable,
    graduation_buckets: WeightedIndex<u32>,
    email_domain: String,
}

impl AttributeSynthesizer {
    pub fn new(tables: &AttributeTables, email_domain: &str) -> Result<Self, ConfigError> {
        let graduation_buckets = WeightedIndex::new(GRADUATION_BUCKETS.iter().map(|b| b.2))
            .map_err(|e| ConfigError::validation("graduation_buckets", e.to_string()))?;

        Ok(Self {
            first_names: WeightedTable::new("attributes.first_names", &tables.first_names)?,
            last_names: WeightedTable::new("attributes.last_names", &tables.last_names)?,
            majors: WeightedTable::new("attributes.majors", &tables.majors)?,
            degrees: WeightedTable::new("attributes.degrees", &tables.degrees)?,
            graduation_buckets,
            email_domain: email_domain.to_string(),
        })
    }

    pub fn synthesize<R: Rng + ?Sized>(&self, rng: &mut R) -> AlumniAttributes {
        let first_name = self.first_names.sample(rng).to_string();
        let last_name = self.last_names.sample(rng).to_string();
        let major = self.majors.sample(rng).to_string();
        let degree = self.degrees.sample(rng).to_string();
        let graduation_year = self.graduation_year(rng);

        AlumniAttributes {
            full_name: format!("{first_name} {last_name}"),
            email: email_for(&first_name, &last_name, &self.email_domain),
            first_name,
            last_name,
            major,
            degree,
            graduation_year,
        }
    }

    /// One weighted bucket choice, then a uniform year inside that bucket.
    pub fn graduation_year<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        let (start, end, _) = GRADUATION_BUCKETS[self.graduation_buckets.sample(rng)];
        rng.gen_range(start..=end)
    }
}

pub fn email_for(first_name: &str, last_name: &str, domain: &str) -> String {
    let local = |name: &str| -> String {
        name.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };
    format!("{}.{}@{}", local(first_name), local(last_name), domain)
}
