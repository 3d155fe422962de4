use chrono::{Datelike, NaiveDate};
use tracing::info;

use super::YearOutcome;
use crate::error::ExtractError;

/// This year and last.
pub fn default_years(today: NaiveDate) -> Vec<i32> {
    let year = today.year();
    vec![year, year - 1]
}

/// Drive `process_year` over `years` in order, summing rows and collecting
/// failed keys. Any failed key fails the whole extract once every year ran.
pub fn run_extract<F>(name: &str, years: &[i32], mut process_year: F) -> Result<usize, ExtractError>
where
    F: FnMut(i32) -> YearOutcome,
{
    let mut total_rows = 0;
    let mut failed = Vec::new();

    for &year in years {
        info!("Running {} for {}", name, year);
        let outcome = process_year(year);
        total_rows += outcome.rows;
        failed.extend(outcome.failed);
    }

    info!("Loaded {} rows for {}", total_rows, name);
    if failed.is_empty() {
        Ok(total_rows)
    } else {
        Err(ExtractError::ItemsFailed {
            name: name.to_string(),
            total_rows,
            failed,
        })
    }
}
