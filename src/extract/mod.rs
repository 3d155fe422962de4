pub mod domestic;
mod items;
pub mod lookup;
pub mod metadata;
pub mod runner;
pub mod snapshot;
pub mod worldwide;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::error;

use crate::error::ExtractError;
use crate::fetch::Fetcher;
use crate::html;
use crate::settings::Settings;
use crate::store::dataset::{self, Dataset};
use crate::store::{Frame, PartitionStore};

/// Handles one pipeline invocation works with, opened and dropped by the caller.
pub struct ExtractContext<'a> {
    pub fetcher: &'a Fetcher,
    pub store: &'a PartitionStore,
    pub settings: &'a Settings,
    pub ledger: Option<&'a Connection>,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Scrapes the site directly.
    Independent,
    /// Reads the release-id lookup to know what to scrape.
    Dependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtractKind {
    WorldwideBoxOffice,
    ReleaseIdLookup,
    ReleaseMetadata,
    ReleaseDomestic,
    ReleaseWorldwideSnapshot,
}

/// Rows written and keys that failed for one year of one extract.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct YearOutcome {
    pub rows: usize,
    pub failed: Vec<String>,
}

impl ExtractKind {
    pub const ALL: [ExtractKind; 5] = [
        ExtractKind::WorldwideBoxOffice,
        ExtractKind::ReleaseIdLookup,
        ExtractKind::ReleaseMetadata,
        ExtractKind::ReleaseDomestic,
        ExtractKind::ReleaseWorldwideSnapshot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtractKind::WorldwideBoxOffice => "worldwide_box_office",
            ExtractKind::ReleaseIdLookup => "release_id_lookup",
            ExtractKind::ReleaseMetadata => "release_metadata",
            ExtractKind::ReleaseDomestic => "release_domestic",
            ExtractKind::ReleaseWorldwideSnapshot => "release_worldwide_snapshot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.name()).collect()
    }

    pub fn tier(self) -> Tier {
        match self {
            ExtractKind::WorldwideBoxOffice | ExtractKind::ReleaseIdLookup => Tier::Independent,
            _ => Tier::Dependent,
        }
    }

    pub fn of_tier(tier: Tier) -> Vec<ExtractKind> {
        Self::ALL.into_iter().filter(|k| k.tier() == tier).collect()
    }

    pub fn dataset(self) -> &'static Dataset {
        match self {
            ExtractKind::WorldwideBoxOffice => &dataset::WORLDWIDE_BOX_OFFICE,
            ExtractKind::ReleaseIdLookup => &dataset::RELEASE_ID_LOOKUP,
            ExtractKind::ReleaseMetadata => &dataset::RELEASE_METADATA,
            ExtractKind::ReleaseDomestic => &dataset::RELEASE_DOMESTIC,
            ExtractKind::ReleaseWorldwideSnapshot => &dataset::WORLDWIDE_SNAPSHOT,
        }
    }

    pub fn process_year(self, ctx: &ExtractContext, year: i32) -> YearOutcome {
        match self {
            ExtractKind::WorldwideBoxOffice => worldwide::process_year(ctx, year),
            ExtractKind::ReleaseIdLookup => lookup::process_year(ctx, year),
            ExtractKind::ReleaseMetadata => metadata::process_year(ctx, year),
            ExtractKind::ReleaseDomestic => domestic::process_year(ctx, year),
            ExtractKind::ReleaseWorldwideSnapshot => snapshot::process_year(ctx, year),
        }
    }

    /// Run over `years` (default: this year and last); returns total rows.
    pub fn run(self, ctx: &ExtractContext, years: Option<&[i32]>) -> Result<usize, ExtractError> {
        let years = match years {
            Some(y) => y.to_vec(),
            None => runner::default_years(ctx.today),
        };
        runner::run_extract(self.name(), &years, |year| self.process_year(ctx, year))
    }
}

/// A parsed HTML table as a frame; blank cells become absent.
fn table_frame(table: &html::Table) -> Frame {
    let mut frame = Frame::new(table.header.clone());
    for row in &table.rows {
        frame.push_row(
            row.iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.clone()))
                .collect(),
        );
    }
    frame
}

/// Persist a whole-year frame; a year that writes nothing counts as failed.
fn load_year(ctx: &ExtractContext, dataset: &Dataset, year: i32, frame: &Frame) -> YearOutcome {
    let key = year.to_string();
    match ctx.store.write_partition(dataset, &key, frame, ctx.today) {
        Ok(0) => YearOutcome {
            rows: 0,
            failed: vec![key],
        },
        Ok(rows) => YearOutcome {
            rows,
            failed: Vec::new(),
        },
        Err(e) => {
            error!("Failed for {}: {:#}", year, e);
            YearOutcome {
                rows: 0,
                failed: vec![key],
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ExtractKind::ALL {
            assert_eq!(ExtractKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ExtractKind::from_name("box_office"), None);
    }

    #[test]
    fn tiers() {
        assert_eq!(
            ExtractKind::of_tier(Tier::Independent),
            [ExtractKind::WorldwideBoxOffice, ExtractKind::ReleaseIdLookup]
        );
        assert_eq!(ExtractKind::of_tier(Tier::Dependent).len(), 3);
    }
}
