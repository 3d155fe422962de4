//! Historical backfill, one missing year per invocation.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::Datelike;
use tracing::{info, warn};

use crate::error::BackfillError;
use crate::extract::{ExtractContext, ExtractKind, Tier};
use crate::pipeline;
use crate::store::PartitionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Every year already has data from all independent kinds.
    Complete,
    Backfilled(i32),
}

/// Years in `[earliest, current_year]` lacking a partition from any
/// independent kind, most recent first.
pub fn find_missing_years(store: &PartitionStore, earliest: i32, current_year: i32) -> Result<Vec<i32>> {
    let mut covered: Option<BTreeSet<i32>> = None;
    for kind in ExtractKind::of_tier(Tier::Independent) {
        let years: BTreeSet<i32> = store
            .partitions_present_for(kind.dataset())?
            .iter()
            .filter_map(|key| key.parse().ok())
            .collect();
        covered = Some(match covered {
            Some(prev) => prev.intersection(&years).copied().collect(),
            None => years,
        });
    }
    let covered = covered.unwrap_or_default();

    Ok((earliest..=current_year)
        .rev()
        .filter(|y| !covered.contains(y))
        .collect())
}

fn run_phase(ctx: &ExtractContext, phase: u8, tier: Tier, year: i32) -> Result<(), BackfillError> {
    let kinds = ExtractKind::of_tier(tier);
    info!("Backfill {} phase {}: {} kinds", year, phase, kinds.len());
    let failures = pipeline::run_kinds(ctx, &kinds, Some(&[year]));
    if failures.is_empty() {
        return Ok(());
    }
    Err(BackfillError::PhaseFailed {
        phase,
        year,
        extracts: failures.iter().map(|(k, _)| k.name().to_string()).collect(),
    })
}

/// Backfill `year`, or the most recent missing year when none is given.
/// Dependent kinds only run once every independent kind succeeded.
pub fn run_backfill(ctx: &ExtractContext, year: Option<i32>) -> Result<BackfillOutcome> {
    let year = match year {
        Some(y) => y,
        None => {
            let missing =
                find_missing_years(ctx.store, ctx.settings.earliest_year, ctx.today.year())?;
            info!("{} years missing", missing.len());
            match missing.first() {
                Some(&y) => y,
                None => {
                    info!("No missing years; nothing to backfill");
                    return Ok(BackfillOutcome::Complete);
                }
            }
        }
    };

    info!("Backfilling {}", year);
    if let Err(e) = run_phase(ctx, 1, Tier::Independent, year) {
        warn!("{}; skipping dependent extracts", e);
        return Err(e.into());
    }
    run_phase(ctx, 2, Tier::Dependent, year)?;
    info!("Backfilled {}", year);
    Ok(BackfillOutcome::Backfilled(year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::testing::{day, site, Harness};
    use crate::fetch::testing::FakeTransport;
    use crate::ledger;
    use crate::store::dataset::{self, Dataset};
    use crate::store::Frame;

    fn seed(h: &Harness, dataset: &Dataset, year: i32) {
        let record: Vec<(&str, Option<String>)> = dataset
            .required
            .iter()
            .map(|c| (*c, Some("x".to_string())))
            .collect();
        h.store
            .write_partition(dataset, &year.to_string(), &Frame::from_records(&[record]), h.today)
            .unwrap();
    }

    #[test]
    fn empty_store_misses_every_year() {
        let h = Harness::new(FakeTransport::default(), day("2024-03-14"));
        assert_eq!(
            find_missing_years(&h.store, 2020, 2024).unwrap(),
            [2024, 2023, 2022, 2021, 2020]
        );
    }

    #[test]
    fn coverage_requires_every_independent_kind() {
        let h = Harness::new(FakeTransport::default(), day("2024-03-14"));
        for year in 2020..=2024 {
            seed(&h, &dataset::WORLDWIDE_BOX_OFFICE, year);
            if year != 2022 {
                seed(&h, &dataset::RELEASE_ID_LOOKUP, year);
            }
        }
        assert_eq!(find_missing_years(&h.store, 2020, 2024).unwrap(), [2022]);

        seed(&h, &dataset::RELEASE_ID_LOOKUP, 2022);
        assert!(find_missing_years(&h.store, 2020, 2024).unwrap().is_empty());
    }

    #[test]
    fn dependent_partitions_do_not_count() {
        let h = Harness::new(FakeTransport::default(), day("2024-03-14"));
        seed(&h, &dataset::RELEASE_ID_LOOKUP, 2024);
        let frame = Frame::from_records(&[vec![("release_id", Some("rl1".into()))]]);
        h.store
            .write_partition(&dataset::RELEASE_METADATA, "2024", &frame, h.today)
            .unwrap();
        assert_eq!(find_missing_years(&h.store, 2024, 2024).unwrap(), [2024]);
    }

    #[test]
    fn backfills_most_recent_missing_year() {
        let mut h = Harness::new(site(), day("2024-03-14"));
        h.settings.earliest_year = 2023;
        seed(&h, &dataset::WORLDWIDE_BOX_OFFICE, 2024);
        seed(&h, &dataset::RELEASE_ID_LOOKUP, 2024);

        let outcome = run_backfill(&h.ctx(), None).unwrap();
        assert_eq!(outcome, BackfillOutcome::Backfilled(2023));

        let ran: Vec<String> = ledger::fetch_recent_runs(&h.ledger, 10)
            .unwrap()
            .into_iter()
            .rev()
            .map(|r| r.extract)
            .collect();
        assert_eq!(ran, ExtractKind::names());
        assert_eq!(
            h.store
                .partitions_present_for(&dataset::WORLDWIDE_SNAPSHOT)
                .unwrap()
                .into_iter()
                .collect::<Vec<_>>(),
            ["gr1", "gr2"]
        );
        assert!(find_missing_years(&h.store, 2023, 2024).unwrap().is_empty());
        assert_eq!(run_backfill(&h.ctx(), None).unwrap(), BackfillOutcome::Complete);
    }

    #[test]
    fn failed_first_phase_skips_dependents() {
        let h = Harness::new(site(), day("2024-03-14"));
        let err = run_backfill(&h.ctx(), Some(1999)).unwrap_err();

        match err.downcast_ref::<BackfillError>() {
            Some(BackfillError::PhaseFailed { phase, year, extracts }) => {
                assert_eq!((*phase, *year), (1, 1999));
                assert_eq!(extracts, &["worldwide_box_office", "release_id_lookup"]);
            }
            None => panic!("unexpected error: {err:#}"),
        }
        assert_eq!(ledger::fetch_recent_runs(&h.ledger, 10).unwrap().len(), 2);
    }
}
