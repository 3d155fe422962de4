//! Chooses extract kinds and runs them, collecting per-kind failures.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use tracing::{error, info, warn};

use crate::error::{ExtractError, FAILED_KEY_SAMPLE};
use crate::extract::{runner, ExtractContext, ExtractKind};
use crate::ledger::{self, RunRow};

/// Special extract name selecting every kind.
pub const ALL: &str = "all";

/// Kinds that run on every scheduled invocation.
pub const DAILY: [ExtractKind; 2] = [ExtractKind::WorldwideBoxOffice, ExtractKind::ReleaseIdLookup];

/// The one per-item kind for `day`, spreading heavy scraping over the week.
pub fn weekly_extract(day: Weekday) -> Option<ExtractKind> {
    match day {
        Weekday::Tue => Some(ExtractKind::ReleaseDomestic),
        Weekday::Wed => Some(ExtractKind::ReleaseMetadata),
        Weekday::Thu => Some(ExtractKind::ReleaseWorldwideSnapshot),
        _ => None,
    }
}

/// Resolve requested names into kinds, in dependency order.
///
/// No names means the daily kinds plus today's weekly kind. Unknown names
/// fail before anything runs.
pub fn select_extracts(names: &[String], today: NaiveDate) -> Result<Vec<ExtractKind>, ExtractError> {
    let chosen: Vec<ExtractKind> = if names.is_empty() {
        DAILY
            .into_iter()
            .chain(weekly_extract(today.weekday()))
            .collect()
    } else if names.iter().any(|n| n == ALL) {
        ExtractKind::ALL.to_vec()
    } else {
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| ExtractKind::from_name(n).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ExtractError::UnknownExtract {
                requested: unknown,
                available: ExtractKind::names(),
            });
        }
        names.iter().filter_map(|n| ExtractKind::from_name(n)).collect()
    };

    Ok(ExtractKind::ALL
        .into_iter()
        .filter(|k| chosen.contains(k))
        .collect())
}

/// Run each kind over `years`; one kind failing never stops the rest.
pub fn run_kinds(
    ctx: &ExtractContext,
    kinds: &[ExtractKind],
    years: Option<&[i32]>,
) -> Vec<(ExtractKind, anyhow::Error)> {
    let years = years
        .map(<[i32]>::to_vec)
        .unwrap_or_else(|| runner::default_years(ctx.today));
    let run_id = ledger::new_run_id();
    let mut failures = Vec::new();

    for &kind in kinds {
        let started_at = Utc::now();
        let result = kind.run(ctx, Some(&years));
        let finished_at = Utc::now();

        if let Some(conn) = ctx.ledger {
            let row = run_row(&run_id, kind, &years, &result, started_at, finished_at);
            if let Err(e) = ledger::insert_run(conn, &row) {
                warn!("Failed to record {} run: {:#}", kind.name(), e);
            }
        }

        match result {
            Ok(rows) => info!("{} complete ({} rows)", kind.name(), rows),
            Err(e) => {
                error!("{} failed: {}", kind.name(), e);
                failures.push((kind, anyhow::Error::new(e)));
            }
        }
    }
    failures
}

fn run_row(
    run_id: &str,
    kind: ExtractKind,
    years: &[i32],
    result: &Result<usize, ExtractError>,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
) -> RunRow {
    let none: &[String] = &[];
    let (rows_loaded, failed) = match result {
        Ok(rows) => (*rows, none),
        Err(ExtractError::ItemsFailed {
            total_rows, failed, ..
        }) => (*total_rows, failed.as_slice()),
        Err(_) => (0, none),
    };
    let sample = &failed[..failed.len().min(FAILED_KEY_SAMPLE)];
    RunRow {
        run_id: run_id.to_string(),
        extract: kind.name().to_string(),
        years: years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(","),
        rows_loaded,
        failed_count: failed.len(),
        failed_sample: (!sample.is_empty())
            .then(|| serde_json::to_string(sample).ok())
            .flatten(),
        error: result.as_ref().err().map(|e| e.to_string()),
        started_at,
        finished_at,
    }
}

/// Entry point: select by name, then run. Only name validation can fail
/// here; extract failures come back in the list.
pub fn run_extracts(
    ctx: &ExtractContext,
    names: &[String],
    years: Option<&[i32]>,
) -> Result<Vec<(ExtractKind, anyhow::Error)>, ExtractError> {
    let kinds = select_extracts(names, ctx.today)?;
    info!(
        "Running extracts: {}",
        kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(run_kinds(ctx, &kinds, years))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::extract::testing::{day, site, Harness};
    use crate::store::dataset;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rotation_covers_midweek_only() {
        assert_eq!(weekly_extract(Weekday::Tue), Some(ExtractKind::ReleaseDomestic));
        assert_eq!(weekly_extract(Weekday::Wed), Some(ExtractKind::ReleaseMetadata));
        assert_eq!(weekly_extract(Weekday::Thu), Some(ExtractKind::ReleaseWorldwideSnapshot));
        assert_eq!(weekly_extract(Weekday::Sun), None);
    }

    #[test]
    fn selection_policies() {
        // 2024-03-13 is a Wednesday, 2024-03-17 a Sunday.
        assert_eq!(
            select_extracts(&[], day("2024-03-13")).unwrap(),
            [
                ExtractKind::WorldwideBoxOffice,
                ExtractKind::ReleaseIdLookup,
                ExtractKind::ReleaseMetadata
            ]
        );
        assert_eq!(select_extracts(&[], day("2024-03-17")).unwrap(), DAILY);
        assert_eq!(select_extracts(&names(&["all"]), day("2024-03-17")).unwrap(), ExtractKind::ALL);
        assert_eq!(
            select_extracts(
                &names(&["release_metadata", "worldwide_box_office", "release_metadata"]),
                day("2024-03-17")
            )
            .unwrap(),
            [ExtractKind::WorldwideBoxOffice, ExtractKind::ReleaseMetadata]
        );
    }

    #[test]
    fn unknown_names_fail_before_any_request() {
        let transport = site();
        let requests = transport.requests.clone();
        let h = Harness::new(transport, day("2024-03-14"));
        let err = run_extracts(&h.ctx(), &names(&["worldwide_box_office", "box_office"]), None)
            .unwrap_err();
        match err {
            ExtractError::UnknownExtract { requested, available } => {
                assert_eq!(requested, ["box_office"]);
                assert_eq!(available.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(requests.borrow().is_empty());
        assert!(ledger::fetch_recent_runs(&h.ledger, 10).unwrap().is_empty());
    }

    #[test]
    fn single_kind_for_one_year_writes_one_partition() {
        let h = Harness::new(site(), day("2024-03-14"));
        let failures =
            run_extracts(&h.ctx(), &names(&["worldwide_box_office"]), Some(&[2023])).unwrap();
        assert!(failures.is_empty());

        let written = h
            .store
            .partitions_for_key(&dataset::WORLDWIDE_BOX_OFFICE, "2023")
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0].to_string(),
            "raw/worldwide_box_office/release_year=2023/scraped_date=2024-03-14/data.parquet"
        );
        for other in [
            &dataset::RELEASE_ID_LOOKUP,
            &dataset::RELEASE_METADATA,
            &dataset::RELEASE_DOMESTIC,
            &dataset::WORLDWIDE_SNAPSHOT,
        ] {
            assert!(h.store.partitions_present_for(other).unwrap().is_empty());
        }
    }

    #[test]
    fn default_run_on_wednesday_adds_metadata() {
        let h = Harness::new(site(), day("2024-03-13"));
        let failures = run_extracts(&h.ctx(), &[], None).unwrap();

        let runs = ledger::fetch_recent_runs(&h.ledger, 20).unwrap();
        let ran: BTreeSet<String> = runs.iter().map(|r| r.extract.clone()).collect();
        assert_eq!(
            ran,
            BTreeSet::from([
                "worldwide_box_office".to_string(),
                "release_id_lookup".to_string(),
                "release_metadata".to_string(),
            ])
        );
        assert!(runs.iter().all(|r| r.years == "2024,2023"));

        // The site fixture only has 2023, so the 2024 year pages fail.
        let failed: Vec<ExtractKind> = failures.iter().map(|(k, _)| *k).collect();
        assert_eq!(failed, DAILY);
        let lookup = runs.iter().find(|r| r.extract == "release_id_lookup").unwrap();
        assert_eq!(lookup.failed_sample.as_deref(), Some(r#"["2024"]"#));
        assert_eq!(lookup.rows_loaded, 2);

        let releases = h.store.partitions_present_for(&dataset::RELEASE_METADATA).unwrap();
        assert_eq!(releases.into_iter().collect::<Vec<_>>(), ["rl1", "rl2"]);
    }
}
