//! Per-item loop shared by the dependent extracts.

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use super::{ExtractContext, YearOutcome};
use crate::store::dataset::{self, Dataset};
use crate::store::Frame;

const LOOKUP_RELEASE_COLUMN: &str = "domestic_release_url";
const LOOKUP_GROUP_COLUMN: &str = "release_group_url";

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Scrape and store each id in turn, pausing `delay` between items.
///
/// A scrape error counts as zero rows for that id, same as an empty frame.
/// Only a frame the store rejects or fails to write marks the id as failed.
pub(super) fn process_items<F>(
    ctx: &ExtractContext,
    dataset: &Dataset,
    ids: &[String],
    delay: Duration,
    scrape: F,
) -> YearOutcome
where
    F: Fn(&str) -> Result<Frame>,
{
    let mut outcome = YearOutcome::default();
    let pb = progress_bar(ids.len());

    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            ctx.fetcher.pace(delay);
        }
        pb.set_message(id.clone());
        debug!("[{}/{}] {} {}", i + 1, ids.len(), dataset.name, id);

        match scrape(id) {
            Ok(frame) if frame.is_empty() => {
                debug!("No {} data to load for {}", dataset.name, id);
            }
            Ok(frame) => match ctx.store.write_partition(dataset, id, &frame, ctx.today) {
                Ok(0) => outcome.failed.push(id.clone()),
                Ok(rows) => outcome.rows += rows,
                Err(e) => {
                    error!("Failed to store {} for {}: {:#}", dataset.name, id, e);
                    outcome.failed.push(id.clone());
                }
            },
            Err(e) => {
                warn!("Failed to scrape {} for {}: {:#}", dataset.name, id, e);
                debug!("No {} data to load for {}", dataset.name, id);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "{}: {} rows from {} items ({} failed)",
        dataset.name,
        outcome.rows,
        ids.len(),
        outcome.failed.len()
    );
    outcome
}

#[derive(Debug, Clone, Copy)]
pub(super) enum LookupId {
    Release,
    ReleaseGroup,
}

/// Ids named by the latest lookup partition for `year`; empty when the year
/// was never looked up.
pub(super) fn lookup_ids(ctx: &ExtractContext, year: i32, kind: LookupId) -> Result<Vec<String>> {
    let key = year.to_string();
    let Some(latest) = ctx
        .store
        .find_latest_partition(&dataset::RELEASE_ID_LOOKUP, &key)?
    else {
        warn!("No release_id_lookup partition for {}; nothing to enrich", year);
        return Ok(Vec::new());
    };
    debug!("Reading ids from {}", latest);
    let lookup = ctx.store.read_partition(&latest)?;

    let (column, to_id): (&str, fn(&str) -> String) = match kind {
        LookupId::Release => (LOOKUP_RELEASE_COLUMN, crate::clean::release_id_from_url),
        LookupId::ReleaseGroup => (LOOKUP_GROUP_COLUMN, crate::clean::release_group_id_from_url),
    };

    let mut ids: Vec<String> = Vec::new();
    for url in lookup.distinct_values(column) {
        let id = to_id(&url);
        if !id.is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    }
    info!("Found {} ids in {} for {}", ids.len(), column, year);
    Ok(ids)
}

/// Shared `process_year` for the dependent kinds.
pub(super) fn process_lookup_year<F>(
    ctx: &ExtractContext,
    year: i32,
    kind: LookupId,
    dataset: &Dataset,
    delay: Duration,
    scrape: F,
) -> YearOutcome
where
    F: Fn(&str) -> Result<Frame>,
{
    match lookup_ids(ctx, year, kind) {
        Ok(ids) => process_items(ctx, dataset, &ids, delay, scrape),
        Err(e) => {
            error!("Failed to read release ids for {}: {:#}", year, e);
            YearOutcome {
                rows: 0,
                failed: vec![year.to_string()],
            }
        }
    }
}
