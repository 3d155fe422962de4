use anyhow::Result;
use tracing::{info, warn};

use super::items::{process_lookup_year, LookupId};
use super::{table_frame, ExtractContext, YearOutcome};
use crate::fetch::Fetcher;
use crate::html;
use crate::store::dataset::{RELEASE_DOMESTIC, RELEASE_ID_KEY};
use crate::store::Frame;

/// Daily domestic grosses: the last table on the release page.
pub fn scrape(fetcher: &Fetcher, release_id: &str) -> Result<Frame> {
    let url = fetcher.page_url(&format!("/release/{}/", release_id));
    let doc = fetcher.fetch(&url)?;

    let Some(table) = html::top_level(&doc, &["table"]).pop() else {
        warn!("No tables found for {}", release_id);
        return Ok(Frame::default());
    };
    Ok(table_frame(&html::parse_table(table.inner)).with_constant(RELEASE_ID_KEY, release_id))
}

pub fn process_year(ctx: &ExtractContext, year: i32) -> YearOutcome {
    info!("Processing release domestic data for {}.", year);
    process_lookup_year(
        ctx,
        year,
        LookupId::Release,
        &RELEASE_DOMESTIC,
        ctx.settings.request_delay(),
        |id| scrape(ctx.fetcher, id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::testing::{day, site, Harness};

    #[test]
    fn last_table_with_release_id() {
        let h = Harness::new(site(), day("2024-03-14"));
        let frame = scrape(&h.fetcher, "rl1").unwrap();

        assert_eq!(frame.columns().first().map(String::as_str), Some("Date"));
        assert_eq!(frame.columns().last().map(String::as_str), Some("release_id"));
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column("Daily").unwrap(), [Some("$70,503,178"), Some("$47,759,203")]);
        assert_eq!(frame.column("release_id").unwrap(), [Some("rl1"), Some("rl1")]);
        // Placeholders stay verbatim in raw daily data.
        assert_eq!(frame.column("%± YD").unwrap()[0], Some("-"));
    }

    #[test]
    fn page_without_tables_is_empty() {
        let h = Harness::new(site(), day("2024-03-14"));
        assert!(scrape(&h.fetcher, "rl2").unwrap().is_empty());
    }
}
