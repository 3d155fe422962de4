use anyhow::{Context, Result};
use tracing::{error, info};

use super::{load_year, table_frame, ExtractContext, YearOutcome};
use crate::fetch::Fetcher;
use crate::html;
use crate::store::dataset::WORLDWIDE_BOX_OFFICE;
use crate::store::Frame;

/// The year's worldwide ranking table, as published.
pub fn scrape(fetcher: &Fetcher, year: i32) -> Result<Frame> {
    let url = fetcher.page_url(&format!("/year/world/{}/", year));
    let doc = fetcher.fetch(&url)?;
    let table = html::elements(&doc, &["table"])
        .into_iter()
        .next()
        .with_context(|| format!("No table on {}", url))?;
    Ok(table_frame(&html::parse_table(table.inner)))
}

pub fn process_year(ctx: &ExtractContext, year: i32) -> YearOutcome {
    info!("Extracting worldwide box office data for {}.", year);
    let frame = scrape(ctx.fetcher, year).unwrap_or_else(|e| {
        error!("Failed for {}: {:#}", year, e);
        Frame::default()
    });
    load_year(ctx, &WORLDWIDE_BOX_OFFICE, year, &frame)
}
