//! Per-market breakdown of a release group's grosses, one table per region.

use anyhow::Result;
use tracing::info;

use super::items::{process_lookup_year, LookupId};
use super::{ExtractContext, YearOutcome};
use crate::clean::{clean_currency, clean_date};
use crate::fetch::Fetcher;
use crate::html::{self, Element};
use crate::store::dataset::WORLDWIDE_SNAPSHOT;
use crate::store::Frame;

const REGION_TABLE_CLASS: &str = "releases-by-region";
const TITLE_CLASS: &str = "a-size-extra-large";
const SKIPPED_MARKETS: &[&str] = &["market", "total", "summary"];

const COLUMNS: [&str; 7] = [
    "region",
    "market",
    "release_date",
    "opening",
    "total_gross",
    "movie_title",
    "release_group_url",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRow {
    pub region: String,
    pub market: String,
    pub release_date: Option<String>,
    pub opening: Option<String>,
    pub total_gross: Option<String>,
}

/// Market rows of one region table; the first row is the region header.
fn region_rows(region: &str, table: &Element) -> Vec<MarketRow> {
    html::top_level(table.inner, &["tr"])
        .iter()
        .skip(1)
        .filter_map(|tr| {
            let cells: Vec<String> = html::top_level(tr.inner, &["td", "th"])
                .iter()
                .map(Element::text)
                .collect();
            if cells.len() < 3 {
                return None;
            }
            let market = cells[0].clone();
            if market.is_empty() || SKIPPED_MARKETS.contains(&market.to_lowercase().as_str()) {
                return None;
            }

            let release_date = clean_date(&cells[1]);
            let money = clean_currency(&cells[2]);
            // A three-cell row carries only the gross.
            let (opening, total_gross) = match cells.get(3) {
                Some(gross) => (money, clean_currency(gross)),
                None => (None, money),
            };
            Some(MarketRow {
                region: region.to_string(),
                market,
                release_date,
                opening,
                total_gross,
            })
        })
        .collect()
}

/// Every regional market row on a group page. The `Worldwide` table
/// repeats the yearly aggregate and is left out.
pub fn parse_regions(doc: &str) -> Vec<MarketRow> {
    let mut out = Vec::new();
    for table in html::elements(doc, &["table"]) {
        if !table.has_class(REGION_TABLE_CLASS) {
            continue;
        }
        let Some(header) = html::elements(table.inner, &["th"])
            .into_iter()
            .find(|th| th.attr("colspan").as_deref() == Some("4"))
        else {
            continue;
        };
        let region = header.text();
        if region.is_empty() || region.eq_ignore_ascii_case("worldwide") {
            continue;
        }
        out.extend(region_rows(&region, &table));
    }
    out
}

pub fn scrape(fetcher: &Fetcher, release_group_id: &str) -> Result<Frame> {
    let url = fetcher.page_url(&format!("/releasegroup/{}/", release_group_id));
    let doc = fetcher.fetch(&url)?;

    let headings = html::elements(&doc, &["h1"]);
    let movie_title = headings
        .iter()
        .find(|h| h.has_class(TITLE_CLASS))
        .map(Element::text);

    let mut frame = Frame::new(COLUMNS.iter().map(|c| c.to_string()).collect());
    for row in parse_regions(&doc) {
        frame.push_row(vec![
            Some(row.region),
            Some(row.market),
            row.release_date,
            row.opening,
            row.total_gross,
            movie_title.clone(),
            Some(url.clone()),
        ]);
    }
    Ok(frame)
}

pub fn process_year(ctx: &ExtractContext, year: i32) -> YearOutcome {
    info!("Processing worldwide snapshot data for {}.", year);
    process_lookup_year(
        ctx,
        year,
        LookupId::ReleaseGroup,
        &WORLDWIDE_SNAPSHOT,
        ctx.settings.snapshot_delay(),
        |id| scrape(ctx.fetcher, id),
    )
}
