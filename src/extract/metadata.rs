use anyhow::Result;
use tracing::info;

use super::items::{process_lookup_year, LookupId};
use super::{ExtractContext, YearOutcome};
use crate::clean::{clean_number, parse_opening};
use crate::fetch::Fetcher;
use crate::html::{self, Element};
use crate::store::dataset::RELEASE_METADATA;
use crate::store::Frame;

const TITLE_CLASS: &str = "a-size-extra-large";
const COMPANY_SUFFIX: &str = "See full company information";

fn title(doc: &str) -> Option<String> {
    let headings = html::elements(doc, &["h1"]);
    headings
        .iter()
        .find(|h| h.has_class(TITLE_CLASS))
        .or_else(|| headings.first())
        .map(Element::text)
        .filter(|t| !t.is_empty())
}

/// `(label, value)` pairs from the summary block: innermost
/// `a-section a-spacing-none` divs whose first two spans are label and value.
fn summary_pairs(doc: &str) -> Vec<(String, String)> {
    html::elements(doc, &["div"])
        .into_iter()
        .filter(|d| d.has_class("a-section") && d.has_class("a-spacing-none"))
        .filter(|d| html::elements(d.inner, &["div"]).is_empty())
        .filter_map(|d| {
            let spans = html::top_level(d.inner, &["span"]);
            let [label, value, ..] = spans.as_slice() else {
                return None;
            };
            Some((label.text().to_lowercase().replace(':', ""), value.text()))
        })
        .collect()
}

/// One-row frame of the release's summary fields. Only `release_id` is
/// guaranteed; fields the page lacks are left out.
pub fn scrape(fetcher: &Fetcher, release_id: &str) -> Result<Frame> {
    let url = fetcher.page_url(&format!("/release/{}/", release_id));
    let doc = fetcher.fetch(&url)?;

    let mut record: Vec<(&str, Option<String>)> = vec![("release_id", Some(release_id.to_string()))];
    if let Some(t) = title(&doc) {
        record.push(("movie_title", Some(t)));
    }

    for (label, value) in summary_pairs(&doc) {
        if label.contains("distributor") {
            let name = value.replace(COMPANY_SUFFIX, "").trim().to_string();
            record.push(("distributor", Some(name)));
        } else if label.contains("opening") {
            let (amount, theaters) = parse_opening(&value);
            record.push(("opening_amount", amount));
            record.push(("opening_theaters", theaters));
        } else if label.contains("release date") {
            record.push(("release_date", Some(value)));
        } else if label.contains("mpaa") {
            record.push(("rating", Some(value)));
        } else if label.contains("running time") {
            record.push(("runtime", Some(value)));
        } else if label.contains("genres") {
            record.push(("genres", Some(html::normalize_ws(&value))));
        } else if label.contains("widest release") {
            let first = value.split_whitespace().next().unwrap_or_default();
            record.push(("widest_release", clean_number(first)));
        }
    }

    Ok(Frame::from_records(&[record]))
}

pub fn process_year(ctx: &ExtractContext, year: i32) -> YearOutcome {
    info!("Processing release metadata for {}.", year);
    process_lookup_year(
        ctx,
        year,
        LookupId::Release,
        &RELEASE_METADATA,
        ctx.settings.request_delay(),
        |id| scrape(ctx.fetcher, id),
    )
}
