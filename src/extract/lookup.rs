//! Discovery of release groups and their domestic releases.
//!
//! The year index links every release group; each group page links its
//! releases, one of which is the domestic run the dependent extracts need.

use anyhow::Result;
use tracing::{error, info, warn};

use super::{load_year, ExtractContext, YearOutcome};
use crate::clean::{absolute_url, canonicalize};
use crate::fetch::Fetcher;
use crate::html;
use crate::store::dataset::RELEASE_ID_LOOKUP;
use crate::store::Frame;

const GROUP_PREFIX: &str = "/releasegroup/";
const RELEASE_PREFIX: &str = "/release/";
const DOMESTIC: &str = "Domestic";
const PROGRESS_EVERY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLink {
    pub url: String,
    pub title: Option<String>,
}

/// Distinct release-group links on the year index, in page order.
pub fn group_links(fetcher: &Fetcher, year: i32) -> Result<Vec<GroupLink>> {
    let url = fetcher.page_url(&format!("/year/world/{}/", year));
    let doc = fetcher.fetch(&url)?;

    let mut out: Vec<GroupLink> = Vec::new();
    for link in html::links_with_prefix(&doc, GROUP_PREFIX) {
        let Some(url) = absolute_url(fetcher.base_url(), &link.href).and_then(|u| canonicalize(&u))
        else {
            continue;
        };
        if out.iter().any(|g| g.url == url) {
            continue;
        }
        out.push(GroupLink {
            url,
            title: (!link.text.is_empty()).then_some(link.text),
        });
    }
    Ok(out)
}

/// The group's domestic release: an exact "Domestic" link wins over one
/// that merely starts with it.
pub fn domestic_release_url(fetcher: &Fetcher, group_url: &str) -> Result<Option<String>> {
    let doc = fetcher.fetch(group_url)?;
    let links = html::links_with_prefix(&doc, RELEASE_PREFIX);

    let found = links
        .iter()
        .find(|l| l.text == DOMESTIC)
        .or_else(|| links.iter().find(|l| l.text.starts_with(DOMESTIC)));

    match found {
        Some(link) => Ok(absolute_url(fetcher.base_url(), &link.href).and_then(|u| canonicalize(&u))),
        None => {
            warn!("Could not find Domestic release link on {}", group_url);
            Ok(None)
        }
    }
}

pub fn scrape(ctx: &ExtractContext, year: i32) -> Result<Frame> {
    let groups = group_links(ctx.fetcher, year)?;
    info!("Found {} release groups for {}.", groups.len(), year);

    let mut frame = Frame::new(
        RELEASE_ID_LOOKUP
            .required
            .iter()
            .map(|c| c.to_string())
            .collect(),
    );
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            ctx.fetcher.pace(ctx.settings.request_delay());
        }
        let domestic = domestic_release_url(ctx.fetcher, &group.url).unwrap_or_else(|e| {
            warn!("Failed to get domestic URL for {}: {}", group.url, e);
            None
        });
        frame.push_row(vec![group.title.clone(), Some(group.url.clone()), domestic]);

        if (i + 1) % PROGRESS_EVERY == 0 {
            info!("Parsed {}/{} rows", i + 1, groups.len());
        }
    }
    Ok(frame)
}

pub fn process_year(ctx: &ExtractContext, year: i32) -> YearOutcome {
    info!("Extracting release ID lookup data for {}.", year);
    let frame = scrape(ctx, year).unwrap_or_else(|e| {
        error!("Failed for {}: {:#}", year, e);
        Frame::default()
    });
    load_year(ctx, &RELEASE_ID_LOOKUP, year, &frame)
}
