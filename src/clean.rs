//! Value cleaning shared by the scrapers.
//!
//! Unknown values come back as `None`, never as zero.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static NON_DIGIT_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d,]").unwrap());
static RELEASE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/release/(rl\d+)/").unwrap());
static RELEASE_GROUP_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/releasegroup/(gr\d+)/").unwrap());

const PLACEHOLDERS: &[&str] = &["-", "–", "—", "N/A"];

fn is_placeholder(val: &str) -> bool {
    let val = val.trim();
    val.is_empty() || PLACEHOLDERS.contains(&val)
}

/// `"$1,234,567"` → `Some("1234567")`; placeholders and digit-less text → `None`.
pub fn clean_currency(val: &str) -> Option<String> {
    if is_placeholder(val) {
        return None;
    }
    let digits = NON_DIGIT_COMMA_RE.replace_all(val, "").replace(',', "");
    (!digits.is_empty()).then_some(digits)
}

/// Same rules as [`clean_currency`]; kept separate for theater counts.
pub fn clean_number(val: &str) -> Option<String> {
    clean_currency(val)
}

pub fn clean_date(val: &str) -> Option<String> {
    if is_placeholder(val) {
        return None;
    }
    Some(val.trim().to_string())
}

/// Split `"$100,262,540 4,000 theaters"` into amount and theater count.
pub fn parse_opening(text: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let mut amount = None;
    let mut theaters = None;

    for (i, part) in parts.iter().enumerate() {
        if part.starts_with('$') {
            amount = clean_currency(part);
        }
        if i > 0 && part.to_lowercase().contains("theater") {
            theaters = clean_number(parts[i - 1]);
        }
    }
    (amount, theaters)
}

/// Scheme, host and path only; query and fragment dropped.
pub fn canonicalize(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    match Url::parse(url) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            Some(u.to_string())
        }
        Err(_) => Some(url.split(['?', '#']).next().unwrap_or(url).to_string()),
    }
}

/// Resolve a site-relative `href` against `base`.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    Url::parse(base).ok()?.join(href).ok().map(String::from)
}

pub fn release_id_from_url(url: &str) -> String {
    id_from_url(&RELEASE_ID_RE, url)
}

pub fn release_group_id_from_url(url: &str) -> String {
    id_from_url(&RELEASE_GROUP_ID_RE, url)
}

fn id_from_url(re: &Regex, url: &str) -> String {
    if let Some(caps) = re.captures(url) {
        return caps[1].to_string();
    }
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_string()
}
