//! Small HTML helpers tailored to the box-office site's markup.
//!
//! Elements are located by matching open/close tags with a depth stack, so
//! nested spans and divs come out intact. Tag and attribute names are
//! matched case-insensitively. Anything fancier than that (scripts with
//! literal tags, unclosed cells) is out of reach and simply not matched.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|\d+);").unwrap());

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&ndash;", "–"),
    ("&mdash;", "—"),
    ("&amp;", "&"),
];

#[derive(Debug, Clone)]
pub struct Element<'a> {
    pub name: String,
    pub attrs: &'a str,
    pub inner: &'a str,
    /// Nesting depth among the requested tag names (0 = outermost).
    pub depth: usize,
    start: usize,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        attr(self.attrs, name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn text(&self) -> String {
        text(self.inner)
    }
}

/// Every element named in `tags`, in document order.
pub fn elements<'a>(doc: &'a str, tags: &[&str]) -> Vec<Element<'a>> {
    let pattern = format!(r"(?is)<(/?)({})\b([^>]*)>", tags.join("|"));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    // (name, attrs, inner_start, open_start)
    let mut stack: Vec<(String, &'a str, usize, usize)> = Vec::new();
    let mut out = Vec::new();

    for caps in re.captures_iter(doc) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = caps[2].to_ascii_lowercase();
        let closing = !caps[1].is_empty();

        if !closing {
            let attrs = caps.get(3).map_or("", |m| m.as_str());
            if attrs.trim_end().ends_with('/') {
                continue;
            }
            stack.push((name, attrs, whole.end(), whole.start()));
            continue;
        }

        // Close the nearest matching open tag; anything opened after it was never closed.
        if let Some(pos) = stack.iter().rposition(|(n, ..)| *n == name) {
            stack.truncate(pos + 1);
            if let Some((name, attrs, inner_start, open_start)) = stack.pop() {
                out.push(Element {
                    name,
                    attrs,
                    inner: &doc[inner_start..whole.start()],
                    depth: stack.len(),
                    start: open_start,
                });
            }
        }
    }

    out.sort_by_key(|e| e.start);
    out
}

/// Outermost elements named in `tags`.
pub fn top_level<'a>(doc: &'a str, tags: &[&str]) -> Vec<Element<'a>> {
    elements(doc, tags)
        .into_iter()
        .filter(|e| e.depth == 0)
        .collect()
}

pub fn attr(attrs: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)(?:^|\s){}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| decode_entities(m.as_str()))
}

/// Visible text of a fragment: tags dropped, entities decoded, whitespace collapsed.
pub fn text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    normalize_ws(&decode_entities(&stripped))
}

pub fn decode_entities(s: &str) -> String {
    let mut out = s.to_string();
    for (entity, ch) in NAMED_ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, ch);
        }
    }
    NUMERIC_ENTITY_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let raw = &caps[1];
            let code = match raw.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => raw.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Link {
    pub href: String,
    pub text: String,
}

/// Anchors whose `href` starts with `prefix`.
pub fn links_with_prefix(doc: &str, prefix: &str) -> Vec<Link> {
    elements(doc, &["a"])
        .into_iter()
        .filter_map(|a| {
            let href = a.attr("href")?;
            href.starts_with(prefix).then(|| Link {
                href,
                text: a.text(),
            })
        })
        .collect()
}

/// Header plus data rows of one `<table>` element's inner HTML.
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn parse_table(inner: &str) -> Table {
    let rows: Vec<Vec<Element>> = top_level(inner, &["tr"])
        .iter()
        .map(|tr| top_level(tr.inner, &["td", "th"]))
        .filter(|cells| !cells.is_empty())
        .collect();

    let header_idx = rows
        .iter()
        .position(|cells| cells.iter().all(|c| c.name == "th"))
        .unwrap_or(0);

    let header = rows
        .get(header_idx)
        .map(|cells| dedupe_names(cells.iter().map(|c| c.text()).collect()))
        .unwrap_or_default();

    let data = rows
        .iter()
        .enumerate()
        .filter(|(i, cells)| *i != header_idx && cells.iter().any(|c| c.name == "td"))
        .map(|(_, cells)| cells.iter().map(|c| c.text()).collect())
        .collect();

    Table { header, rows: data }
}

/// Later duplicates get `.1`, `.2`, ... appended.
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let out = if *count == 0 {
                name
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            out
        })
        .collect()
}
