//! Sub-resource discovery in fetched HTML.
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

const LINK_PATTERN: &str = r#"(?i)<img[^>]+src=["'](.*?)["']|<script[^>]+src=["'](.*?)["']|<link[^>]+href=["'](.*?)["']"#;

/// Finds `<img src>`, `<script src>` and `<link href>` references.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    pattern: Regex,
}

/// Links found on one page, split by whether they can ride the page's connection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageLinks {
    pub same_origin: Vec<Url>,
    pub cross_origin: Vec<Url>,
}

impl LinkExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(LINK_PATTERN)?,
        })
    }

    /// Resolved, de-duplicated references in `html`, ordered by URL.
    ///
    /// References that do not resolve against `base` are skipped.
    pub fn extract(&self, html: &str, base: &Url) -> Vec<Url> {
        let mut found = BTreeSet::new();
        for captures in self.pattern.captures_iter(html) {
            let Some(reference) = captures.iter().skip(1).flatten().next() else {
                continue;
            };
            let reference = reference.as_str().trim();
            if reference.is_empty() {
                continue;
            }
            match base.join(reference) {
                Ok(url) => {
                    found.insert(url);
                }
                Err(err) => tracing::debug!(reference, error = %err, "skipping unresolvable link"),
            }
        }
        found.into_iter().collect()
    }

    pub fn partition(&self, html: &str, base: &Url) -> PageLinks {
        let mut links = PageLinks::default();
        for url in self.extract(html, base) {
            if same_origin(base, &url) {
                links.same_origin.push(url);
            } else {
                links.cross_origin.push(url);
            }
        }
        links
    }
}

pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Path plus query, the part of a URL carried in `:path`.
pub fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
