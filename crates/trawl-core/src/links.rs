use std::collections::BTreeSet;

use scraper::{Html, Selector};
use url::Url;

use crate::profile::SiteConfig;

/// Selector used when a site declares none.
const FALLBACK_SELECTOR: &str = "a[href]";

/// Collect product links from a listing page.
///
/// Tries each configured product-link selector in order and stops at the
/// first one that yields at least one product URL. Hrefs are resolved
/// against the site's `base_url`, fragments are dropped, and only URLs
/// matching one of the product patterns are kept.
pub fn product_links(html: &str, site: &SiteConfig) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(&site.base_url).ok();

    let mut selectors = site.product_link_selectors();
    if selectors.is_empty() {
        selectors.push(FALLBACK_SELECTOR);
    }

    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(selector = %raw, error = ?e, "Invalid product link selector");
                continue;
            }
        };

        let found: BTreeSet<String> = document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve(base.as_ref(), href))
            .filter(|url| site.is_product_url(url))
            .collect();

        if !found.is_empty() {
            return found;
        }
    }

    BTreeSet::new()
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}
