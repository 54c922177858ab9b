//! Built-in site registry and profile file loading.

use std::path::Path;

use anyhow::{Context, Result};
use trawl_core::profile::{ProfileSpec, SiteConfig, StrategySpec};

/// Static-HTML Shopify storefront. Plain HTTP is enough.
fn buddhapants() -> ProfileSpec {
    let site = SiteConfig::new("buddhapants", "Buddha Pants", "https://www.buddhapants.com")
        .with_listing_urls([
            "https://www.buddhapants.com/collections/pants",
            "https://www.buddhapants.com/collections/tops",
            "https://www.buddhapants.com/collections/jumpsuits",
        ])
        .with_selector(
            "product_links",
            "a.product-item__title, a[href*='/products/']",
        )
        .with_selector("product_title", "h1.product__title")
        .with_selector("price", "span.price-item--regular")
        .with_selector("materials", "div.product__description")
        .with_selector("gallery_images", "div.product__media img")
        .with_product_patterns(["/products/"]);

    ProfileSpec {
        site,
        strategies: vec![StrategySpec::DirectHttp {
            listing_delay_ms: Some(300),
        }],
    }
}

/// Client-rendered catalog: listings only contain product links after
/// JavaScript runs, so the browser goes first.
fn bananarepublic() -> ProfileSpec {
    let base = "https://bananarepublic.gap.com";
    let site = SiteConfig::new("bananarepublic", "Banana Republic", base)
        .with_listing_urls(
            [
                "/browse/women?cid=5002",
                "/browse/women/dresses-and-jumpsuits?cid=69883",
                "/browse/women/pants?cid=67595",
                "/browse/women/sweaters?cid=5032",
                "/browse/women/workwear?cid=1178917",
                "/browse/women/accessories?cid=1134528",
                "/browse/men?cid=5343",
                "/browse/sale?cid=1014329",
            ]
            .map(|path| format!("{base}{path}")),
        )
        .with_selector(
            "product_links",
            "a.product-card__link, a[href*='/browse/product.do?pid=']",
        )
        .with_selector("product_title", "h1.product-name")
        .with_selector("price", "span.product-price__highlight")
        .with_selector("materials", "div.product-details__description")
        .with_selector("gallery_images", "div.pdp-photo-single-column-image img")
        .with_product_patterns(["/browse/product", "pid="]);

    ProfileSpec {
        site,
        strategies: vec![
            StrategySpec::BrowserRendered {
                scroll_count: Some(10),
                navigation_timeout_ms: Some(60_000),
                settle_ms: None,
            },
            StrategySpec::DirectHttp {
                listing_delay_ms: None,
            },
        ],
    }
}

/// All profiles compiled into the binary, sorted by key.
pub fn builtin_sites() -> Vec<ProfileSpec> {
    vec![bananarepublic(), buddhapants()]
}

pub fn find(key: &str) -> Option<ProfileSpec> {
    builtin_sites().into_iter().find(|p| p.site.key == key)
}

/// Load a profile from a JSON file.
pub fn load_profile(path: &Path) -> Result<ProfileSpec> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
    ProfileSpec::from_json(&json)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid profile file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sites_are_valid() {
        for spec in builtin_sites() {
            spec.site.validate().unwrap();
            assert!(!spec.strategies.is_empty(), "{} has no strategies", spec.site.key);
        }
    }

    #[test]
    fn strategy_order_per_site() {
        assert_eq!(find("buddhapants").unwrap().strategy_names(), vec!["direct_http"]);
        assert_eq!(
            find("bananarepublic").unwrap().strategy_names(),
            vec!["browser_rendered", "direct_http"]
        );
        assert!(find("nope").is_none());
    }

    #[test]
    fn listing_urls_are_absolute() {
        let spec = find("bananarepublic").unwrap();
        assert_eq!(spec.site.listing_urls.len(), 8);
        assert!(
            spec.site
                .listing_urls
                .iter()
                .all(|u| u.starts_with("https://bananarepublic.gap.com/browse/"))
        );
        assert_eq!(spec.site.source_site(), "bananarepublic.gap.com");
    }

    #[test]
    fn loads_profile_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.json");
        std::fs::write(
            &path,
            r#"{"key":"shop","name":"Shop","base_url":"https://shop.example",
                "listing_urls":["https://shop.example/collections/all"],
                "strategies":[{"kind":"direct_http"}]}"#,
        )
        .unwrap();

        let spec = load_profile(&path).unwrap();
        assert_eq!(spec.site.key, "shop");
        assert_eq!(spec.site.output_path(), Path::new("shop_raw.csv"));
    }

    #[test]
    fn missing_profile_file_is_an_error() {
        let err = load_profile(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read profile file"));
    }
}
