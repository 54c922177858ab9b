//! Built-in product extractor.
//!
//! Looks for product data in three places, in order:
//!
//! 1. schema.org `Product` / `ProductGroup` JSON-LD (top level, arrays and
//!    `@graph`), one record per offer or variant;
//! 2. Shopify's embedded `ProductJson-*` script, one record per variant;
//! 3. the site's `product_title` / `price` CSS selectors, a single record.

use scraper::{Html, Selector};
use serde_json::{Value, json};
use trawl_core::models::{PRODUCT_URL_FIELD, Record};
use trawl_core::profile::SiteConfig;
use trawl_core::traits::Extractor;
use url::Url;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLdExtractor;

impl Extractor for JsonLdExtractor {
    fn extract(&self, html: &str, product_url: &str, site: &SiteConfig) -> Vec<Record> {
        let document = Html::parse_document(html);
        let ctx = Context { product_url, site };

        let records = from_json_ld(&document, &ctx);
        if !records.is_empty() {
            return records;
        }
        let records = from_shopify_json(&document, &ctx);
        if !records.is_empty() {
            return records;
        }
        from_selectors(&document, &ctx)
    }
}

struct Context<'a> {
    product_url: &'a str,
    site: &'a SiteConfig,
}

impl Context<'_> {
    fn record(&self, title: &str) -> Record {
        let mut record = Record::new();
        record.insert(PRODUCT_URL_FIELD.into(), json!(self.product_url));
        record.insert("title".into(), json!(title.trim()));
        record.insert("brand".into(), json!(self.site.brand_name()));
        record.insert("source_site".into(), json!(self.site.source_site()));
        record
    }

    fn absolute(&self, src: &str) -> String {
        let src = src.trim();
        let src = if src.starts_with("//") {
            format!("https:{src}")
        } else {
            src.to_string()
        };
        Url::parse(&self.site.base_url)
            .and_then(|base| base.join(&src))
            .map(String::from)
            .unwrap_or(src)
    }
}

fn script_texts(document: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|el| el.inner_html().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

// ── JSON-LD ────────────────────────────────────────────────────────────────

fn from_json_ld(document: &Html, ctx: &Context<'_>) -> Vec<Record> {
    let mut records = Vec::new();
    for text in script_texts(document, r#"script[type="application/ld+json"]"#) {
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            tracing::debug!(url = %ctx.product_url, "Skipping malformed JSON-LD block");
            continue;
        };
        collect_products(&value, &mut |product| records.extend(product_records(product, ctx)));
    }
    records
}

fn collect_products(value: &Value, visit: &mut impl FnMut(&Value)) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_products(item, visit)),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_products(graph, visit);
            }
            if is_product(value) {
                visit(value);
            }
        }
        _ => {}
    }
}

fn is_product(value: &Value) -> bool {
    let matches = |t: &str| t == "Product" || t == "ProductGroup";
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn product_records(product: &Value, ctx: &Context<'_>) -> Vec<Record> {
    let name = str_field(product, "name").unwrap_or_default();
    let base = {
        let mut record = ctx.record(&name);
        if let Some(brand) = product.get("brand").and_then(brand_name) {
            record.insert("brand".into(), json!(brand));
        }
        if let Some(image) = product.get("image").and_then(first_image) {
            record.insert("image_url".into(), json!(ctx.absolute(&image)));
        }
        if let Some(desc) = str_field(product, "description") {
            record.insert("description".into(), json!(desc));
        }
        if let Some(sku) = str_field(product, "sku") {
            record.insert("sku".into(), json!(sku));
        }
        record
    };

    // ProductGroup: each variant is itself a Product.
    if let Some(variants) = product.get("hasVariant").and_then(Value::as_array) {
        let records: Vec<Record> = variants
            .iter()
            .flat_map(|variant| {
                let mut record = base.clone();
                apply_variant(&mut record, variant, ctx);
                let offers = offers_of(variant);
                if offers.is_empty() {
                    return vec![record];
                }
                offers
                    .into_iter()
                    .map(|offer| with_offer(record.clone(), offer))
                    .collect::<Vec<_>>()
            })
            .collect();
        if !records.is_empty() {
            return records;
        }
    }

    let offers = offers_of(product);
    if offers.is_empty() {
        return vec![base];
    }
    offers
        .into_iter()
        .map(|offer| with_offer(base.clone(), offer))
        .collect()
}

fn apply_variant(record: &mut Record, variant: &Value, ctx: &Context<'_>) {
    if let Some(name) = str_field(variant, "name") {
        record.insert("variant".into(), json!(name));
    }
    if let Some(sku) = str_field(variant, "sku") {
        record.insert("sku".into(), json!(sku));
    }
    if let Some(image) = variant.get("image").and_then(first_image) {
        record.insert("image_url".into(), json!(ctx.absolute(&image)));
    }
}

fn offers_of(product: &Value) -> Vec<&Value> {
    match product.get("offers") {
        Some(Value::Array(offers)) => offers.iter().collect(),
        Some(offer @ Value::Object(map)) => match map.get("offers") {
            // AggregateOffer wrapping individual offers
            Some(Value::Array(inner)) if !inner.is_empty() => inner.iter().collect(),
            _ => vec![offer],
        },
        _ => Vec::new(),
    }
}

fn with_offer(mut record: Record, offer: &Value) -> Record {
    let price = offer
        .get("price")
        .or_else(|| offer.get("lowPrice"))
        .and_then(number);
    if let Some(price) = price {
        record.insert("price".into(), json!(price));
    }
    if let Some(currency) = str_field(offer, "priceCurrency") {
        record.insert("currency".into(), json!(currency));
    }
    if let Some(availability) = str_field(offer, "availability") {
        let short = availability.rsplit('/').next().unwrap_or(availability.as_str());
        record.insert("availability".into(), json!(short));
    }
    if let Some(sku) = str_field(offer, "sku") {
        record.insert("sku".into(), json!(sku));
    }
    if let Some(name) = str_field(offer, "name") {
        record.entry("variant").or_insert_with(|| json!(name));
    }
    record
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn brand_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => str_field(value, "name"),
        _ => None,
    }
}

fn first_image(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_image),
        Value::Object(_) => str_field(value, "url").or_else(|| str_field(value, "contentUrl")),
        _ => None,
    }
}

// ── Shopify ProductJson ────────────────────────────────────────────────────

fn from_shopify_json(document: &Html, ctx: &Context<'_>) -> Vec<Record> {
    for text in script_texts(document, r#"script[id^="ProductJson"]"#) {
        let Ok(product) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let title = str_field(&product, "title").unwrap_or_default();
        let mut base = ctx.record(&title);
        if let Some(vendor) = str_field(&product, "vendor") {
            base.insert("brand".into(), json!(vendor));
        }
        if let Some(image) = product.get("featured_image").and_then(first_image) {
            base.insert("image_url".into(), json!(ctx.absolute(&image)));
        }

        let variants = product
            .get("variants")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if variants.is_empty() {
            return vec![base];
        }

        return variants
            .iter()
            .map(|variant| {
                let mut record = base.clone();
                if let Some(name) = str_field(variant, "title") {
                    record.insert("variant".into(), json!(name));
                }
                if let Some(sku) = str_field(variant, "sku") {
                    record.insert("sku".into(), json!(sku));
                }
                // Shopify prices are integer cents.
                if let Some(cents) = variant.get("price").and_then(number) {
                    record.insert("price".into(), json!(cents / 100.0));
                }
                if let Some(available) = variant.get("available").and_then(Value::as_bool) {
                    let label = if available { "InStock" } else { "OutOfStock" };
                    record.insert("availability".into(), json!(label));
                }
                record
            })
            .collect();
    }
    Vec::new()
}

// ── CSS selectors ──────────────────────────────────────────────────────────

fn select_text(document: &Html, site: &SiteConfig, key: &str) -> Option<String> {
    let raw = site.selectors.get(key)?;
    let sel = Selector::parse(raw).ok()?;
    document
        .select(&sel)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
}

fn from_selectors(document: &Html, ctx: &Context<'_>) -> Vec<Record> {
    let Some(title) = select_text(document, ctx.site, "product_title") else {
        return Vec::new();
    };
    let mut record = ctx.record(&title);

    if let Some(price_raw) = select_text(document, ctx.site, "price") {
        let digits: String = price_raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(price) = digits.parse::<f64>() {
            record.insert("price".into(), json!(price));
        }
        record.insert("price_raw".into(), json!(price_raw));
    }
    if let Some(materials) = select_text(document, ctx.site, "materials") {
        record.insert("materials".into(), json!(materials));
    }
    vec![record]
}
