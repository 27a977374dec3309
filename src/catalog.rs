//! Static Catalog
//!
//! In-memory catalog loaded from YAML, serving both product lookups and bundle rules.
//!
//! ```yaml
//! products:
//!   serum:
//!     uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a69
//!     name: Vitamin C Serum
//!     price: 50.00 USD
//! bundles:
//!   - product: serum
//!     kind: double
//!     discount: 15%
//! ```

use std::{fs, path::Path};

use async_trait::async_trait;
use decimal_percentage::Percentage;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::{Findable, iso::Currency};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    bundles::{BundleKind, BundleRule, BundleRuleSource},
    products::{LookupError, Product, ProductLookup, ProductUuid},
};

/// Catalog loading errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// IO error reading the catalog file
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between products
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// Bundle rule references an unknown product
    #[error("Bundle rule references unknown product: {0}")]
    ProductNotFound(String),

    /// Two products share a UUID
    #[error("Duplicate product UUID: {0}")]
    DuplicateProduct(ProductUuid),
}

#[derive(Debug, Deserialize)]
struct CatalogFixture {
    #[serde(default)]
    products: FxHashMap<String, ProductFixture>,

    #[serde(default)]
    bundles: Vec<BundleFixture>,
}

#[derive(Debug, Deserialize)]
struct ProductFixture {
    uuid: ProductUuid,
    name: String,

    /// e.g. "50.00 USD"
    price: String,

    #[serde(default)]
    image: Option<String>,

    /// Discontinued products no longer resolve.
    #[serde(default)]
    discontinued: bool,
}

#[derive(Debug, Deserialize)]
struct BundleFixture {
    product: String,
    kind: BundleKind,

    /// e.g. "15%"
    discount: String,

    #[serde(default = "active_by_default")]
    active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone)]
struct Entry {
    product: Product,
    discontinued: bool,
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    currency: &'static Currency,
    entries: FxHashMap<ProductUuid, Entry>,
    keys: FxHashMap<String, ProductUuid>,
    rules: Vec<BundleRule>,
}

impl StaticCatalog {
    /// Parse a catalog from YAML.
    ///
    /// An empty catalog prices in `fallback_currency`; otherwise every product must share one
    /// currency.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the YAML is malformed, a price or percentage cannot be
    /// parsed, currencies disagree, or a bundle names an unknown product.
    pub fn from_yaml_str(
        yaml: &str,
        fallback_currency: &'static Currency,
    ) -> Result<Self, CatalogError> {
        let fixture: CatalogFixture = serde_norway::from_str(yaml)?;

        let mut currency: Option<&'static Currency> = None;
        let mut entries = FxHashMap::default();
        let mut keys = FxHashMap::default();

        for (key, product) in fixture.products {
            let (price, product_currency) = parse_price(&product.price)?;

            match currency {
                Some(expected) if expected != product_currency => {
                    return Err(CatalogError::CurrencyMismatch(
                        expected.iso_alpha_code.to_string(),
                        product_currency.iso_alpha_code.to_string(),
                    ));
                }
                Some(_) => {}
                None => currency = Some(product_currency),
            }

            let entry = Entry {
                product: Product {
                    uuid: product.uuid,
                    name: product.name,
                    price,
                    image: product.image,
                },
                discontinued: product.discontinued,
            };

            if entries.insert(product.uuid, entry).is_some() {
                return Err(CatalogError::DuplicateProduct(product.uuid));
            }

            keys.insert(key, product.uuid);
        }

        let rules = fixture
            .bundles
            .into_iter()
            .map(|bundle| {
                let product = keys
                    .get(&bundle.product)
                    .copied()
                    .ok_or_else(|| CatalogError::ProductNotFound(bundle.product.clone()))?;

                Ok(BundleRule {
                    product,
                    kind: bundle.kind,
                    discount: parse_percentage(&bundle.discount)?,
                    active: bundle.active,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        debug!(
            products = entries.len(),
            rules = rules.len(),
            "loaded static catalog"
        );

        Ok(Self {
            currency: currency.unwrap_or(fallback_currency),
            entries,
            keys,
            rules,
        })
    }

    /// Load a catalog file.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the file cannot be read or parsed.
    pub fn from_path(
        path: impl AsRef<Path>,
        fallback_currency: &'static Currency,
    ) -> Result<Self, CatalogError> {
        let yaml = fs::read_to_string(path)?;

        Self::from_yaml_str(&yaml, fallback_currency)
    }

    /// Currency the catalog prices in.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Resolve a catalog key or a product UUID.
    pub fn resolve(&self, reference: &str) -> Option<ProductUuid> {
        if let Some(uuid) = self.keys.get(reference) {
            return Some(*uuid);
        }

        let uuid = reference.parse::<uuid::Uuid>().ok()?;

        Some(ProductUuid::from_uuid(uuid))
    }

    /// Products that still resolve, sorted by name.
    pub fn products(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self
            .entries
            .values()
            .filter(|entry| !entry.discontinued)
            .map(|entry| &entry.product)
            .collect();

        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }

    /// Bundle rules in catalog order.
    pub fn rules(&self) -> &[BundleRule] {
        &self.rules
    }
}

#[async_trait]
impl ProductLookup for StaticCatalog {
    async fn get_product(&self, product: ProductUuid) -> Result<Option<Product>, LookupError> {
        Ok(self
            .entries
            .get(&product)
            .filter(|entry| !entry.discontinued)
            .map(|entry| entry.product.clone()))
    }
}

#[async_trait]
impl BundleRuleSource for StaticCatalog {
    async fn get_bundle_rules(
        &self,
        products: &[ProductUuid],
    ) -> Result<Vec<BundleRule>, LookupError> {
        Ok(self
            .rules
            .iter()
            .filter(|rule| products.contains(&rule.product))
            .copied()
            .collect())
    }
}

/// Parse a price string (e.g., "50.00 USD") into minor units and currency.
///
/// # Errors
///
/// Returns an error if the string is not in the format "AMOUNT CURRENCY", if the amount is not
/// a non-negative decimal, or if the currency code is not recognised.
pub fn parse_price(s: &str) -> Result<(u64, &'static Currency), CatalogError> {
    let parts: Vec<&str> = s.split_whitespace().collect();

    let [amount, currency_code] = parts.as_slice() else {
        return Err(CatalogError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let currency = Currency::find(&currency_code.to_ascii_uppercase())
        .ok_or_else(|| CatalogError::UnknownCurrency((*currency_code).to_string()))?;

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| CatalogError::InvalidPrice(s.to_string()))?;

    let minor_units = 10_u64
        .checked_pow(currency.exponent)
        .map(Decimal::from)
        .and_then(|scale| amount.checked_mul(scale))
        .and_then(|value| value.round_dp(0).to_u64())
        .ok_or_else(|| CatalogError::InvalidPrice(s.to_string()))?;

    Ok((minor_units, currency))
}

/// Parse a percentage string (e.g., "15%" or "0.15") into a [`Percentage`].
///
/// # Errors
///
/// Returns an error if the string cannot be parsed or the value is negative.
pub fn parse_percentage(s: &str) -> Result<Percentage, CatalogError> {
    let trimmed = s.trim();

    let (number, scale) = match trimmed.strip_suffix('%') {
        Some(percent) => (percent.trim(), 100.0),
        None => (trimmed, 1.0),
    };

    let value = number
        .parse::<f64>()
        .map_err(|_err| CatalogError::InvalidPercentage(s.to_string()))?;

    if !value.is_finite() || value < 0.0 {
        return Err(CatalogError::InvalidPercentage(s.to_string()));
    }

    Ok(Percentage::from(value / scale))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{EUR, JPY, USD};
    use testresult::TestResult;

    use super::*;

    const CATALOG: &str = r"
products:
  serum:
    uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a69
    name: Vitamin C Serum
    price: 50.00 USD
    image: serum.png
  mask:
    uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a6a
    name: Clay Mask
    price: 12.50 USD
  toner:
    uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a6b
    name: Old Toner
    price: 9.00 USD
    discontinued: true
bundles:
  - product: serum
    kind: double
    discount: 15%
  - product: mask
    kind: triple
    discount: 0.2
    active: false
";

    #[tokio::test]
    async fn loads_products_and_rules() -> TestResult {
        let catalog = StaticCatalog::from_yaml_str(CATALOG, EUR)?;
        let serum = catalog.resolve("serum").ok_or("serum missing")?;

        let product = catalog.get_product(serum).await?.ok_or("serum unresolved")?;

        assert_eq!(catalog.currency(), USD);
        assert_eq!(product.price, 50_00);
        assert_eq!(product.image.as_deref(), Some("serum.png"));

        let rules = catalog.get_bundle_rules(&[serum]).await?;

        assert_eq!(rules.len(), 1);
        assert!(rules.iter().all(|rule| rule.discount == Percentage::from(0.15)));

        Ok(())
    }

    #[tokio::test]
    async fn discontinued_products_do_not_resolve() -> TestResult {
        let catalog = StaticCatalog::from_yaml_str(CATALOG, USD)?;
        let toner = catalog.resolve("toner").ok_or("toner missing")?;

        assert!(catalog.get_product(toner).await?.is_none());
        assert_eq!(catalog.products().len(), 2);

        Ok(())
    }

    #[test]
    fn uuids_resolve_as_references() -> TestResult {
        let catalog = StaticCatalog::from_yaml_str(CATALOG, USD)?;

        let by_key = catalog.resolve("mask");
        let by_uuid = catalog.resolve("01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a6a");

        assert!(by_key.is_some());
        assert_eq!(by_key, by_uuid);
        assert!(catalog.resolve("nonsense").is_none());

        Ok(())
    }

    #[test]
    fn empty_catalog_uses_the_fallback_currency() -> TestResult {
        let catalog = StaticCatalog::from_yaml_str("products: {}", EUR)?;

        assert_eq!(catalog.currency(), EUR);
        assert!(catalog.rules().is_empty());

        Ok(())
    }

    #[test]
    fn mixed_currencies_are_rejected() {
        let yaml = r"
products:
  a:
    uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a69
    name: A
    price: 1.00 USD
  b:
    uuid: 01936f1c-6f0a-7c3e-9b8a-3f2d1c4b5a6a
    name: B
    price: 1.00 EUR
";

        let result = StaticCatalog::from_yaml_str(yaml, USD);

        assert!(matches!(result, Err(CatalogError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn bundles_must_reference_known_products() {
        let yaml = r"
bundles:
  - product: ghost
    kind: single
    discount: 5%
";

        let result = StaticCatalog::from_yaml_str(yaml, USD);

        assert!(matches!(result, Err(CatalogError::ProductNotFound(key)) if key == "ghost"));
    }

    #[test]
    fn parse_price_rejects_invalid_format() {
        let result = parse_price("2.99USD");

        assert!(matches!(result, Err(CatalogError::InvalidPrice(_))));
    }

    #[test]
    fn parse_price_rejects_negative_amounts() {
        let result = parse_price("-1.00 USD");

        assert!(matches!(result, Err(CatalogError::InvalidPrice(_))));
    }

    #[test]
    fn parse_price_rejects_unknown_currency() {
        let result = parse_price("2.99 ABC");

        assert!(matches!(result, Err(CatalogError::UnknownCurrency(code)) if code == "ABC"));
    }

    #[test]
    fn parse_price_follows_currency_exponent() -> TestResult {
        let (usd_minor, usd) = parse_price("1.50 USD")?;
        let (yen_minor, yen) = parse_price("500 JPY")?;

        assert_eq!((usd_minor, usd), (150, USD));
        assert_eq!((yen_minor, yen), (500, JPY));

        Ok(())
    }

    #[test]
    fn parse_percentage_accepts_both_formats() -> TestResult {
        assert_eq!(parse_percentage("15%")?, Percentage::from(0.15));
        assert_eq!(parse_percentage("  0.15 ")?, Percentage::from(0.15));
        assert_eq!(parse_percentage("100%")?, Percentage::from(1.0));

        Ok(())
    }

    #[test]
    fn parse_percentage_rejects_garbage_and_negatives() {
        assert!(matches!(
            parse_percentage("invalid"),
            Err(CatalogError::InvalidPercentage(_))
        ));
        assert!(matches!(
            parse_percentage("-5%"),
            Err(CatalogError::InvalidPercentage(_))
        ));
    }
}
