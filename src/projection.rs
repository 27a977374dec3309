//! Cart Projection
//!
//! Derives the read-only view the UI renders from the raw line items. [`project_lines`] is the
//! pure core; [`CartProjection`] gathers its inputs from the catalog collaborators first.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;
use tracing::warn;

use crate::{
    bundles::{BundleRule, BundleRuleSource},
    items::LineItem,
    pricing::{BundleSavings, PricingError, money_from_minor, price_line},
    products::{ProductLookup, ProductSnapshot, ProductUuid},
};

/// Errors raised while projecting a cart.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Pricing a line failed.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Summing line totals failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Which store the projected lines came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartMode {
    /// Authentication has not resolved yet.
    #[default]
    Uninitialized,

    /// Anonymous shopper, lines live in local storage.
    Guest,

    /// Signed-in shopper, lines live in the remote cart.
    Authenticated,
}

/// A line enriched with product data and pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedLine {
    /// Underlying line
    pub item: LineItem,

    /// Product details used for display and pricing
    pub product: ProductSnapshot,

    /// Whether the product still resolves in the catalog
    pub available: bool,

    /// Price breakdown
    pub pricing: BundleSavings<'static>,
}

/// Cart totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartAggregate {
    /// Sum of quantities
    pub total_item_count: u64,

    /// Sum of final line prices
    pub total_price: Money<'static, Currency>,

    /// Sum of line savings
    pub total_savings: Money<'static, Currency>,
}

impl CartAggregate {
    /// Totals of an empty cart.
    #[must_use]
    pub fn empty(currency: &'static Currency) -> Self {
        Self {
            total_item_count: 0,
            total_price: Money::from_minor(0, currency),
            total_savings: Money::from_minor(0, currency),
        }
    }
}

/// Everything the UI needs to render a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartView {
    /// Store the lines came from
    pub mode: CartMode,

    /// Enriched lines, in cart order
    pub lines: Vec<ProjectedLine>,

    /// Totals over `lines`
    pub aggregate: CartAggregate,
}

impl CartView {
    /// View of an empty cart.
    #[must_use]
    pub fn empty(mode: CartMode, currency: &'static Currency) -> Self {
        Self {
            mode,
            lines: Vec::new(),
            aggregate: CartAggregate::empty(currency),
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Price every line and total the cart.
///
/// Product details come from `products` when present, then from the line's cached snapshot,
/// and otherwise a zero-priced placeholder.
///
/// # Errors
///
/// Returns a [`ProjectionError`] if a line cannot be priced or the totals overflow.
pub fn project_lines(
    items: &[LineItem],
    products: &FxHashMap<ProductUuid, ProductSnapshot>,
    rules: &[BundleRule],
    currency: &'static Currency,
    presets_enabled: bool,
) -> Result<(Vec<ProjectedLine>, CartAggregate), ProjectionError> {
    let mut aggregate = CartAggregate::empty(currency);
    let mut lines = Vec::with_capacity(items.len());

    for item in items {
        let (product, available) = match (products.get(&item.product), &item.cached_product) {
            (Some(fresh), _) => (fresh.clone(), !fresh.is_placeholder()),
            (None, Some(cached)) => (cached.clone(), !cached.is_placeholder()),
            (None, None) => (ProductSnapshot::placeholder(), false),
        };

        let pricing = price_line(
            money_from_minor(product.unit_price, currency)?,
            item.quantity,
            item.product,
            item.bundle.as_ref(),
            rules,
            presets_enabled,
        )?;

        aggregate.total_item_count += u64::from(item.quantity);
        aggregate.total_price = aggregate.total_price.add(pricing.final_price)?;
        aggregate.total_savings = aggregate.total_savings.add(pricing.savings)?;

        lines.push(ProjectedLine {
            item: item.clone(),
            product,
            available,
            pricing,
        });
    }

    Ok((lines, aggregate))
}

/// Builds [`CartView`]s, resolving product data and bundle rules from the catalog.
#[derive(Clone)]
pub struct CartProjection {
    products: Arc<dyn ProductLookup>,
    rules: Arc<dyn BundleRuleSource>,
    currency: &'static Currency,
    presets_enabled: bool,
}

impl std::fmt::Debug for CartProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartProjection")
            .field("currency", &self.currency.iso_alpha_code)
            .field("presets_enabled", &self.presets_enabled)
            .finish_non_exhaustive()
    }
}

impl CartProjection {
    /// Create a projection pricing in `currency`.
    pub fn new(
        products: Arc<dyn ProductLookup>,
        rules: Arc<dyn BundleRuleSource>,
        currency: &'static Currency,
        presets_enabled: bool,
    ) -> Self {
        Self {
            products,
            rules,
            currency,
            presets_enabled,
        }
    }

    /// Currency all prices are expressed in.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Product lookup collaborator.
    #[must_use]
    pub fn products(&self) -> &dyn ProductLookup {
        self.products.as_ref()
    }

    /// Project `items` into a view.
    ///
    /// Catalog failures are not fatal: a failed product lookup falls back to the cached
    /// snapshot, and a failed rule query prices without dynamic rules.
    ///
    /// # Errors
    ///
    /// Returns a [`ProjectionError`] if pricing or totalling fails.
    pub async fn project(
        &self,
        mode: CartMode,
        items: &[LineItem],
    ) -> Result<CartView, ProjectionError> {
        if items.is_empty() {
            return Ok(CartView::empty(mode, self.currency));
        }

        let mut product_uuids: Vec<ProductUuid> = items.iter().map(|item| item.product).collect();

        product_uuids.sort_unstable();
        product_uuids.dedup();

        let mut products: FxHashMap<ProductUuid, ProductSnapshot> = FxHashMap::default();

        for &product in &product_uuids {
            match self.products.get_product(product).await {
                Ok(Some(found)) => {
                    products.insert(product, found.snapshot());
                }
                Ok(None) => {
                    products.insert(product, ProductSnapshot::placeholder());
                }
                Err(error) => {
                    warn!(
                        product_uuid = %product,
                        %error,
                        "product lookup failed, using cached details"
                    );
                }
            }
        }

        let rules = match self.rules.get_bundle_rules(&product_uuids).await {
            Ok(rules) => rules,
            Err(error) => {
                warn!(%error, "bundle rule lookup failed, pricing without dynamic rules");
                Vec::new()
            }
        };

        let (lines, aggregate) =
            project_lines(items, &products, &rules, self.currency, self.presets_enabled)?;

        Ok(CartView {
            mode,
            lines,
            aggregate,
        })
    }
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use rusty_money::iso::USD;
    use testresult::TestResult;

    use super::*;
    use crate::{
        bundles::{BundleKind, BundleOption, MockBundleRuleSource},
        items::total_quantity,
        products::{LookupError, MockProductLookup, Product},
    };

    fn snapshot(price: u64) -> ProductSnapshot {
        ProductSnapshot {
            name: "Serum".to_string(),
            unit_price: price,
            image: None,
        }
    }

    #[test]
    fn totals_follow_line_pricing() -> TestResult {
        let serum = ProductUuid::new();
        let mask = ProductUuid::new();

        let items = [
            LineItem::new(serum, 2, Some(BundleOption::Double { discount: 0 })),
            LineItem::new(mask, 3, None),
        ];

        let products = FxHashMap::from_iter([(serum, snapshot(50_00)), (mask, snapshot(10_00))]);
        let rules = [BundleRule {
            product: serum,
            kind: BundleKind::Double,
            discount: Percentage::from(0.15),
            active: true,
        }];

        let (lines, aggregate) = project_lines(&items, &products, &rules, USD, false)?;

        assert_eq!(lines.len(), 2);
        assert_eq!(aggregate.total_item_count, total_quantity(&items));
        assert_eq!(aggregate.total_price, Money::from_minor(115_00, USD));
        assert_eq!(aggregate.total_savings, Money::from_minor(15_00, USD));

        Ok(())
    }

    #[test]
    fn projection_is_idempotent() -> TestResult {
        let product = ProductUuid::new();
        let items = [LineItem::new(product, 4, Some(BundleOption::Triple { discount: 2_00 }))];
        let products = FxHashMap::from_iter([(product, snapshot(7_99))]);

        let first = project_lines(&items, &products, &[], USD, true)?;
        let second = project_lines(&items, &products, &[], USD, true)?;

        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn cached_snapshot_is_used_when_catalog_is_silent() -> TestResult {
        let mut item = LineItem::new(ProductUuid::new(), 2, None);
        item.cached_product = Some(snapshot(3_00));

        let (lines, aggregate) = project_lines(&[item], &FxHashMap::default(), &[], USD, true)?;

        assert!(lines.iter().all(|line| line.available));
        assert_eq!(aggregate.total_price, Money::from_minor(6_00, USD));

        Ok(())
    }

    #[test]
    fn unresolved_products_are_kept_as_placeholders() -> TestResult {
        let item = LineItem::new(ProductUuid::new(), 1, None);

        let (lines, aggregate) = project_lines(&[item], &FxHashMap::default(), &[], USD, true)?;

        let line = lines.first().ok_or("missing line")?;

        assert!(!line.available);
        assert!(line.product.is_placeholder());
        assert_eq!(aggregate.total_item_count, 1);
        assert_eq!(aggregate.total_price, Money::from_minor(0, USD));

        Ok(())
    }

    #[tokio::test]
    async fn empty_cart_skips_the_catalog() -> TestResult {
        let projection = CartProjection::new(
            Arc::new(MockProductLookup::new()),
            Arc::new(MockBundleRuleSource::new()),
            USD,
            true,
        );

        let view = projection.project(CartMode::Guest, &[]).await?;

        assert!(view.is_empty());
        assert_eq!(view.aggregate, CartAggregate::empty(USD));

        Ok(())
    }

    #[tokio::test]
    async fn catalog_failures_degrade_gracefully() -> TestResult {
        let product = ProductUuid::new();
        let mut item = LineItem::new(product, 2, None);
        item.cached_product = Some(snapshot(4_00));

        let mut products = MockProductLookup::new();
        products
            .expect_get_product()
            .returning(|_| Err(LookupError::Unavailable("down".to_string())));

        let mut rules = MockBundleRuleSource::new();
        rules
            .expect_get_bundle_rules()
            .times(1)
            .returning(|_| Err(LookupError::Unavailable("down".to_string())));

        let projection = CartProjection::new(Arc::new(products), Arc::new(rules), USD, true);
        let view = projection.project(CartMode::Guest, &[item]).await?;

        assert_eq!(view.aggregate.total_price, Money::from_minor(8_00, USD));

        Ok(())
    }

    #[tokio::test]
    async fn fresh_product_data_wins_over_cache() -> TestResult {
        let product = ProductUuid::new();
        let mut item = LineItem::new(product, 1, None);
        item.cached_product = Some(snapshot(4_00));

        let mut products = MockProductLookup::new();
        products.expect_get_product().returning(move |uuid| {
            Ok(Some(Product {
                uuid,
                name: "Serum".to_string(),
                price: 5_00,
                image: None,
            }))
        });

        let mut rules = MockBundleRuleSource::new();
        rules.expect_get_bundle_rules().returning(|_| Ok(Vec::new()));

        let projection = CartProjection::new(Arc::new(products), Arc::new(rules), USD, true);
        let view = projection.project(CartMode::Authenticated, &[item]).await?;

        assert_eq!(view.mode, CartMode::Authenticated);
        assert_eq!(view.aggregate.total_price, Money::from_minor(5_00, USD));

        Ok(())
    }
}
