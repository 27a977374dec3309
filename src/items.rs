//! Line Items

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    bundles::{BundleKind, BundleOption},
    products::{ProductSnapshot, ProductUuid},
    uuids::TypedUuid,
};

/// Line Item UUID
pub type LineItemUuid = TypedUuid<LineItem>;

/// One row of a cart.
///
/// A line with a quantity of zero never exists; driving the quantity down to zero removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Line UUID, generated locally for guest carts and assigned by the backend otherwise
    pub uuid: LineItemUuid,

    /// Catalog product
    pub product: ProductUuid,

    /// Number of units, at least one
    pub quantity: u32,

    /// Bundle tier, absent for plain per-unit pricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleOption>,

    /// Last-known product details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_product: Option<ProductSnapshot>,

    /// When the line was first added
    pub created_at: Timestamp,

    /// When the line was last changed
    pub updated_at: Timestamp,
}

impl LineItem {
    /// Create a new line with a fresh UUID.
    ///
    /// A zero quantity is raised to one.
    #[must_use]
    pub fn new(product: ProductUuid, quantity: u32, bundle: Option<BundleOption>) -> Self {
        let now = Timestamp::now();

        Self {
            uuid: LineItemUuid::new(),
            product,
            quantity: quantity.max(1),
            bundle,
            cached_product: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tier of the line's bundle option, if any.
    #[must_use]
    pub fn bundle_kind(&self) -> Option<BundleKind> {
        self.bundle.as_ref().map(BundleOption::kind)
    }

    /// Whether this line is the one a `(product, tier)` add should increment.
    #[must_use]
    pub fn matches(&self, product: ProductUuid, kind: Option<BundleKind>) -> bool {
        self.product == product && self.bundle_kind() == kind
    }

    /// Whether the cached product details need refreshing.
    #[must_use]
    pub fn needs_hydration(&self) -> bool {
        self.cached_product
            .as_ref()
            .is_none_or(ProductSnapshot::is_placeholder)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Normalise a requested add quantity: anything below one becomes one.
#[must_use]
pub fn normalize_add_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity.max(1)).unwrap_or(u32::MAX)
}

/// Interpret a requested quantity update: `None` means the line should be removed.
#[must_use]
pub fn normalize_update_quantity(quantity: i64) -> Option<u32> {
    if quantity <= 0 {
        return None;
    }

    Some(u32::try_from(quantity).unwrap_or(u32::MAX))
}

/// Total units across a collection of lines.
#[must_use]
pub fn total_quantity(items: &[LineItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity)).sum()
}
