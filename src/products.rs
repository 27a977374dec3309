//! Products
//!
//! The catalog is owned elsewhere; the cart only ever reads product data through
//! [`ProductLookup`] and keeps a denormalised [`ProductSnapshot`] on each line for rendering
//! before the authoritative record arrives.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uuids::TypedUuid;

/// Product UUID
pub type ProductUuid = TypedUuid<Product>;

/// Label shown for lines whose product can no longer be resolved.
pub const UNAVAILABLE_PRODUCT_NAME: &str = "Unavailable product";

/// Errors raised by external catalog collaborators.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The collaborator could not be reached or answered with a failure.
    #[error("catalog lookup failed: {0}")]
    Unavailable(String),
}

/// Product record as served by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// Product UUID
    pub uuid: ProductUuid,

    /// Display name
    pub name: String,

    /// Unit price in minor units of the cart currency
    pub price: u64,

    /// Optional image reference
    pub image: Option<String>,
}

impl Product {
    /// Denormalised copy suitable for caching on a line item.
    #[must_use]
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            name: self.name.clone(),
            unit_price: self.price,
            image: self.image.clone(),
        }
    }
}

/// Last-known product details cached on a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Display name
    pub name: String,

    /// Unit price in minor units
    pub unit_price: u64,

    /// Optional image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProductSnapshot {
    /// Stand-in for a product that no longer resolves; priced at zero so totals stay honest.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            name: UNAVAILABLE_PRODUCT_NAME.to_string(),
            unit_price: 0,
            image: None,
        }
    }

    /// Whether this snapshot is the unresolved-product stand-in.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.unit_price == 0 && self.image.is_none() && self.name == UNAVAILABLE_PRODUCT_NAME
    }
}

/// Product lookup collaborator.
#[automock]
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// Fetch a single product, `None` when it no longer exists.
    async fn get_product(&self, product: ProductUuid) -> Result<Option<Product>, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_display_fields() {
        let product = Product {
            uuid: ProductUuid::new(),
            name: "Serum".to_string(),
            price: 50_00,
            image: Some("serum.png".to_string()),
        };

        let snapshot = product.snapshot();

        assert_eq!(snapshot.name, "Serum");
        assert_eq!(snapshot.unit_price, 50_00);
        assert_eq!(snapshot.image.as_deref(), Some("serum.png"));
        assert!(!snapshot.is_placeholder());
    }

    #[test]
    fn placeholder_is_recognised() {
        assert!(ProductSnapshot::placeholder().is_placeholder());
    }
}
