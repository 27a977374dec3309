//! Bundles
//!
//! A bundle option is a named purchase tier (single, double, triple) that a shopper picks when
//! adding a product. Discounts come from two places: dynamic [`BundleRule`]s served by an
//! external rule source, and the fixed amounts carried by the option itself, which act as a
//! fallback preset when no dynamic rule matches.

use std::fmt;

use async_trait::async_trait;
use decimal_percentage::Percentage;
use mockall::automock;
use rusty_money::{Money, iso::Currency};
use serde::{Deserialize, Serialize};

use crate::products::{LookupError, ProductUuid};

/// Closed set of bundle tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    /// One unit, never discounted by a preset.
    Single,

    /// Two units per bundle.
    Double,

    /// Three units per bundle.
    Triple,
}

impl BundleKind {
    /// Units making up one complete bundle of this kind.
    #[must_use]
    pub fn units_per_bundle(self) -> u32 {
        match self {
            BundleKind::Single => 1,
            BundleKind::Double => 2,
            BundleKind::Triple => 3,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Single => "single",
            BundleKind::Double => "double",
            BundleKind::Triple => "triple",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bundle option attached to a line item.
///
/// Discounts are fixed amounts in minor units of the cart currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleOption {
    /// Plain single unit.
    Single,

    /// Two-unit bundle with a fixed discount per bundle.
    Double {
        /// Discount per complete bundle
        discount: u64,
    },

    /// Three-unit bundle with a fixed discount per bundle.
    Triple {
        /// Discount per complete bundle
        discount: u64,
    },
}

impl BundleOption {
    /// Tier of this option.
    #[must_use]
    pub fn kind(&self) -> BundleKind {
        match self {
            BundleOption::Single => BundleKind::Single,
            BundleOption::Double { .. } => BundleKind::Double,
            BundleOption::Triple { .. } => BundleKind::Triple,
        }
    }

    /// Units making up one complete bundle.
    #[must_use]
    pub fn units_per_bundle(&self) -> u32 {
        self.kind().units_per_bundle()
    }

    /// Fixed discount per complete bundle, in minor units.
    #[must_use]
    pub fn discount_amount(&self) -> u64 {
        match self {
            BundleOption::Single => 0,
            BundleOption::Double { discount } | BundleOption::Triple { discount } => *discount,
        }
    }

    /// Human readable discount label, empty when the option carries no discount.
    #[must_use]
    pub fn discount_label(&self, currency: &'static Currency) -> String {
        let amount = self.discount_amount();

        if amount == 0 {
            return String::new();
        }

        match i64::try_from(amount) {
            Ok(minor) => format!("Save {} per {}", Money::from_minor(minor, currency), self.kind()),
            Err(_overflow) => format!("Save on every {}", self.kind()),
        }
    }
}

/// Fixed preset table used when no dynamic rule source covers a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundlePresets {
    /// Discount per double bundle, in minor units
    pub double_discount: u64,

    /// Discount per triple bundle, in minor units
    pub triple_discount: u64,
}

impl BundlePresets {
    /// Build the option for a tier from the preset table.
    #[must_use]
    pub fn option(&self, kind: BundleKind) -> BundleOption {
        match kind {
            BundleKind::Single => BundleOption::Single,
            BundleKind::Double => BundleOption::Double {
                discount: self.double_discount,
            },
            BundleKind::Triple => BundleOption::Triple {
                discount: self.triple_discount,
            },
        }
    }
}

impl Default for BundlePresets {
    fn default() -> Self {
        Self {
            double_discount: 5_00,
            triple_discount: 15_00,
        }
    }
}

/// Externally configured percentage discount for a product and bundle tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleRule {
    /// Product the rule applies to
    pub product: ProductUuid,

    /// Tier the rule applies to
    pub kind: BundleKind,

    /// Discount as a fraction of the original price (`0.15` is 15%)
    pub discount: Percentage,

    /// Inactive rules are ignored
    pub active: bool,
}

impl BundleRule {
    /// Whether this rule is active and targets the given product and tier.
    #[must_use]
    pub fn applies_to(&self, product: ProductUuid, kind: BundleKind) -> bool {
        self.active && self.product == product && self.kind == kind
    }
}

/// Source of dynamic bundle rules, queried in batch for every product in the cart.
#[automock]
#[async_trait]
pub trait BundleRuleSource: Send + Sync {
    /// Rules for any of the given products; inactive rules may be included.
    async fn get_bundle_rules(
        &self,
        products: &[ProductUuid],
    ) -> Result<Vec<BundleRule>, LookupError>;
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::USD;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn options_expose_their_tier() {
        let presets = BundlePresets::default();

        assert_eq!(presets.option(BundleKind::Single).kind(), BundleKind::Single);
        assert_eq!(presets.option(BundleKind::Double).units_per_bundle(), 2);
        assert_eq!(presets.option(BundleKind::Triple).discount_amount(), 15_00);
    }

    #[test]
    fn single_has_no_label() {
        assert_eq!(BundleOption::Single.discount_label(USD), "");
    }

    #[test]
    fn double_label_mentions_amount() {
        let label = BundleOption::Double { discount: 5_00 }.discount_label(USD);

        assert!(label.contains("5.00"), "unexpected label {label}");
        assert!(label.ends_with("double"), "unexpected label {label}");
    }

    #[test]
    fn option_serialises_as_tagged_variant() -> TestResult {
        let json = serde_json::to_string(&BundleOption::Triple { discount: 300 })?;

        assert_eq!(json, r#"{"kind":"triple","discount":300}"#);

        let back: BundleOption = serde_json::from_str(r#"{"kind":"single"}"#)?;

        assert_eq!(back, BundleOption::Single);

        Ok(())
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed = serde_json::from_str::<BundleOption>(r#"{"kind":"quadruple"}"#);

        assert!(parsed.is_err());
    }

    #[test]
    fn inactive_rule_never_applies() {
        let product = ProductUuid::new();
        let rule = BundleRule {
            product,
            kind: BundleKind::Double,
            discount: Percentage::from(0.15),
            active: false,
        };

        assert!(!rule.applies_to(product, BundleKind::Double));
        assert!(
            BundleRule { active: true, ..rule }.applies_to(product, BundleKind::Double),
            "active rule should apply"
        );
    }
}
