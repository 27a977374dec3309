//! Pricing
//!
//! Pure bundle pricing. Identical inputs always give identical results, so projections can be
//! recomputed on every render without drift.

use decimal_percentage::Percentage;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::{
    bundles::{BundleKind, BundleOption, BundleRule},
    products::ProductUuid,
};

/// Errors specific to bundle price calculations.
#[derive(Debug, Error)]
pub enum PricingError {
    /// An amount does not fit in signed minor units.
    #[error("amount overflowed minor units")]
    Overflow,

    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Which discount produced a [`BundleSavings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppliedRule {
    /// A dynamic percentage rule from the rule source.
    Dynamic(BundleRule),

    /// The fixed preset carried by the line's bundle option.
    Preset(BundleOption),
}

/// Price breakdown for one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleSavings<'a> {
    /// Unit price times quantity
    pub original_price: Money<'a, Currency>,

    /// Amount taken off the original price
    pub discount_amount: Money<'a, Currency>,

    /// Price actually charged, never negative
    pub final_price: Money<'a, Currency>,

    /// Original minus final price
    pub savings: Money<'a, Currency>,

    /// Rule responsible for the discount, if any
    pub applied_rule: Option<AppliedRule>,
}

impl<'a> BundleSavings<'a> {
    /// Breakdown with no discount applied.
    fn undiscounted(original_price: Money<'a, Currency>) -> Self {
        let zero = Money::from_minor(0, original_price.currency());

        Self {
            original_price,
            discount_amount: zero,
            final_price: original_price,
            savings: zero,
            applied_rule: None,
        }
    }

    /// Breakdown for a discount in minor units, clamped so the final price stays non-negative.
    fn discounted(
        original_price: Money<'a, Currency>,
        discount_minor: i64,
        applied_rule: AppliedRule,
    ) -> Result<Self, PricingError> {
        let currency = original_price.currency();
        let original_minor = original_price.to_minor_units();
        let discount_minor = discount_minor.min(original_minor).max(0);

        let discount_amount = Money::from_minor(discount_minor, currency);
        let final_price = original_price.sub(discount_amount)?;

        Ok(Self {
            original_price,
            discount_amount,
            final_price,
            savings: discount_amount,
            applied_rule: Some(applied_rule),
        })
    }
}

/// Calculate a line's price from dynamic bundle rules.
///
/// Only active rules for the same product and tier are considered. When several match, the
/// first one wins. Lines without a bundle tier are priced per unit.
///
/// # Errors
///
/// - [`PricingError::Overflow`]: the original price does not fit in minor units.
/// - [`PricingError::PercentConversion`]: the discount could not be represented.
/// - [`PricingError::Money`]: money arithmetic failed.
pub fn compute_bundle_pricing<'a>(
    unit_price: Money<'a, Currency>,
    quantity: u32,
    product: ProductUuid,
    kind: Option<BundleKind>,
    rules: &[BundleRule],
) -> Result<BundleSavings<'a>, PricingError> {
    let original_price = original_price(unit_price, quantity)?;

    let rule = kind.and_then(|kind| rules.iter().find(|rule| rule.applies_to(product, kind)));

    let Some(rule) = rule else {
        return Ok(BundleSavings::undiscounted(original_price));
    };

    let discount_minor = percent_of_minor(&rule.discount, original_price.to_minor_units())?;

    BundleSavings::discounted(original_price, discount_minor, AppliedRule::Dynamic(*rule))
}

/// Calculate a line's price from the fixed discount carried by its bundle option.
///
/// The discount applies once per complete bundle in the quantity.
///
/// # Errors
///
/// - [`PricingError::Overflow`]: an amount does not fit in minor units.
/// - [`PricingError::Money`]: money arithmetic failed.
pub fn compute_preset_pricing<'a>(
    unit_price: Money<'a, Currency>,
    quantity: u32,
    option: &BundleOption,
) -> Result<BundleSavings<'a>, PricingError> {
    let original_price = original_price(unit_price, quantity)?;

    let bundles = quantity / option.units_per_bundle();
    let per_bundle =
        i64::try_from(option.discount_amount()).map_err(|_overflow| PricingError::Overflow)?;

    if bundles == 0 || per_bundle == 0 {
        return Ok(BundleSavings::undiscounted(original_price));
    }

    let discount_minor = per_bundle
        .checked_mul(i64::from(bundles))
        .ok_or(PricingError::Overflow)?;

    BundleSavings::discounted(original_price, discount_minor, AppliedRule::Preset(*option))
}

/// Price a line, preferring a dynamic rule and falling back to the option's preset.
///
/// # Errors
///
/// Returns a [`PricingError`] if any of the underlying calculations fail.
pub fn price_line<'a>(
    unit_price: Money<'a, Currency>,
    quantity: u32,
    product: ProductUuid,
    option: Option<&BundleOption>,
    rules: &[BundleRule],
    presets_enabled: bool,
) -> Result<BundleSavings<'a>, PricingError> {
    let dynamic = compute_bundle_pricing(
        unit_price,
        quantity,
        product,
        option.map(BundleOption::kind),
        rules,
    )?;

    match option {
        Some(option) if presets_enabled && dynamic.applied_rule.is_none() => {
            compute_preset_pricing(unit_price, quantity, option)
        }
        _ => Ok(dynamic),
    }
}

/// Convert an unsigned minor-unit amount into money.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] if the amount does not fit in signed minor units.
pub fn money_from_minor(
    minor: u64,
    currency: &'static Currency,
) -> Result<Money<'static, Currency>, PricingError> {
    let minor = i64::try_from(minor).map_err(|_overflow| PricingError::Overflow)?;

    Ok(Money::from_minor(minor, currency))
}

fn original_price<'a>(
    unit_price: Money<'a, Currency>,
    quantity: u32,
) -> Result<Money<'a, Currency>, PricingError> {
    let minor = unit_price
        .to_minor_units()
        .checked_mul(i64::from(quantity))
        .ok_or(PricingError::Overflow)?;

    Ok(Money::from_minor(minor, unit_price.currency()))
}

/// Calculate a percentage of a minor unit amount, rounding half away from zero.
fn percent_of_minor(percent: &Percentage, minor: i64) -> Result<i64, PricingError> {
    let minor = Decimal::from_i64(minor).ok_or(PricingError::PercentConversion)?;

    ((*percent) * Decimal::ONE)
        .checked_mul(minor)
        .ok_or(PricingError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(PricingError::PercentConversion)
}
