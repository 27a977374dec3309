//! Terminal output.

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rusty_money::iso::Currency;

use storefront_cart::{
    catalog::StaticCatalog,
    items::LineItem,
    pricing::{AppliedRule, money_from_minor},
    projection::CartView,
};

#[expect(clippy::print_stdout, reason = "the CLI reports on stdout")]
pub(crate) fn message(text: &str) {
    println!("{text}");
}

#[expect(clippy::print_stdout, reason = "the CLI reports on stdout")]
pub(crate) fn line_changed(action: &str, item: &LineItem) {
    println!("{action} line {} (quantity {})", item.uuid, item.quantity);
}

#[expect(clippy::print_stdout, reason = "the CLI reports on stdout")]
pub(crate) fn products(catalog: &StaticCatalog) {
    let currency = catalog.currency();

    for product in catalog.products() {
        let price = money_from_minor(product.price, currency)
            .map_or_else(|_error| "n/a".to_string(), |price| price.to_string());

        println!("{}  {:<32} {price}", product.uuid, product.name);
    }

    for rule in catalog.rules().iter().filter(|rule| rule.active) {
        println!(
            "{}  {} bundle: {}% off",
            rule.product,
            rule.kind,
            percent_points(rule.discount)
        );
    }
}

#[expect(clippy::print_stdout, reason = "the CLI reports on stdout")]
pub(crate) fn view(view: &CartView, currency: &'static Currency) {
    if view.is_empty() {
        println!("cart is empty");
        return;
    }

    for line in &view.lines {
        let tier = line
            .item
            .bundle
            .as_ref()
            .map_or_else(String::new, |bundle| format!(" [{}]", bundle.kind()));

        println!(
            "{}  {} x{}{tier}",
            line.item.uuid, line.product.name, line.item.quantity
        );

        if line.pricing.savings.to_minor_units() == 0 {
            println!("    {}", line.pricing.final_price);
        } else {
            let label = match &line.pricing.applied_rule {
                Some(AppliedRule::Dynamic(rule)) => {
                    format!("{}% off", percent_points(rule.discount))
                }
                Some(AppliedRule::Preset(option)) => option.discount_label(currency),
                None => String::new(),
            };

            println!(
                "    {} -> {} (you save {}) {label}",
                line.pricing.original_price, line.pricing.final_price, line.pricing.savings
            );
        }
    }

    println!(
        "items: {}  total: {}  savings: {}",
        view.aggregate.total_item_count, view.aggregate.total_price, view.aggregate.total_savings
    );
}

/// Fractional percentage as percent points, e.g. 0.15 as 15.
fn percent_points(percentage: Percentage) -> Decimal {
    ((percentage * Decimal::ONE) * Decimal::ONE_HUNDRED)
        .round_dp(2)
        .normalize()
}
