use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use storefront_cart::{
    bundles::BundleKind,
    catalog::StaticCatalog,
    config::{CartConfig, LoggingConfig},
    items::LineItemUuid,
    service::{AddOutcome, AuthState, CartService},
    storage::FileStorage,
};

mod logging;
mod offline;
mod render;

#[derive(Debug, Parser)]
#[command(name = "storefront-cart", about = "Storefront guest cart", long_about = None)]
pub(crate) struct Cli {
    /// Directory the guest cart is persisted in
    #[arg(long, env = "CART_DATA_DIR", default_value = "./.cart")]
    data_dir: PathBuf,

    /// Catalog YAML file
    #[arg(long, env = "CART_CATALOG", default_value = "./fixtures/catalog.yml")]
    catalog: PathBuf,

    #[command(flatten)]
    cart: CartConfig,

    #[command(flatten)]
    logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the cart with pricing
    List,

    /// Show the catalog
    Products,

    /// Add units of a product
    Add(AddArgs),

    /// Set a line's quantity; zero or less removes it
    Update(UpdateArgs),

    /// Remove a line
    Remove(LineArgs),

    /// Remove every line
    Clear,
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Catalog key or product UUID
    product: String,

    /// Units to add
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    quantity: i64,

    /// Bundle tier
    #[arg(short, long, value_enum)]
    bundle: Option<Tier>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Line UUID
    line: Uuid,

    /// New quantity
    #[arg(allow_negative_numbers = true)]
    quantity: i64,
}

#[derive(Debug, Args)]
struct LineArgs {
    /// Line UUID
    line: Uuid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Tier {
    Single,
    Double,
    Triple,
}

impl From<Tier> for BundleKind {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Single => BundleKind::Single,
            Tier::Double => BundleKind::Double,
            Tier::Triple => BundleKind::Triple,
        }
    }
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        logging::init(&self.logging)
            .map_err(|error| format!("failed to initialise logging: {error}"))?;

        let currency = self
            .cart
            .currency()
            .map_err(|error| format!("invalid configuration: {error}"))?;

        let catalog = Arc::new(
            StaticCatalog::from_path(&self.catalog, currency).map_err(|error| {
                format!("failed to load catalog {}: {error}", self.catalog.display())
            })?,
        );

        if catalog.currency() != currency {
            return Err(format!(
                "catalog prices in {} but the cart is configured for {}",
                catalog.currency().iso_alpha_code,
                currency.iso_alpha_code
            ));
        }

        let service = CartService::from_config(
            &self.cart,
            Arc::new(FileStorage::new(&self.data_dir)),
            Arc::new(offline::OfflineRemoteStore),
            catalog.clone(),
            catalog.clone(),
        )
        .map_err(|error| format!("invalid configuration: {error}"))?;

        service
            .set_auth_state(AuthState::Unauthenticated)
            .await
            .map_err(|error| format!("failed to load cart: {error}"))?;

        match self.command {
            Commands::List => {}
            Commands::Products => {
                render::products(&catalog);
                return Ok(());
            }
            Commands::Add(args) => {
                let product = catalog
                    .resolve(&args.product)
                    .ok_or_else(|| format!("unknown product: {}", args.product))?;

                let bundle = args
                    .bundle
                    .map(|tier| self.cart.presets().option(tier.into()));

                let outcome = service
                    .add(product, args.quantity, bundle)
                    .await
                    .map_err(|error| format!("failed to add to cart: {error}"))?;

                if let AddOutcome::Applied(item) = outcome {
                    render::line_changed("added", &item);
                }
            }
            Commands::Update(args) => {
                let updated = service
                    .update_quantity(LineItemUuid::from_uuid(args.line), args.quantity)
                    .await
                    .map_err(|error| format!("failed to update line: {error}"))?;

                match updated {
                    Some(item) => render::line_changed("updated", &item),
                    None => render::message("line removed"),
                }
            }
            Commands::Remove(args) => {
                service
                    .remove(LineItemUuid::from_uuid(args.line))
                    .await
                    .map_err(|error| format!("failed to remove line: {error}"))?;

                render::message("line removed");
            }
            Commands::Clear => {
                service
                    .clear()
                    .await
                    .map_err(|error| format!("failed to clear cart: {error}"))?;

                render::message("cart cleared");
            }
        }

        render::view(&service.view(), catalog.currency());

        Ok(())
    }
}
