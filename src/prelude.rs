//! Storefront cart prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    bundles::{BundleKind, BundleOption, BundlePresets, BundleRule, BundleRuleSource},
    catalog::{CatalogError, StaticCatalog},
    config::{CartConfig, ConfigError, LogFormat, LoggingConfig},
    guest::GuestCartStore,
    items::{LineItem, LineItemUuid},
    pricing::{AppliedRule, BundleSavings, PricingError, compute_bundle_pricing},
    products::{LookupError, Product, ProductLookup, ProductSnapshot, ProductUuid},
    projection::{CartAggregate, CartMode, CartProjection, CartView, ProjectedLine},
    remote::{RemoteCartError, RemoteCartStore},
    service::{AddOutcome, AuthState, CartError, CartService, MergePolicy, MergeSummary},
    storage::{FileStorage, LocalStorage, MemoryStorage, StorageError},
};
