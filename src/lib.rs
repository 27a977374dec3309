//! Storefront Cart
//!
//! Cart consistency and bundle-pricing engine for storefronts. Guest carts live in local
//! storage, signed-in carts in a remote store, and [`service::CartService`] keeps a single
//! priced view of whichever one is authoritative.

pub mod bundles;
pub mod catalog;
pub mod config;
pub mod guard;
pub mod guest;
pub mod items;
pub mod prelude;
pub mod pricing;
pub mod products;
pub mod projection;
pub mod remote;
pub mod service;
pub mod storage;
pub mod uuids;
