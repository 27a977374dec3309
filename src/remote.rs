//! Remote Cart Store
//!
//! Server-backed cart of an authenticated shopper. The engine never owns this storage; it only
//! drives it through [`RemoteCartStore`] and always re-reads the list afterwards.

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

use crate::{
    bundles::BundleOption,
    items::{LineItem, LineItemUuid},
    products::ProductUuid,
};

/// Errors raised by the remote cart backend.
#[derive(Debug, Error)]
pub enum RemoteCartError {
    /// The line does not exist in the remote cart.
    #[error("cart line not found")]
    NotFound,

    /// The backend rejected the request.
    #[error("remote cart rejected the request: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("remote cart unavailable: {0}")]
    Unavailable(String),
}

/// Remote cart backend, keyed by an identity the implementor already knows.
#[automock]
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Retrieve every line in the remote cart.
    async fn list(&self) -> Result<Vec<LineItem>, RemoteCartError>;

    /// Create a new line.
    async fn add(
        &self,
        product: ProductUuid,
        quantity: u32,
        bundle: Option<BundleOption>,
    ) -> Result<LineItem, RemoteCartError>;

    /// Set the quantity of an existing line; `quantity` is always at least one.
    async fn update_quantity(
        &self,
        line: LineItemUuid,
        quantity: u32,
    ) -> Result<LineItem, RemoteCartError>;

    /// Delete a line.
    async fn remove(&self, line: LineItemUuid) -> Result<(), RemoteCartError>;

    /// Delete every line.
    async fn clear(&self) -> Result<(), RemoteCartError>;
}
