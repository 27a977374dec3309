use async_trait::async_trait;

use storefront_cart::{
    bundles::BundleOption,
    items::{LineItem, LineItemUuid},
    products::ProductUuid,
    remote::{RemoteCartError, RemoteCartStore},
};

/// Remote store for a shell with no signed-in shopper.
#[derive(Debug, Default)]
pub(crate) struct OfflineRemoteStore;

const REASON: &str = "no remote cart is configured";

#[async_trait]
impl RemoteCartStore for OfflineRemoteStore {
    async fn list(&self) -> Result<Vec<LineItem>, RemoteCartError> {
        Err(RemoteCartError::Unavailable(REASON.to_string()))
    }

    async fn add(
        &self,
        _product: ProductUuid,
        _quantity: u32,
        _bundle: Option<BundleOption>,
    ) -> Result<LineItem, RemoteCartError> {
        Err(RemoteCartError::Unavailable(REASON.to_string()))
    }

    async fn update_quantity(
        &self,
        _line: LineItemUuid,
        _quantity: u32,
    ) -> Result<LineItem, RemoteCartError> {
        Err(RemoteCartError::Unavailable(REASON.to_string()))
    }

    async fn remove(&self, _line: LineItemUuid) -> Result<(), RemoteCartError> {
        Err(RemoteCartError::Unavailable(REASON.to_string()))
    }

    async fn clear(&self) -> Result<(), RemoteCartError> {
        Err(RemoteCartError::Unavailable(REASON.to_string()))
    }
}
